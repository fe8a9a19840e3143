//! Print the transactions a workload step would produce.

#![allow(clippy::print_stdout)]

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use sluice::{
    config::{self, Config},
    step::{self, StepRunner},
};
use tokio::{runtime::Builder, signal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Failed to load workload: {0}")]
    Config(#[from] config::Error),
    #[error("Step failed: {0}")]
    Step(#[from] step::Error),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// path on disk to the workload configuration file
    #[clap(short, long)]
    config_path: PathBuf,
    /// name of the step to run
    #[clap(short, long)]
    step: String,
    /// number of transactions to print
    #[clap(short = 'n', long, default_value_t = 10)]
    count: u64,
    /// output format
    #[clap(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

async fn run(args: Args, config: Config) -> Result<(), Error> {
    let token = CancellationToken::new();
    let mut runner = StepRunner::for_step(&config, &args.step)?;
    runner.start(&token)?;

    let mut printed = 0;
    while printed < args.count {
        let transaction = tokio::select! {
            _ = signal::ctrl_c() => {
                info!("received ctrl-c");
                break;
            }
            transaction = runner.next_transaction() => transaction,
        };
        match transaction {
            Ok(transaction) => {
                match args.format {
                    Format::Text => println!("{transaction}"),
                    Format::Json => println!("{}", transaction.to_json()),
                }
                printed += 1;
            }
            Err(e) if e.is_exhausted() => {
                warn!(printed, "step ran out of values");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }
    token.cancel();
    runner.stop()?;
    Ok(())
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .finish()
        .init();

    let args = Args::parse();
    let config = Config::from_path(&args.config_path)?;
    info!(seed = config.seed, step = %args.step, "loaded workload");

    let runtime = Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;
    runtime.block_on(run(args, config))
}
