//! Running a workload step.
//!
//! Every unit of a step gets one value generator per param and one
//! [`TupleGenerator`] per group. A [`StepRunner`] registers each unit with a
//! [`QueuedGenerator`] so transactions arrive in the configured mix.

use std::fmt;

use async_trait::async_trait;
use sluice_payload::{TupleGenerator, Value, ValueGenerator, value_generator};
use sluice_queue::{Generator, QueuedGenerator};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{Config, Step, Unit};

/// Errors produced while running a step.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A value generator failed to build or to generate.
    #[error(transparent)]
    Payload(#[from] sluice_payload::Error),
    /// The queue failed.
    #[error(transparent)]
    Queue(#[from] sluice_queue::Error),
    /// No step with this name is configured.
    #[error("Unknown step: {0}")]
    UnknownStep(String),
    /// A seed referred to a unit that does not exist.
    #[error("Unknown unit: {0}")]
    UnknownUnit(String),
    /// A param or group has produced every value it can.
    #[error("Unit '{unit}' exhausted '{param}'")]
    Exhausted {
        /// Unit name
        unit: String,
        /// Param or group name
        param: String,
    },
}

impl Error {
    /// Whether the step ended because its data ran out rather than because
    /// something failed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        match self {
            Self::Exhausted { .. } => true,
            Self::Payload(e) => e.is_exhausted(),
            Self::Queue(sluice_queue::Error::Dead) => true,
            Self::Queue(e) => e
                .generation()
                .and_then(|e| e.downcast_ref::<Error>())
                .is_some_and(Error::is_exhausted),
            Self::UnknownStep(_) | Self::UnknownUnit(_) => false,
        }
    }
}

/// One generated unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// Name of the unit
    pub unit: String,
    /// Param names and their values, in configuration order
    pub values: Vec<(String, Value)>,
}

impl Transaction {
    /// Render as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let values: serde_json::Map<String, serde_json::Value> = self
            .values
            .iter()
            .map(|(name, value)| (name.clone(), serde_json::Value::from(value)))
            .collect();
        serde_json::json!({
            "unit": self.unit,
            "values": values,
        })
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.unit)?;
        for (idx, (name, value)) in self.values.iter().enumerate() {
            let sep = if idx == 0 { " " } else { ", " };
            write!(f, "{sep}{name}={value}")?;
        }
        Ok(())
    }
}

/// Identifies the unit a queue worker generates for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSeed {
    /// Position of the unit in its step
    pub index: usize,
    /// Name of the unit
    pub name: String,
}

#[derive(Debug)]
enum Source {
    Param {
        name: String,
        generator: Box<dyn ValueGenerator>,
    },
    Group {
        name: String,
        params: Vec<String>,
        generator: TupleGenerator,
    },
}

#[derive(Debug)]
struct UnitState {
    name: String,
    sources: Vec<Source>,
}

impl UnitState {
    fn new(seed: u64, unit: &Unit) -> Result<Self, Error> {
        let mut sources = Vec::with_capacity(unit.params.len() + unit.groups.len());
        for param in &unit.params {
            sources.push(Source::Param {
                name: param.name.clone(),
                generator: value_generator(seed, param)?,
            });
        }
        for group in &unit.groups {
            sources.push(Source::Group {
                name: group.name.clone(),
                params: group.params.iter().map(|p| p.name.clone()).collect(),
                generator: TupleGenerator::new(seed, &group.params)?,
            });
        }
        Ok(Self {
            name: unit.name.clone(),
            sources,
        })
    }

    fn next_transaction(&mut self) -> Result<Transaction, Error> {
        let unit = &self.name;
        let exhausted = |param: &str| Error::Exhausted {
            unit: unit.clone(),
            param: param.to_string(),
        };
        let mut values = Vec::new();
        for source in &mut self.sources {
            match source {
                Source::Param { name, generator } => match generator.next_value() {
                    Ok(Some(value)) => values.push((name.clone(), value)),
                    Ok(None) => return Err(exhausted(name)),
                    Err(e) if e.is_exhausted() => return Err(exhausted(name)),
                    Err(e) => return Err(e.into()),
                },
                Source::Group {
                    name,
                    params,
                    generator,
                } => match generator.next_value()? {
                    Some(Value::List(tuple)) => {
                        values.extend(params.iter().cloned().zip(tuple));
                    }
                    Some(other) => values.push((name.clone(), other)),
                    None => return Err(exhausted(name)),
                },
            }
        }
        Ok(Transaction {
            unit: unit.clone(),
            values,
        })
    }
}

/// Generates transactions for the units of one step.
#[derive(Debug)]
pub struct UnitGenerator {
    units: Vec<Mutex<UnitState>>,
}

impl UnitGenerator {
    /// Build generators for every unit of `step`. The unit at position `i`
    /// is seeded with `seed + i`.
    ///
    /// # Errors
    ///
    /// Fails if any param's rule is malformed.
    pub fn new(seed: u64, step: &Step) -> Result<Self, Error> {
        let units = step
            .units
            .iter()
            .enumerate()
            .map(|(idx, unit)| UnitState::new(seed.wrapping_add(idx as u64), unit).map(Mutex::new))
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(Self { units })
    }
}

#[async_trait]
impl Generator<UnitSeed> for UnitGenerator {
    type Output = Transaction;
    type Error = Error;

    async fn generate(
        &self,
        _token: &CancellationToken,
        seed: &UnitSeed,
    ) -> Result<Transaction, Error> {
        let unit = self
            .units
            .get(seed.index)
            .ok_or_else(|| Error::UnknownUnit(seed.name.clone()))?;
        unit.lock().await.next_transaction()
    }
}

/// Runs one step, handing out its transactions.
#[derive(Debug)]
pub struct StepRunner {
    name: String,
    queue: QueuedGenerator<UnitSeed, UnitGenerator>,
}

impl StepRunner {
    /// Prepare `step` for running.
    ///
    /// # Errors
    ///
    /// Fails if any param's rule is malformed.
    pub fn new(seed: u64, step: &Step) -> Result<Self, Error> {
        let generator = UnitGenerator::new(seed, step)?;
        let mut queue = QueuedGenerator::new(generator, step.workers_limit, step.buffer_size)
            .with_name(step.name.clone());
        for (index, unit) in step.units.iter().enumerate() {
            debug!(step = %step.name, unit = %unit.name, unit.workers, unit.count, "registering unit");
            queue.prepare_generator(
                UnitSeed {
                    index,
                    name: unit.name.clone(),
                },
                unit.workers,
                unit.count,
            );
        }
        Ok(Self {
            name: step.name.clone(),
            queue,
        })
    }

    /// Prepare the step called `name` of `config`.
    ///
    /// # Errors
    ///
    /// Fails if there is no such step or any param's rule is malformed.
    pub fn for_step(config: &Config, name: &str) -> Result<Self, Error> {
        let step = config
            .step(name)
            .ok_or_else(|| Error::UnknownStep(name.to_string()))?;
        Self::new(config.seed, step)
    }

    /// Start generating. Cancelling `token` stops the step.
    ///
    /// # Errors
    ///
    /// Fails if the step was already started.
    pub fn start(&mut self, token: &CancellationToken) -> Result<(), Error> {
        info!(step = %self.name, "starting step");
        self.queue.start(token)?;
        Ok(())
    }

    /// Wait for the next transaction.
    ///
    /// # Errors
    ///
    /// Returns the queue's error once generation failed or the step is
    /// stopped, see [`Error::is_exhausted`] to tell the end of data apart.
    pub async fn next_transaction(&self) -> Result<Transaction, Error> {
        Ok(self.queue.next_element().await?)
    }

    /// Stop the step.
    ///
    /// # Errors
    ///
    /// Returns the first generation failure, if any.
    pub fn stop(&self) -> Result<(), Error> {
        info!(step = %self.name, "stopping step");
        self.queue.stop()?;
        Ok(())
    }
}
