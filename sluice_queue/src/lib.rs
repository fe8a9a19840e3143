//! The sluice queue
//!
//! A [`QueuedGenerator`] runs a [`Generator`] for a set of seeds in a bounded
//! pool of tokio tasks and multiplexes everything produced into a single
//! bounded channel. Any number of consumers drain that channel through
//! [`QueuedGenerator::next_element`].
//!
//! Work is scheduled in cycles. Each cycle spawns `workers` tasks per seed,
//! each task calls the generator `repeat` times. Cycles repeat until the
//! queue is stopped, so over time every seed contributes
//! `workers * repeat` elements out of every cycle's total.
//!
//! ## Metrics
//!
//! `queue_elements_generated`: Elements pushed into the channel
//! `queue_generation_errors`: Generator calls that failed
//! `queue_cycles`: Completed scheduling cycles
//!
//! All metrics are labelled with `queue`, the name of the queue.

#![deny(clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions)]

use std::{
    error, fmt,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
};

use metrics::counter;
use tokio::{
    sync::{Mutex, OwnedSemaphorePermit, Semaphore, mpsc},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

mod generator;

pub use generator::{FromFn, Generator, from_fn};

/// Errors produced by [`QueuedGenerator`].
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// The channel is closed and drained, no more elements will arrive.
    #[error("queue is dead")]
    Dead,
    /// [`QueuedGenerator::stop`] was called.
    #[error("queue is stopped")]
    Stopped,
    /// [`QueuedGenerator::start`] has not been called.
    #[error("queue has not been started")]
    NotStarted,
    /// [`QueuedGenerator::start`] was called twice.
    #[error("queue has already been started")]
    AlreadyStarted,
    /// The first error returned by the generator.
    #[error("generation failed: {0}")]
    Generation(#[source] Arc<dyn error::Error + Send + Sync>),
    /// A worker task panicked.
    #[error("worker failed: {0}")]
    Worker(String),
}

impl Error {
    /// The generator's error, if this is [`Error::Generation`].
    #[must_use]
    pub fn generation(&self) -> Option<&(dyn error::Error + Send + Sync + 'static)> {
        match self {
            Self::Generation(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// How a seed is scheduled.
#[derive(Debug)]
struct SeedOptions<S> {
    seed: S,
    workers: usize,
    repeat: usize,
}

/// State shared between the queue handle and its tasks.
#[derive(Debug, Default)]
struct Shared {
    first_error: OnceLock<Error>,
    stopped: AtomicBool,
}

impl Shared {
    /// Record `error` unless an error was recorded before. Returns whether
    /// this error won.
    fn capture(&self, error: Error) -> bool {
        self.first_error.set(error).is_ok()
    }

    fn error(&self) -> Option<Error> {
        self.first_error.get().cloned()
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct Running<T> {
    token: CancellationToken,
    receiver: Arc<Mutex<mpsc::Receiver<T>>>,
    /// Present when the queue hands off without a buffer. Each permit is
    /// one consumer waiting for an element.
    demand: Option<Arc<Semaphore>>,
    workers_limit: usize,
    capacity: usize,
}

/// A consumer's request for one element of a rendezvous queue, withdrawn
/// on drop unless a producer answered it.
struct Demand<'a> {
    semaphore: &'a Semaphore,
    answered: bool,
}

impl<'a> Demand<'a> {
    fn ask(semaphore: &'a Semaphore) -> Self {
        semaphore.add_permits(1);
        Self {
            semaphore,
            answered: false,
        }
    }
}

impl Drop for Demand<'_> {
    fn drop(&mut self) {
        if !self.answered {
            if let Ok(permit) = self.semaphore.try_acquire() {
                permit.forget();
            }
        }
    }
}

/// Resolve the configured worker limit and buffer size.
///
/// A limit of zero or less means every worker of every seed runs at once,
/// `auto_limit` carries the negated sum of all registered workers. A
/// negative buffer follows the resolved limit, zero is an unbuffered
/// hand-off. Returns `(workers_limit, capacity)`.
fn resolve(workers_limit: isize, auto_limit: isize, buffer_size: isize) -> (usize, usize) {
    let limit = if workers_limit <= 0 {
        auto_limit.unsigned_abs().max(1)
    } else {
        workers_limit.unsigned_abs()
    };
    let capacity = if buffer_size < 0 {
        limit
    } else {
        buffer_size.unsigned_abs()
    };
    (limit, capacity)
}

/// A bounded, cancellable pool of generator workers feeding one channel.
///
/// The lifecycle is: construct with [`QueuedGenerator::new`], register seeds
/// with [`QueuedGenerator::prepare_generator`], [`QueuedGenerator::start`],
/// consume with [`QueuedGenerator::next_element`] and finally
/// [`QueuedGenerator::stop`]. Dropping the queue stops it as well.
pub struct QueuedGenerator<S, G>
where
    S: Send + Sync + 'static,
    G: Generator<S>,
{
    name: String,
    generator: Arc<G>,
    seeds: Vec<SeedOptions<S>>,
    workers_limit: isize,
    auto_limit: isize,
    buffer_size: isize,
    shared: Arc<Shared>,
    running: Option<Running<G::Output>>,
}

impl<S, G> fmt::Debug for QueuedGenerator<S, G>
where
    S: Send + Sync + fmt::Debug + 'static,
    G: Generator<S>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedGenerator")
            .field("name", &self.name)
            .field("seeds", &self.seeds)
            .field("workers_limit", &self.workers_limit)
            .field("auto_limit", &self.auto_limit)
            .field("buffer_size", &self.buffer_size)
            .field("shared", &self.shared)
            .field("started", &self.running.is_some())
            .finish_non_exhaustive()
    }
}

impl<S, G> QueuedGenerator<S, G>
where
    S: Send + Sync + 'static,
    G: Generator<S>,
{
    /// Create a new [`QueuedGenerator`].
    ///
    /// `workers_limit` bounds how many generator calls run concurrently, zero
    /// or less runs every registered worker at once. `buffer_size` is the
    /// channel capacity, a negative size follows the resolved worker limit.
    #[must_use]
    pub fn new(generator: G, workers_limit: isize, buffer_size: isize) -> Self {
        Self {
            name: "queue".to_string(),
            generator: Arc::new(generator),
            seeds: Vec::new(),
            workers_limit,
            auto_limit: 0,
            buffer_size,
            shared: Arc::new(Shared::default()),
            running: None,
        }
    }

    /// Name the queue, used in logs and as the `queue` metric label.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register `seed` to be run by `workers` concurrent workers, each
    /// calling the generator `repeat` times per cycle. Values below one are
    /// treated as one.
    pub fn prepare_generator(&mut self, seed: S, workers: isize, repeat: isize) {
        let workers = workers.max(1);
        if self.workers_limit <= 0 {
            self.auto_limit = self.auto_limit.saturating_sub(workers);
        }
        self.seeds.push(SeedOptions {
            seed,
            workers: workers.unsigned_abs(),
            repeat: repeat.max(1).unsigned_abs(),
        });
    }

    /// The resolved `(workers_limit, channel_capacity)`, available once
    /// started.
    #[must_use]
    pub fn limits(&self) -> Option<(usize, usize)> {
        self.running
            .as_ref()
            .map(|running| (running.workers_limit, running.capacity))
    }

    /// Launch the scheduler. The queue's cancellation token is a child of
    /// `parent`, cancelling `parent` shuts the queue down.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] if called twice.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn start(&mut self, parent: &CancellationToken) -> Result<(), Error> {
        if self.running.is_some() {
            return Err(Error::AlreadyStarted);
        }
        let (workers_limit, capacity) =
            resolve(self.workers_limit, self.auto_limit, self.buffer_size);
        info!(
            queue = %self.name,
            seeds = self.seeds.len(),
            workers_limit,
            capacity,
            "starting queued generator"
        );

        let token = parent.child_token();
        let done = CancellationToken::new();
        // An unbuffered queue still needs a slot to pass the element through,
        // producers only fill it once a consumer has asked.
        let demand = (capacity == 0).then(|| Arc::new(Semaphore::new(0)));
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let labels = vec![("queue".to_string(), self.name.clone())];

        let scheduler = Scheduler {
            generator: Arc::clone(&self.generator),
            seeds: Arc::new(std::mem::take(&mut self.seeds)),
            semaphore: Arc::new(Semaphore::new(workers_limit)),
            demand: demand.clone(),
            sender,
            token: token.clone(),
            shared: Arc::clone(&self.shared),
            labels,
        };
        tokio::spawn(scheduler.run(done.clone()));
        tokio::spawn(finalize(token.clone(), done, Arc::clone(&receiver)));

        self.running = Some(Running {
            token,
            receiver,
            demand,
            workers_limit,
            capacity,
        });
        Ok(())
    }

    /// Wait for the next element.
    ///
    /// Safe to call from any number of tasks at once.
    ///
    /// # Errors
    ///
    /// Once the generator has failed every call returns that failure. After
    /// [`QueuedGenerator::stop`] every call returns [`Error::Stopped`], and
    /// [`Error::Dead`] once the channel is closed and drained.
    pub async fn next_element(&self) -> Result<G::Output, Error> {
        if let Some(e) = self.shared.error() {
            return Err(e);
        }
        if self.shared.is_stopped() {
            return Err(Error::Stopped);
        }
        let Some(running) = &self.running else {
            return Err(Error::NotStarted);
        };

        let received = {
            let mut receiver = running.receiver.lock().await;
            let mut demand = running.demand.as_deref().map(Demand::ask);
            let received = receiver.recv().await;
            if let Some(demand) = demand.as_mut() {
                demand.answered = received.is_some();
            }
            received
        };

        if let Some(e) = self.shared.error() {
            return Err(e);
        }
        if self.shared.is_stopped() {
            return Err(Error::Stopped);
        }
        received.ok_or(Error::Dead)
    }

    /// Stop the queue.
    ///
    /// # Errors
    ///
    /// Returns the first error the generator failed with, if any.
    pub fn stop(&self) -> Result<(), Error> {
        self.shared.stopped.store(true, Ordering::Release);
        if let Some(running) = &self.running {
            if !running.token.is_cancelled() {
                info!(queue = %self.name, "stopping queued generator");
            }
            running.token.cancel();
        }
        match self.shared.error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<S, G> Drop for QueuedGenerator<S, G>
where
    S: Send + Sync + 'static,
    G: Generator<S>,
{
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.token.cancel();
        }
    }
}

struct Scheduler<S, G>
where
    S: Send + Sync + 'static,
    G: Generator<S>,
{
    generator: Arc<G>,
    seeds: Arc<Vec<SeedOptions<S>>>,
    semaphore: Arc<Semaphore>,
    demand: Option<Arc<Semaphore>>,
    sender: mpsc::Sender<G::Output>,
    token: CancellationToken,
    shared: Arc<Shared>,
    labels: Vec<(String, String)>,
}

impl<S, G> Scheduler<S, G>
where
    S: Send + Sync + 'static,
    G: Generator<S>,
{
    /// Run cycles until cancelled, then signal `done`. The scheduler's sender
    /// is dropped before `done` fires.
    async fn run(self, done: CancellationToken) {
        let mut cycles: u64 = 0;
        if self.seeds.is_empty() {
            debug!("queue has no seeds, idling until cancelled");
            self.token.cancelled().await;
        }
        while !self.token.is_cancelled() {
            let mut tasks = JoinSet::new();
            'spawn: for idx in 0..self.seeds.len() {
                for _ in 0..self.seeds[idx].workers {
                    let permit = tokio::select! {
                        biased;
                        () = self.token.cancelled() => break 'spawn,
                        permit = Arc::clone(&self.semaphore).acquire_owned() => permit,
                    };
                    let Ok(permit) = permit else {
                        break 'spawn;
                    };
                    tasks.spawn(self.worker(idx, permit));
                }
            }

            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    if e.is_panic() && self.shared.capture(Error::Worker(e.to_string())) {
                        error!(error = %e, "queue worker panicked");
                    }
                    self.token.cancel();
                }
            }
            cycles += 1;
            counter!("queue_cycles", &self.labels).increment(1);
        }
        debug!(cycles, "queue scheduler exited");
        drop(self);
        done.cancel();
    }

    fn worker(
        &self,
        idx: usize,
        permit: OwnedSemaphorePermit,
    ) -> impl Future<Output = ()> + Send + 'static {
        let generator = Arc::clone(&self.generator);
        let seeds = Arc::clone(&self.seeds);
        let sender = self.sender.clone();
        let demand = self.demand.clone();
        let token = self.token.clone();
        let shared = Arc::clone(&self.shared);
        let labels = self.labels.clone();

        async move {
            let seed = &seeds[idx];
            for _ in 0..seed.repeat {
                let generated = tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    generated = generator.generate(&token, &seed.seed) => generated,
                };
                match generated {
                    Ok(element) => {
                        if let Some(demand) = &demand {
                            let asked = tokio::select! {
                                biased;
                                () = token.cancelled() => break,
                                asked = demand.acquire() => asked,
                            };
                            let Ok(asked) = asked else {
                                break;
                            };
                            asked.forget();
                        }
                        tokio::select! {
                            biased;
                            () = token.cancelled() => break,
                            sent = sender.send(element) => if sent.is_err() { break },
                        }
                        counter!("queue_elements_generated", &labels).increment(1);
                    }
                    Err(e) => {
                        counter!("queue_generation_errors", &labels).increment(1);
                        if !token.is_cancelled()
                            && shared.capture(Error::Generation(Arc::new(e)))
                        {
                            error!(error = ?shared.error(), "queue generator failed, stopping");
                        }
                        token.cancel();
                        break;
                    }
                }
            }
            drop(permit);
        }
    }
}

/// Once cancelled, wait for the producers to finish, then close and drain
/// the channel. This is the only place the channel is closed.
async fn finalize<T>(
    token: CancellationToken,
    done: CancellationToken,
    receiver: Arc<Mutex<mpsc::Receiver<T>>>,
) where
    T: Send + 'static,
{
    token.cancelled().await;
    done.cancelled().await;
    let mut receiver = receiver.lock().await;
    receiver.close();
    let mut drained: u64 = 0;
    while receiver.try_recv().is_ok() {
        drained += 1;
    }
    debug!(drained, "queue channel closed");
}
