//! Cartesian products of several parameters.
//!
//! A [`TupleGenerator`] walks every combination of its dimensions in
//! odometer order, the last dimension advancing fastest. Enumeration runs on
//! a dedicated thread that hands completed tuples over a single-slot channel,
//! so it never runs more than one tuple ahead of the consumer.

use std::{
    sync::mpsc::{self, Receiver, SyncSender},
    thread,
};

use tracing::{debug, warn};

use crate::{
    Error, GenerationRule, Value, ValueGenerator,
    rule::GenAble,
    value::{self, Mode},
};

type Tuple = Result<Vec<Value>, Error>;

/// The exhaustive cartesian product of a list of parameters.
///
/// Each call to [`ValueGenerator::next_value`] yields a `Value::List` with one
/// value per parameter, in the order the parameters were given. Once every
/// combination has been produced the generator returns `Ok(None)`.
#[derive(Debug)]
pub struct TupleGenerator {
    receiver: Receiver<Tuple>,
}

#[derive(Debug, Clone)]
struct Dimension {
    name: String,
    rule: GenerationRule,
}

impl Dimension {
    fn generator(&self, seed: u64) -> Result<Box<dyn ValueGenerator>, Error> {
        value::build(seed, &self.name, &self.rule, Mode::Enumerate).map_err(|e| Error::Entity {
            name: self.name.clone(),
            source: Box::new(e),
        })
    }
}

impl TupleGenerator {
    /// Create a new [`TupleGenerator`] over `entities`.
    ///
    /// Integer-like ranges are enumerated in ascending order, constants are
    /// dimensions of a single value. Floats, strings and random UUIDs are
    /// sampled and only end their cycle when a sample repeats the first one.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NoGenerators`] if `entities` is empty, or if any
    /// entity's rule cannot be built.
    pub fn new<G>(seed: u64, entities: &[G]) -> Result<Self, Error>
    where
        G: GenAble,
    {
        if entities.is_empty() {
            return Err(Error::NoGenerators);
        }
        let dimensions: Vec<Dimension> = entities
            .iter()
            .map(|e| Dimension {
                name: e.name().to_string(),
                rule: e.generation_rule().clone(),
            })
            .collect();
        // Surface malformed rules now rather than on the first read.
        for dimension in &dimensions {
            dimension.generator(seed)?;
        }

        let (sender, receiver) = mpsc::sync_channel(1);
        thread::Builder::new()
            .name("sluice-tuple".to_string())
            .spawn(move || enumerate(seed, &dimensions, &sender))
            .map_err(|e| Error::Spawn(e.to_string()))?;

        Ok(Self { receiver })
    }
}

impl ValueGenerator for TupleGenerator {
    fn next_value(&mut self) -> Result<Option<Value>, Error> {
        match self.receiver.recv() {
            Ok(Ok(values)) => Ok(Some(Value::List(values))),
            Ok(Err(e)) => Err(e),
            // The enumeration thread hangs up once it is done.
            Err(mpsc::RecvError) => Ok(None),
        }
    }
}

/// The next value of a dimension, `None` once it has nothing more to give.
fn pull(generator: &mut dyn ValueGenerator) -> Result<Option<Value>, Error> {
    match generator.next_value() {
        Err(e) if e.is_exhausted() => Ok(None),
        other => other,
    }
}

fn enumerate(seed: u64, dimensions: &[Dimension], sender: &SyncSender<Tuple>) {
    match odometer(seed, dimensions, sender) {
        Ok(emitted) => debug!(emitted, "tuple enumeration finished"),
        Err(e) => {
            warn!(error = %e, "tuple enumeration failed");
            if sender.send(Err(e)).is_err() {
                debug!("tuple receiver gone before the failure could be reported");
            }
        }
    }
}

/// Walk every combination, returning how many tuples were sent. Stops early,
/// without error, when the receiving side hangs up.
fn odometer(
    seed: u64,
    dimensions: &[Dimension],
    sender: &SyncSender<Tuple>,
) -> Result<u64, Error> {
    let mut generators = Vec::with_capacity(dimensions.len());
    let mut firsts = Vec::with_capacity(dimensions.len());
    for dimension in dimensions {
        let mut generator = dimension.generator(seed)?;
        let Some(first) = pull(generator.as_mut())? else {
            return Ok(0);
        };
        generators.push(generator);
        firsts.push(first);
    }
    let mut current = firsts.clone();
    let mut emitted = 0;

    loop {
        if sender.send(Ok(current.clone())).is_err() {
            return Ok(emitted);
        }
        emitted += 1;

        // Advance the innermost dimension, carrying outward whenever a
        // dimension completes its cycle.
        let mut depth = dimensions.len();
        loop {
            if depth == 0 {
                return Ok(emitted);
            }
            depth -= 1;
            match pull(generators[depth].as_mut())? {
                Some(next) if next != firsts[depth] => {
                    current[depth] = next;
                    break;
                }
                _ => {}
            }
        }

        // Every dimension inside the one that advanced restarts its cycle.
        for inner in depth + 1..dimensions.len() {
            let mut generator = dimensions[inner].generator(seed)?;
            let Some(first) = pull(generator.as_mut())? else {
                return Ok(emitted);
            };
            generators[inner] = generator;
            current[inner] = first.clone();
            firsts[inner] = first;
        }
    }
}
