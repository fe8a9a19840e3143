//! The sluice payloads
//!
//! This library supports value generation for the sluice project. Every
//! generator here is deterministic with respect to its seed and the name of
//! the parameter it is built for: the same configuration always replays the
//! same sequence of values, no matter how many generators run side by side.

#![deny(clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

use std::fmt;

use rust_decimal::Decimal;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

pub mod rule;
pub mod tuple;
pub mod value;

pub(crate) mod distribution;
pub(crate) mod primitive;
pub(crate) mod seed;
pub(crate) mod strings;

pub use rule::{Distribution, GenAble, GenerationRule, Param, RuleKind};
pub use tuple::TupleGenerator;
pub use value::{value_generator, value_generator_by_rule};

/// Errors produced while building or running a value generator.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// A unique sampler has already emitted every value of its range.
    #[error("every unique value in the range has been emitted")]
    UniqueExhausted,
    /// A range was configured with its minimum above its maximum.
    #[error("min must be less than or equal to max: {min} > {max}")]
    Range {
        /// Rendered minimum of the range.
        min: String,
        /// Rendered maximum of the range.
        max: String,
    },
    /// The null percentage is outside of `0..=100`.
    #[error("null percentage must be within 0..=100, got {0}")]
    NullPercentage(u32),
    /// The zipf skew cannot be used for sampling.
    #[error("invalid zipf distribution with skew {skew}: {reason}")]
    Skew {
        /// Configured skew.
        skew: f64,
        /// Reason given by the distribution.
        reason: String,
    },
    /// A character range cannot be sampled from.
    #[error("invalid character range {min}..={max}")]
    Alphabet {
        /// Lowest code point of the range.
        min: u32,
        /// Highest code point of the range.
        max: u32,
    },
    /// A decimal could not be parsed or represented.
    #[error("invalid decimal '{value}': {reason}")]
    Decimal {
        /// Offending input.
        value: String,
        /// Reason for rejection.
        reason: String,
    },
    /// A datetime could not be parsed or represented.
    #[error("invalid datetime '{value}': {reason}")]
    Datetime {
        /// Offending input.
        value: String,
        /// Reason for rejection.
        reason: String,
    },
    /// A UUID constant could not be parsed.
    #[error("invalid uuid '{value}': {reason}")]
    Uuid {
        /// Offending input.
        value: String,
        /// Reason for rejection.
        reason: String,
    },
    /// A tuple generator was requested without any parameters.
    #[error("no generators provided")]
    NoGenerators,
    /// The tuple enumeration thread could not be started.
    #[error("failed to spawn tuple enumeration thread: {0}")]
    Spawn(String),
    /// Wraps an error with the name of the entity it was raised for.
    #[error("failed to create generator for entity '{name}': {source}")]
    Entity {
        /// Name of the parameter.
        name: String,
        /// Underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Whether this error, possibly wrapped, signals uniqueness exhaustion.
    ///
    /// Callers may treat exhaustion as end-of-data rather than a failure.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        match self {
            Self::UniqueExhausted => true,
            Self::Entity { source, .. } => source.is_exhausted(),
            _ => false,
        }
    }
}

/// A single generated value.
///
/// The active variant always matches the type declared by the
/// [`GenerationRule`] the value was generated from. `List` carries the
/// combined output of a [`TupleGenerator`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean
    Bool(bool),
    /// Signed 32 bit integer
    Int32(i32),
    /// Signed 64 bit integer
    Int64(i64),
    /// Unsigned 32 bit integer
    Uint32(u32),
    /// Unsigned 64 bit integer
    Uint64(u64),
    /// Single precision float
    Float(f32),
    /// Double precision float
    Double(f64),
    /// UTF-8 text
    String(String),
    /// Timestamp, always UTC
    Datetime(OffsetDateTime),
    /// Exact decimal
    Decimal(Decimal),
    /// UUID
    Uuid(Uuid),
    /// Ordered combination of values
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Uint32(v) => write!(f, "{v}"),
            Value::Uint64(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Datetime(v) => {
                let text = v.format(&Rfc3339).map_err(|_| fmt::Error)?;
                write!(f, "{text}")
            }
            Value::Decimal(v) => write!(f, "{v}"),
            Value::Uuid(v) => write!(f, "{v}"),
            Value::List(values) => {
                write!(f, "(")?;
                for (idx, v) in values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        use serde_json::Value as Json;

        match value {
            Value::Null => Json::Null,
            Value::Bool(v) => Json::Bool(*v),
            Value::Int32(v) => Json::from(*v),
            Value::Int64(v) => Json::from(*v),
            Value::Uint32(v) => Json::from(*v),
            Value::Uint64(v) => Json::from(*v),
            Value::Float(v) => serde_json::Number::from_f64(f64::from(*v)).map_or(Json::Null, Json::Number),
            Value::Double(v) => serde_json::Number::from_f64(*v).map_or(Json::Null, Json::Number),
            Value::String(v) => Json::String(v.clone()),
            Value::Datetime(v) => v.format(&Rfc3339).map_or(Json::Null, Json::String),
            Value::Decimal(v) => Json::String(v.to_string()),
            Value::Uuid(v) => Json::String(v.to_string()),
            Value::List(values) => Json::Array(values.iter().map(Json::from).collect()),
        }
    }
}

/// A source of [`Value`] instances.
///
/// Implementations own their random state, no two generators share a PRNG.
pub trait ValueGenerator: Send + fmt::Debug {
    /// Produce the next value.
    ///
    /// Returns `Ok(None)` once a finite generator, such as a
    /// [`TupleGenerator`], has been exhausted. Generators over ranges are
    /// infinite unless they are unique, in which case they fail with
    /// [`Error::UniqueExhausted`] once every value has been emitted.
    ///
    /// # Errors
    ///
    /// See [`Error`].
    fn next_value(&mut self) -> Result<Option<Value>, Error>;
}

impl<G> ValueGenerator for Box<G>
where
    G: ValueGenerator + ?Sized,
{
    fn next_value(&mut self) -> Result<Option<Value>, Error> {
        (**self).next_value()
    }
}
