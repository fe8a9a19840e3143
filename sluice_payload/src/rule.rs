//! Generation rules, the configuration of a single generated parameter

use serde::{Deserialize, Serialize};
use std::{cmp, fmt};

use crate::Error;

/// Range expression for configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Copy)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
pub enum ConfRange<T>
where
    T: PartialEq + cmp::PartialOrd + Clone + Copy,
{
    /// A constant T
    Constant(T),
    /// In which a T is chosen between `min` and `max`, inclusive of `max`.
    Inclusive {
        /// The minimum of the range.
        min: T,
        /// The maximum of the range.
        max: T,
    },
}

pub(crate) fn check_bounds<T>(min: &T, max: &T) -> Result<(), Error>
where
    T: PartialOrd + fmt::Display,
{
    if min <= max {
        Ok(())
    } else {
        Err(Error::Range {
            min: min.to_string(),
            max: max.to_string(),
        })
    }
}

/// The statistical shape values are drawn with.
#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    /// Every value of the range is equally likely.
    #[default]
    Uniform,
    /// Power-law weighting, larger `skew` biases harder toward the minimum.
    Zipf {
        /// The zipf exponent, must not be negative.
        skew: f64,
    },
}

/// An inclusive range of unicode code points, `[65, 90]` is `A` through `Z`.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct CodePoints(pub u32, pub u32);

/// String generation
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
pub enum StringRule {
    /// Always the same string
    Constant(String),
    /// Random strings with a length in `min_length..=max_length`, characters
    /// drawn from `alphabet`
    Random {
        /// Shortest string, in characters.
        min_length: u64,
        /// Longest string, in characters.
        max_length: u64,
        /// Code point ranges to draw from. When absent ASCII alphanumerics
        /// are used.
        #[serde(default)]
        alphabet: Option<Vec<CodePoints>>,
    },
}

/// Boolean generation
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
pub enum BoolRule {
    /// Always the same boolean
    Constant(bool),
    /// Either boolean
    Random,
}

/// A bound of a datetime range.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum DatetimeBound {
    /// Seconds since the unix epoch
    Unix(i64),
    /// RFC 3339 text, `2024-01-01T00:00:00Z`
    Rfc3339(String),
}

/// Datetime generation
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
pub enum DatetimeRule {
    /// Always the same instant, RFC 3339 text
    Constant(String),
    /// Whole seconds between `min` and `max`, inclusive of `max`.
    Inclusive {
        /// Earliest instant.
        min: DatetimeBound,
        /// Latest instant.
        max: DatetimeBound,
    },
}

/// A bound of a decimal range.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum DecimalBound {
    /// Decimal text, parsed exactly
    Text(String),
    /// A float, converted to the nearest decimal
    Float(f64),
}

/// Decimal generation
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
pub enum DecimalRule {
    /// Always the same decimal, as text
    Constant(String),
    /// Decimals between `min` and `max`, inclusive, at the larger scale of
    /// the two bounds.
    Inclusive {
        /// Smallest decimal.
        min: DecimalBound,
        /// Largest decimal.
        max: DecimalBound,
    },
}

/// UUID generation
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
pub enum UuidRule {
    /// Always the same UUID, as text
    Constant(String),
    /// Random version 4 UUIDs
    Random,
}

/// The type-specific half of a [`GenerationRule`].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Generates `Value::Int32`
    Int32(ConfRange<i32>),
    /// Generates `Value::Int64`
    Int64(ConfRange<i64>),
    /// Generates `Value::Uint32`
    Uint32(ConfRange<u32>),
    /// Generates `Value::Uint64`
    Uint64(ConfRange<u64>),
    /// Generates `Value::Float`
    Float(ConfRange<f32>),
    /// Generates `Value::Double`
    Double(ConfRange<f64>),
    /// Generates `Value::Bool`
    Bool(BoolRule),
    /// Generates `Value::String`
    String(StringRule),
    /// Generates `Value::Datetime`
    Datetime(DatetimeRule),
    /// Generates `Value::Decimal`
    Decimal(DecimalRule),
    /// Generates `Value::Uuid`
    Uuid(UuidRule),
}

/// How a single value is synthesized.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GenerationRule {
    /// The value type and its constant or range.
    pub kind: RuleKind,
    /// Shape of ranged sampling, uniform when absent.
    #[serde(default)]
    pub distribution: Option<Distribution>,
    /// Never emit the same value twice.
    #[serde(default)]
    pub unique: bool,
    /// Chance, in percent, that any one call yields `Value::Null`.
    #[serde(default)]
    pub null_percentage: u32,
}

impl GenerationRule {
    /// Construct a rule with uniform distribution, no uniqueness and no
    /// nulls.
    #[must_use]
    pub fn new(kind: RuleKind) -> Self {
        Self {
            kind,
            distribution: None,
            unique: false,
            null_percentage: 0,
        }
    }

    /// Set the distribution.
    #[must_use]
    pub fn with_distribution(mut self, distribution: Distribution) -> Self {
        self.distribution = Some(distribution);
        self
    }

    /// Require uniqueness.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Set the null percentage.
    #[must_use]
    pub fn with_null_percentage(mut self, null_percentage: u32) -> Self {
        self.null_percentage = null_percentage;
        self
    }
}

/// Anything a value generator can be built for.
pub trait GenAble {
    /// The rule values are generated by.
    fn generation_rule(&self) -> &GenerationRule;
    /// Name of the entity, used in errors and to derive random streams.
    fn name(&self) -> &str;
}

/// A named parameter, the stock [`GenAble`].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Param {
    /// Parameter name
    pub name: String,
    /// Generation rule
    pub rule: GenerationRule,
}

impl Param {
    /// Construct a new `Param`.
    #[must_use]
    pub fn new(name: impl Into<String>, rule: GenerationRule) -> Self {
        Self {
            name: name.into(),
            rule,
        }
    }
}

impl GenAble for Param {
    fn generation_rule(&self) -> &GenerationRule {
        &self.rule
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<G> GenAble for &G
where
    G: GenAble + ?Sized,
{
    fn generation_rule(&self) -> &GenerationRule {
        (**self).generation_rule()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
