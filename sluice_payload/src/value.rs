//! Construction of [`ValueGenerator`]s from [`GenerationRule`]s.

use std::str::FromStr;

use rand::rngs::StdRng;
use rust_decimal::Decimal;
use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};
use tracing::debug;
use uuid::Uuid;

use crate::{
    Error, Value, ValueGenerator,
    distribution::{Float, FloatSampler, Integer, Sampler},
    primitive::{Constant, NullWrapper, Primitive, UuidSource},
    rule::{
        BoolRule, ConfRange, DatetimeBound, DatetimeRule, DecimalBound, DecimalRule, Distribution,
        GenAble, GenerationRule, RuleKind, StringRule, UuidRule, check_bounds,
    },
    seed::{self, Stream},
    strings::{ALPHANUM, CharTape, StringSource},
};

/// How ranged rules are walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Random draws with the configured distribution and null injection.
    Sample,
    /// Integer-like ranges ascend from their minimum, nulls are never
    /// injected.
    Enumerate,
}

/// Create a [`ValueGenerator`] for `entity`.
///
/// The generator's random streams are derived from `seed` and the entity's
/// name, so two entities sharing a seed still produce distinct sequences.
///
/// # Errors
///
/// Returns [`Error::Entity`] wrapping the reason the rule could not be
/// turned into a generator.
pub fn value_generator<G>(seed: u64, entity: &G) -> Result<Box<dyn ValueGenerator>, Error>
where
    G: GenAble + ?Sized,
{
    build(seed, entity.name(), entity.generation_rule(), Mode::Sample).map_err(|e| {
        Error::Entity {
            name: entity.name().to_string(),
            source: Box::new(e),
        }
    })
}

/// Create a [`ValueGenerator`] for a bare rule.
///
/// # Errors
///
/// Fails if the rule is malformed, see [`Error`].
pub fn value_generator_by_rule(
    seed: u64,
    rule: &GenerationRule,
) -> Result<Box<dyn ValueGenerator>, Error> {
    build(seed, "", rule, Mode::Sample)
}

pub(crate) fn build(
    seed: u64,
    name: &str,
    rule: &GenerationRule,
    mode: Mode,
) -> Result<Box<dyn ValueGenerator>, Error> {
    if rule.null_percentage > 100 {
        return Err(Error::NullPercentage(rule.null_percentage));
    }
    debug!(entity = name, ?mode, "building value generator");

    let salt = seed::salt(name);
    let rng = |stream| seed::rng(seed, salt, stream);
    let distribution = rule.distribution.unwrap_or_default();
    let unique = rule.unique;
    let sampled = Ranged {
        distribution,
        unique,
        mode,
        rng: rng(Stream::Sampler),
    };

    let base: Box<dyn ValueGenerator> = match &rule.kind {
        RuleKind::Int32(range) => sampled.integer(*range, |v| Ok(Value::Int32(v)))?,
        RuleKind::Int64(range) => sampled.integer(*range, |v| Ok(Value::Int64(v)))?,
        RuleKind::Uint32(range) => sampled.integer(*range, |v| Ok(Value::Uint32(v)))?,
        RuleKind::Uint64(range) => sampled.integer(*range, |v| Ok(Value::Uint64(v)))?,
        RuleKind::Float(range) => sampled.float(*range, Value::Float)?,
        RuleKind::Double(range) => sampled.float(*range, Value::Double)?,
        RuleKind::Bool(BoolRule::Constant(b)) => Box::new(Constant(Value::Bool(*b))),
        RuleKind::Bool(BoolRule::Random) => sampled.integer(
            ConfRange::Inclusive { min: 0_u8, max: 1 },
            |v| Ok(Value::Bool(v == 1)),
        )?,
        RuleKind::String(StringRule::Constant(s)) => Box::new(Constant(Value::String(s.clone()))),
        RuleKind::String(StringRule::Random {
            min_length,
            max_length,
            alphabet,
        }) => {
            let tape = CharTape::new(alphabet.as_deref().unwrap_or(ALPHANUM), rng(Stream::Tape))?;
            let source = StringSource::new(
                *min_length,
                *max_length,
                distribution,
                unique,
                tape,
                rng(Stream::Length),
            )?;
            Box::new(Primitive::new(source, |s| Ok(Value::String(s))))
        }
        RuleKind::Datetime(DatetimeRule::Constant(text)) => {
            Box::new(Constant(Value::Datetime(parse_datetime(text)?)))
        }
        RuleKind::Datetime(DatetimeRule::Inclusive { min, max }) => {
            let range = ConfRange::Inclusive {
                min: unix_seconds(min)?,
                max: unix_seconds(max)?,
            };
            sampled.integer(range, |secs: i64| {
                OffsetDateTime::from_unix_timestamp(secs)
                    .map(Value::Datetime)
                    .map_err(|e| Error::Datetime {
                        value: secs.to_string(),
                        reason: e.to_string(),
                    })
            })?
        }
        RuleKind::Decimal(DecimalRule::Constant(text)) => {
            Box::new(Constant(Value::Decimal(parse_decimal(text)?)))
        }
        RuleKind::Decimal(DecimalRule::Inclusive { min, max }) => {
            let (min, max) = (decimal_bound(min)?, decimal_bound(max)?);
            check_bounds(&min, &max)?;
            let scale = min.scale().max(max.scale());
            let range = ConfRange::Inclusive {
                min: mantissa(min, scale)?,
                max: mantissa(max, scale)?,
            };
            sampled.integer(range, move |m| Ok(Value::Decimal(Decimal::new(m, scale))))?
        }
        RuleKind::Uuid(UuidRule::Constant(text)) => {
            let uuid = Uuid::parse_str(text).map_err(|e| Error::Uuid {
                value: text.clone(),
                reason: e.to_string(),
            })?;
            Box::new(Constant(Value::Uuid(uuid)))
        }
        RuleKind::Uuid(UuidRule::Random) => Box::new(Primitive::new(
            UuidSource::new(rng(Stream::Uuid)),
            |u| Ok(Value::Uuid(u)),
        )),
    };

    if mode == Mode::Sample && rule.null_percentage > 0 {
        let nulls = NullWrapper::new(base, rule.null_percentage, rng(Stream::Nulls))?;
        Ok(Box::new(nulls))
    } else {
        Ok(base)
    }
}

/// Sampling parameters shared by every ranged kind of a rule.
struct Ranged {
    distribution: Distribution,
    unique: bool,
    mode: Mode,
    rng: StdRng,
}

impl Ranged {
    fn integer<T, F>(
        self,
        range: ConfRange<T>,
        mut transform: F,
    ) -> Result<Box<dyn ValueGenerator>, Error>
    where
        T: Integer + 'static,
        F: FnMut(T) -> Result<Value, Error> + Send + 'static,
    {
        let (min, max) = match range {
            ConfRange::Constant(c) => return Ok(Box::new(Constant(transform(c)?))),
            ConfRange::Inclusive { min, max } => (min, max),
        };
        let sampler = match self.mode {
            Mode::Sample => Sampler::new(min, max, self.distribution, self.unique, self.rng)?,
            Mode::Enumerate => Sampler::sequential(min, max, self.unique, self.rng)?,
        };
        Ok(Box::new(Primitive::new(sampler, transform)))
    }

    /// Floats are not enumerable and are always sampled.
    fn float<T>(
        self,
        range: ConfRange<T>,
        transform: fn(T) -> Value,
    ) -> Result<Box<dyn ValueGenerator>, Error>
    where
        T: Float + 'static,
    {
        let (min, max) = match range {
            ConfRange::Constant(c) => return Ok(Box::new(Constant(transform(c)))),
            ConfRange::Inclusive { min, max } => (min, max),
        };
        let sampler = FloatSampler::new(min, max, self.distribution, self.unique, self.rng)?;
        Ok(Box::new(Primitive::new(sampler, move |v| Ok(transform(v)))))
    }
}

fn parse_datetime(text: &str) -> Result<OffsetDateTime, Error> {
    OffsetDateTime::parse(text, &Rfc3339)
        .map(|dt| dt.to_offset(UtcOffset::UTC))
        .map_err(|e| Error::Datetime {
            value: text.to_string(),
            reason: e.to_string(),
        })
}

fn unix_seconds(bound: &DatetimeBound) -> Result<i64, Error> {
    match bound {
        DatetimeBound::Unix(secs) => OffsetDateTime::from_unix_timestamp(*secs)
            .map(OffsetDateTime::unix_timestamp)
            .map_err(|e| Error::Datetime {
                value: secs.to_string(),
                reason: e.to_string(),
            }),
        DatetimeBound::Rfc3339(text) => parse_datetime(text).map(OffsetDateTime::unix_timestamp),
    }
}

fn parse_decimal(text: &str) -> Result<Decimal, Error> {
    Decimal::from_str(text).map_err(|e| Error::Decimal {
        value: text.to_string(),
        reason: e.to_string(),
    })
}

fn decimal_bound(bound: &DecimalBound) -> Result<Decimal, Error> {
    match bound {
        DecimalBound::Text(text) => parse_decimal(text),
        DecimalBound::Float(f) => Decimal::try_from(*f).map_err(|e| Error::Decimal {
            value: f.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// The integer mantissa of `value` at `scale`.
fn mantissa(mut value: Decimal, scale: u32) -> Result<i64, Error> {
    let original = value;
    value.rescale(scale);
    i64::try_from(value.mantissa()).map_err(|e| Error::Decimal {
        value: original.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rustc_hash::FxHashSet;
    use std::str::FromStr;

    use super::{value_generator, value_generator_by_rule};
    use crate::{
        Error, Value,
        rule::{
            BoolRule, ConfRange, DatetimeBound, DatetimeRule, DecimalBound, DecimalRule,
            GenerationRule, Param, RuleKind, StringRule, UuidRule,
        },
    };

    fn draw(seed: u64, param: &Param, n: usize) -> Vec<Value> {
        let mut generator = value_generator(seed, param).unwrap();
        (0..n).map(|_| generator.next_value().unwrap().unwrap()).collect()
    }

    #[test]
    fn same_seed_and_name_replay() {
        let rule = GenerationRule::new(RuleKind::Int64(ConfRange::Inclusive { min: 0, max: 1 << 40 }))
            .with_null_percentage(10);
        let a = Param::new("a", rule.clone());
        let b = Param::new("b", rule);
        assert_eq!(draw(42, &a, 64), draw(42, &a, 64));
        assert_ne!(draw(42, &a, 64), draw(42, &b, 64));
        assert_ne!(draw(42, &a, 64), draw(43, &a, 64));
    }

    fn kind_matches(kind: &RuleKind, value: &Value) -> bool {
        match (kind, value) {
            (RuleKind::Int32(_), Value::Int32(v)) => (-5..=5).contains(v),
            (RuleKind::Uint32(_), Value::Uint32(v)) => (5..=50).contains(v),
            (RuleKind::Uint64(_), Value::Uint64(v)) => *v == 9,
            (RuleKind::Float(_), Value::Float(v)) => (-1.0..=1.0).contains(v),
            (RuleKind::Double(_), Value::Double(v)) => (0.0..=1e9).contains(v),
            (RuleKind::String(_), Value::String(s)) => s.chars().count() <= 12,
            (RuleKind::Bool(_), Value::Bool(_)) | (RuleKind::Uuid(_), Value::Uuid(_)) => true,
            _ => false,
        }
    }

    #[test]
    fn variants_match_rule_kind() {
        let kinds = vec![
            RuleKind::Int32(ConfRange::Inclusive { min: -5, max: 5 }),
            RuleKind::Uint32(ConfRange::Inclusive { min: 5, max: 50 }),
            RuleKind::Uint64(ConfRange::Constant(9)),
            RuleKind::Float(ConfRange::Inclusive { min: -1.0, max: 1.0 }),
            RuleKind::Double(ConfRange::Inclusive { min: 0.0, max: 1e9 }),
            RuleKind::Bool(BoolRule::Random),
            RuleKind::String(StringRule::Random {
                min_length: 0,
                max_length: 12,
                alphabet: None,
            }),
            RuleKind::Uuid(UuidRule::Random),
        ];
        for kind in kinds {
            let mut generator = value_generator_by_rule(1, &GenerationRule::new(kind.clone())).unwrap();
            for _ in 0..32 {
                let value = generator.next_value().unwrap().unwrap();
                let matches = kind_matches(&kind, &value);
                assert!(matches, "{kind:?} produced {value:?}");
            }
        }
    }

    #[test]
    fn decimal_range_is_exact() {
        let rule = GenerationRule::new(RuleKind::Decimal(DecimalRule::Inclusive {
            min: DecimalBound::Text("0.00".to_string()),
            max: DecimalBound::Float(0.09),
        }))
        .unique();
        let mut generator = value_generator_by_rule(3, &rule).unwrap();
        let mut seen = FxHashSet::default();
        for _ in 0..10 {
            let Some(Value::Decimal(d)) = generator.next_value().unwrap() else {
                panic!("expected a decimal");
            };
            assert_eq!(d.scale(), 2);
            assert!(Decimal::ZERO <= d && d <= Decimal::from_str("0.09").unwrap());
            assert!(seen.insert(d));
        }
        assert!(matches!(generator.next_value(), Err(Error::UniqueExhausted)));
    }

    #[test]
    fn datetime_range_is_whole_seconds_in_utc() {
        let rule = GenerationRule::new(RuleKind::Datetime(DatetimeRule::Inclusive {
            min: DatetimeBound::Rfc3339("2024-01-01T00:00:00+02:00".to_string()),
            max: DatetimeBound::Unix(1_704_067_260),
        }));
        let mut generator = value_generator_by_rule(5, &rule).unwrap();
        for _ in 0..64 {
            let Some(Value::Datetime(dt)) = generator.next_value().unwrap() else {
                panic!("expected a datetime");
            };
            assert!(dt.offset().is_utc());
            assert!((1_704_060_000..=1_704_067_260).contains(&dt.unix_timestamp()));
            assert_eq!(dt.nanosecond(), 0);
        }
    }

    #[test]
    fn constants_are_parsed_up_front() {
        let uuid = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        let rule = GenerationRule::new(RuleKind::Uuid(UuidRule::Constant(uuid.to_string())));
        let mut generator = value_generator_by_rule(0, &rule).unwrap();
        assert_eq!(generator.next_value().unwrap().unwrap().to_string(), uuid);

        let bad = Param::new(
            "price",
            GenerationRule::new(RuleKind::Decimal(DecimalRule::Constant("1.2.3".to_string()))),
        );
        let err = value_generator(0, &bad).unwrap_err();
        assert!(matches!(err, Error::Entity { ref name, ref source }
            if name == "price" && matches!(**source, Error::Decimal { .. })));

        let bad = GenerationRule::new(RuleKind::Datetime(DatetimeRule::Constant("yesterday".into())));
        assert!(matches!(value_generator_by_rule(0, &bad), Err(Error::Datetime { .. })));
    }

    #[test]
    fn null_percentage_is_validated_and_applied() {
        let rule = GenerationRule::new(RuleKind::Bool(BoolRule::Constant(true))).with_null_percentage(101);
        assert!(matches!(value_generator_by_rule(0, &rule), Err(Error::NullPercentage(101))));

        let rule = GenerationRule::new(RuleKind::String(StringRule::Constant("x".into())))
            .with_null_percentage(100);
        let mut generator = value_generator_by_rule(0, &rule).unwrap();
        assert_eq!(generator.next_value().unwrap(), Some(Value::Null));
    }
}
