//! Typed generators built on the samplers.

use std::fmt;

use rand::{Rng, rngs::StdRng};
use uuid::{Builder, Uuid};

use crate::{
    Error, Value, ValueGenerator,
    distribution::{Float, FloatSampler, Integer, Sampler},
    strings::StringSource,
};

/// Something that draws raw, untyped samples.
pub(crate) trait Source: Send + fmt::Debug {
    type Item;

    fn draw(&mut self) -> Result<Self::Item, Error>;
}

impl<T> Source for Sampler<T>
where
    T: Integer,
{
    type Item = T;

    fn draw(&mut self) -> Result<T, Error> {
        self.next()
    }
}

impl<T> Source for FloatSampler<T>
where
    T: Float,
{
    type Item = T;

    fn draw(&mut self) -> Result<T, Error> {
        self.next()
    }
}

impl Source for StringSource {
    type Item = String;

    fn draw(&mut self) -> Result<String, Error> {
        self.next()
    }
}

/// Version 4 UUIDs from a seeded stream.
#[derive(Debug)]
pub(crate) struct UuidSource {
    rng: StdRng,
}

impl UuidSource {
    pub(crate) fn new(rng: StdRng) -> Self {
        Self { rng }
    }
}

impl Source for UuidSource {
    type Item = Uuid;

    fn draw(&mut self) -> Result<Uuid, Error> {
        Ok(Builder::from_random_bytes(self.rng.random()).into_uuid())
    }
}

/// A [`Source`] whose samples are turned into [`Value`]s by `transform`.
pub(crate) struct Primitive<S, F> {
    source: S,
    transform: F,
}

impl<S, F> Primitive<S, F>
where
    S: Source,
    F: FnMut(S::Item) -> Result<Value, Error> + Send,
{
    pub(crate) fn new(source: S, transform: F) -> Self {
        Self { source, transform }
    }
}

impl<S, F> fmt::Debug for Primitive<S, F>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Primitive")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl<S, F> ValueGenerator for Primitive<S, F>
where
    S: Source,
    F: FnMut(S::Item) -> Result<Value, Error> + Send,
{
    fn next_value(&mut self) -> Result<Option<Value>, Error> {
        let raw = self.source.draw()?;
        (self.transform)(raw).map(Some)
    }
}

/// Always the same value.
#[derive(Debug)]
pub(crate) struct Constant(pub(crate) Value);

impl ValueGenerator for Constant {
    fn next_value(&mut self) -> Result<Option<Value>, Error> {
        Ok(Some(self.0.clone()))
    }
}

/// Yields `Value::Null` with the given percentage, otherwise delegates.
#[derive(Debug)]
pub(crate) struct NullWrapper<G> {
    inner: G,
    probability: f64,
    rng: StdRng,
}

impl<G> NullWrapper<G>
where
    G: ValueGenerator,
{
    /// # Errors
    ///
    /// Fails if `percentage` is above 100.
    pub(crate) fn new(inner: G, percentage: u32, rng: StdRng) -> Result<Self, Error> {
        if percentage > 100 {
            return Err(Error::NullPercentage(percentage));
        }
        Ok(Self {
            inner,
            probability: f64::from(percentage) / 100.0,
            rng,
        })
    }
}

impl<G> ValueGenerator for NullWrapper<G>
where
    G: ValueGenerator,
{
    fn next_value(&mut self) -> Result<Option<Value>, Error> {
        if self.rng.random_bool(self.probability) {
            return Ok(Some(Value::Null));
        }
        self.inner.next_value()
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::{Constant, NullWrapper, Primitive, Source, UuidSource};
    use crate::{Error, Value, ValueGenerator, distribution::Sampler, rule::Distribution};

    #[test]
    fn null_wrapper_extremes() {
        let wrap = |pct| NullWrapper::new(Constant(Value::Bool(true)), pct, StdRng::seed_from_u64(1));
        let mut never = wrap(0).unwrap();
        let mut always = wrap(100).unwrap();
        for _ in 0..100 {
            assert_eq!(never.next_value().unwrap(), Some(Value::Bool(true)));
            assert_eq!(always.next_value().unwrap(), Some(Value::Null));
        }
        assert!(matches!(
            NullWrapper::new(Constant(Value::Null), 101, StdRng::seed_from_u64(1)),
            Err(Error::NullPercentage(101))
        ));
    }

    #[test]
    fn null_rate_tracks_percentage() {
        let rng = StdRng::seed_from_u64(4);
        let mut generator = NullWrapper::new(Constant(Value::Int32(1)), 25, rng).unwrap();
        let nulls = (0..20_000)
            .filter(|_| generator.next_value().unwrap() == Some(Value::Null))
            .count();
        assert!((4_500..=5_500).contains(&nulls), "{nulls} nulls");
    }

    #[test]
    fn primitive_applies_transform() {
        let rng = StdRng::seed_from_u64(0);
        let sampler = Sampler::new(1_i32, 3, Distribution::Uniform, false, rng).unwrap();
        let mut generator = Primitive::new(sampler, |v: i32| Ok(Value::Int64(i64::from(v) * 10)));
        for _ in 0..32 {
            let Some(Value::Int64(v)) = generator.next_value().unwrap() else {
                panic!("unexpected variant");
            };
            assert!([10, 20, 30].contains(&v));
        }
    }

    #[test]
    fn uuids_are_version_four() {
        let mut source = UuidSource::new(StdRng::seed_from_u64(0));
        let a = source.draw().unwrap();
        let b = source.draw().unwrap();
        assert_eq!(a.get_version_num(), 4);
        assert_ne!(a, b);
    }
}
