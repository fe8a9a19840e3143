//! Numeric samplers over inclusive ranges.
//!
//! Integer ranges are handled as an unsigned offset from `min`, so a span
//! like `i64::MIN..=i64::MAX` is exact. Unique integer sampling is
//! without replacement and bounded: once every offset of the range has
//! been returned the sampler fails with [`Error::UniqueExhausted`].

use std::fmt;

use rand::{Rng, rngs::StdRng};
use rand_distr::{Distribution as _, Zipf};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{Error, rule::Distribution};

/// Consecutive collisions a unique float or string draw tolerates before
/// the range is considered exhausted.
pub(crate) const MAX_UNIQUE_ATTEMPTS: usize = 64;

/// Integers that can be addressed as an unsigned offset from a minimum.
pub(crate) trait Integer: Copy + PartialOrd + fmt::Display + fmt::Debug + Send {
    fn offset_from(self, min: Self) -> u64;
    fn with_offset(min: Self, offset: u64) -> Self;
}

macro_rules! integer {
    ($t:ty, $u:ty) => {
        impl Integer for $t {
            fn offset_from(self, min: Self) -> u64 {
                (self as $u).wrapping_sub(min as $u) as u64
            }

            fn with_offset(min: Self, offset: u64) -> Self {
                (min as $u).wrapping_add(offset as $u) as $t
            }
        }
    };
}

integer!(i32, u32);
integer!(i64, u64);
integer!(u32, u32);
integer!(u64, u64);
integer!(u8, u8);

#[derive(Debug)]
enum Shape {
    Uniform,
    Zipf(Zipf<f64>),
    /// Walks the range in ascending order, wrapping at the end.
    Sequential { cursor: u64 },
}

#[derive(Debug)]
enum Unique {
    /// Sparse Fisher-Yates: the map records swapped slots of a virtual
    /// permutation of every offset.
    Shuffle(FxHashMap<u64, u64>),
    /// Taken offsets point at the next candidate offset, wrapping.
    Probe(FxHashMap<u64, u64>),
    Counted,
}

fn zipf(n: u64, skew: f64) -> Result<Zipf<f64>, Error> {
    Zipf::new(n as f64, skew).map_err(|e| Error::Skew {
        skew,
        reason: e.to_string(),
    })
}

/// Samples integers from `min..=max`.
#[derive(Debug)]
pub(crate) struct Sampler<T> {
    min: T,
    max_offset: u64,
    shape: Shape,
    unique: Option<Unique>,
    drawn: u128,
    rng: StdRng,
}

impl<T> Sampler<T>
where
    T: Integer,
{
    /// Create a random sampler.
    ///
    /// # Errors
    ///
    /// Fails if `min > max` or if the zipf skew is unusable.
    pub(crate) fn new(
        min: T,
        max: T,
        distribution: Distribution,
        unique: bool,
        rng: StdRng,
    ) -> Result<Self, Error> {
        crate::rule::check_bounds(&min, &max)?;
        let max_offset = max.offset_from(min);
        let (shape, unique) = match distribution {
            Distribution::Uniform => (
                Shape::Uniform,
                unique.then(|| Unique::Shuffle(FxHashMap::default())),
            ),
            Distribution::Zipf { skew } => (
                Shape::Zipf(zipf(max_offset.saturating_add(1), skew)?),
                unique.then(|| Unique::Probe(FxHashMap::default())),
            ),
        };
        Ok(Self {
            min,
            max_offset,
            shape,
            unique,
            drawn: 0,
            rng,
        })
    }

    /// Create a sampler that enumerates the range from `min` upward.
    ///
    /// # Errors
    ///
    /// Fails if `min > max`.
    pub(crate) fn sequential(min: T, max: T, unique: bool, rng: StdRng) -> Result<Self, Error> {
        crate::rule::check_bounds(&min, &max)?;
        Ok(Self {
            min,
            max_offset: max.offset_from(min),
            shape: Shape::Sequential { cursor: 0 },
            unique: unique.then_some(Unique::Counted),
            drawn: 0,
            rng,
        })
    }

    fn size(&self) -> u128 {
        u128::from(self.max_offset) + 1
    }

    fn shaped_offset(&mut self) -> u64 {
        match &mut self.shape {
            Shape::Uniform => self.rng.random_range(0..=self.max_offset),
            Shape::Zipf(zipf) => {
                // Ranks are 1-based, rank 1 is the most likely.
                let rank = zipf.sample(&mut self.rng);
                ((rank - 1.0) as u64).min(self.max_offset)
            }
            Shape::Sequential { cursor } => {
                let offset = *cursor;
                *cursor = if offset == self.max_offset { 0 } else { offset + 1 };
                offset
            }
        }
    }

    /// Draw the next value.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UniqueExhausted`] when unique and every value of
    /// the range has been returned.
    pub(crate) fn next(&mut self) -> Result<T, Error> {
        let offset = match self.unique.take() {
            None => self.shaped_offset(),
            Some(mut unique) => {
                if self.drawn >= self.size() {
                    self.unique = Some(unique);
                    return Err(Error::UniqueExhausted);
                }
                let offset = match &mut unique {
                    Unique::Shuffle(swaps) => {
                        // drawn < size <= 2^64 so it fits
                        let i = self.drawn as u64;
                        let j = i + self.rng.random_range(0..=self.max_offset - i);
                        let at_i = swaps.remove(&i).unwrap_or(i);
                        if j == i {
                            at_i
                        } else {
                            swaps.insert(j, at_i).unwrap_or(j)
                        }
                    }
                    Unique::Probe(taken) => {
                        let candidate = self.shaped_offset();
                        let free = next_free(taken, candidate);
                        let following = if free == self.max_offset { 0 } else { free + 1 };
                        taken.insert(free, following);
                        free
                    }
                    Unique::Counted => self.shaped_offset(),
                };
                self.unique = Some(unique);
                self.drawn += 1;
                offset
            }
        };
        Ok(T::with_offset(self.min, offset))
    }
}

/// Follow the chain of taken offsets from `start` to the first free one,
/// compressing the path behind it.
fn next_free(taken: &mut FxHashMap<u64, u64>, start: u64) -> u64 {
    let mut root = start;
    while let Some(&next) = taken.get(&root) {
        root = next;
    }
    let mut cursor = start;
    while cursor != root {
        let Some(next) = taken.insert(cursor, root) else {
            break;
        };
        cursor = next;
    }
    root
}

/// Floats that can be drawn through an `f64` sample.
pub(crate) trait Float: Copy + PartialOrd + fmt::Display + fmt::Debug + Send {
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
    fn bits(self) -> u64;
}

impl Float for f32 {
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn bits(self) -> u64 {
        u64::from(self.to_bits())
    }
}

impl Float for f64 {
    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }

    fn bits(self) -> u64 {
        self.to_bits()
    }
}

/// Samples floats from `min..=max`.
///
/// Floats are not enumerable, uniqueness is enforced by remembering the bit
/// patterns already returned and giving up after [`MAX_UNIQUE_ATTEMPTS`]
/// consecutive collisions.
#[derive(Debug)]
pub(crate) struct FloatSampler<T> {
    min: T,
    max: T,
    zipf: Option<Zipf<f64>>,
    seen: Option<FxHashSet<u64>>,
    rng: StdRng,
}

impl<T> FloatSampler<T>
where
    T: Float,
{
    /// Create a float sampler.
    ///
    /// # Errors
    ///
    /// Fails if `min > max`, a bound is not finite or the zipf skew is
    /// unusable.
    pub(crate) fn new(
        min: T,
        max: T,
        distribution: Distribution,
        unique: bool,
        rng: StdRng,
    ) -> Result<Self, Error> {
        let span = max.to_f64() - min.to_f64();
        if !span.is_finite() {
            return Err(Error::Range {
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        crate::rule::check_bounds(&min, &max)?;
        let zipf = match distribution {
            Distribution::Uniform => None,
            Distribution::Zipf { skew } => Some(zipf((span.floor() as u64).saturating_add(1), skew)?),
        };
        Ok(Self {
            min,
            max,
            zipf,
            seen: unique.then(FxHashSet::default),
            rng,
        })
    }

    fn draw(&mut self) -> T {
        let (min, max) = (self.min.to_f64(), self.max.to_f64());
        if min == max {
            return self.min;
        }
        let value = match &self.zipf {
            None => self.rng.random_range(min..=max),
            Some(zipf) => {
                let rank = zipf.sample(&mut self.rng);
                let jitter: f64 = self.rng.random();
                (min + (rank - 1.0) + jitter).min(max)
            }
        };
        T::from_f64(value)
    }

    /// Draw the next value.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UniqueExhausted`] when unique and no fresh value
    /// turned up.
    pub(crate) fn next(&mut self) -> Result<T, Error> {
        if self.seen.is_none() {
            return Ok(self.draw());
        }
        for _ in 0..MAX_UNIQUE_ATTEMPTS {
            let value = self.draw();
            if let Some(seen) = self.seen.as_mut() {
                if seen.insert(value.bits()) {
                    return Ok(value);
                }
            }
            if self.min == self.max {
                break;
            }
        }
        Err(Error::UniqueExhausted)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::{SeedableRng, rngs::StdRng};
    use rustc_hash::FxHashSet;

    use super::{FloatSampler, Sampler};
    use crate::{Error, rule::Distribution};

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn unique_uniform_covers_range_then_fails() {
        let mut sampler = Sampler::new(1_i64, 100_000, Distribution::Uniform, true, rng(7)).unwrap();
        let mut seen = FxHashSet::default();
        for _ in 0..100_000 {
            let v = sampler.next().unwrap();
            assert!((1..=100_000).contains(&v));
            assert!(seen.insert(v), "repeated {v}");
        }
        assert!(matches!(sampler.next(), Err(Error::UniqueExhausted)));
        assert!(matches!(sampler.next(), Err(Error::UniqueExhausted)));
    }

    #[test]
    fn unique_zipf_covers_range_then_fails() {
        let mut sampler =
            Sampler::new(0_u32, 999, Distribution::Zipf { skew: 1.5 }, true, rng(3)).unwrap();
        let mut seen = FxHashSet::default();
        for _ in 0..1000 {
            assert!(seen.insert(sampler.next().unwrap()));
        }
        assert!(matches!(sampler.next(), Err(Error::UniqueExhausted)));
    }

    #[test]
    fn single_value_range() {
        let mut sampler = Sampler::new(5_i32, 5, Distribution::Uniform, false, rng(1)).unwrap();
        for _ in 0..10 {
            assert_eq!(sampler.next().unwrap(), 5);
        }

        let mut sampler = Sampler::new(5_i32, 5, Distribution::Uniform, true, rng(1)).unwrap();
        assert_eq!(sampler.next().unwrap(), 5);
        assert!(matches!(sampler.next(), Err(Error::UniqueExhausted)));
    }

    #[test]
    fn full_signed_range_does_not_overflow() {
        let mut sampler =
            Sampler::new(i64::MIN, i64::MAX, Distribution::Uniform, false, rng(11)).unwrap();
        let mut negative = false;
        let mut positive = false;
        for _ in 0..256 {
            let v = sampler.next().unwrap();
            negative |= v < 0;
            positive |= v > 0;
        }
        assert!(negative && positive);

        let mut sampler = Sampler::new(-3_i32, 2, Distribution::Uniform, true, rng(2)).unwrap();
        let mut values: Vec<i32> = (0..6).map(|_| sampler.next().unwrap()).collect();
        values.sort_unstable();
        assert_eq!(values, vec![-3, -2, -1, 0, 1, 2]);
    }

    #[test]
    fn zipf_favors_the_minimum() {
        let mut sampler =
            Sampler::new(100_u64, 10_100, Distribution::Zipf { skew: 2.0 }, false, rng(5)).unwrap();
        let low = (0..10_000).filter(|_| sampler.next().unwrap() < 110).count();
        assert!(low > 8_000, "only {low} samples near the minimum");
    }

    #[test]
    fn inverted_range_and_bad_skew_are_rejected() {
        assert!(matches!(
            Sampler::new(10_u32, 1, Distribution::Uniform, false, rng(0)),
            Err(Error::Range { .. })
        ));
        assert!(matches!(
            Sampler::new(1_u32, 10, Distribution::Zipf { skew: -1.0 }, false, rng(0)),
            Err(Error::Skew { .. })
        ));
        assert!(matches!(
            FloatSampler::new(f64::MIN, f64::MAX, Distribution::Uniform, false, rng(0)),
            Err(Error::Range { .. })
        ));
    }

    #[test]
    fn sequential_walks_and_wraps() {
        let mut sampler = Sampler::sequential(-1_i32, 1, false, rng(0)).unwrap();
        let values: Vec<i32> = (0..5).map(|_| sampler.next().unwrap()).collect();
        assert_eq!(values, vec![-1, 0, 1, -1, 0]);

        let mut sampler = Sampler::sequential(0_u8, 1, true, rng(0)).unwrap();
        assert_eq!(sampler.next().unwrap(), 0);
        assert_eq!(sampler.next().unwrap(), 1);
        assert!(matches!(sampler.next(), Err(Error::UniqueExhausted)));
    }

    #[test]
    fn unique_single_value_float_fails_on_second_call() {
        let mut sampler = FloatSampler::new(1.5_f32, 1.5, Distribution::Uniform, true, rng(0)).unwrap();
        assert!((sampler.next().unwrap() - 1.5).abs() < f32::EPSILON);
        assert!(matches!(sampler.next(), Err(Error::UniqueExhausted)));
    }

    proptest! {
        #[test]
        fn integers_stay_in_range(seed: u64, a: i32, b: i32, skew in 0.0_f64..4.0, zipf: bool) {
            let (min, max) = if a <= b { (a, b) } else { (b, a) };
            let distribution = if zipf { Distribution::Zipf { skew } } else { Distribution::Uniform };
            let mut sampler = Sampler::new(min, max, distribution, false, rng(seed)).unwrap();
            for _ in 0..64 {
                let v = sampler.next().unwrap();
                prop_assert!(min <= v && v <= max);
            }
        }

        #[test]
        fn unique_never_repeats(seed: u64, min in -500_i64..500, width in 0_i64..300, zipf: bool) {
            let max = min + width;
            let distribution = if zipf { Distribution::Zipf { skew: 1.1 } } else { Distribution::Uniform };
            let mut sampler = Sampler::new(min, max, distribution, true, rng(seed)).unwrap();
            let mut seen = FxHashSet::default();
            for _ in 0..=width {
                let v = sampler.next().unwrap();
                prop_assert!(min <= v && v <= max);
                prop_assert!(seen.insert(v));
            }
            prop_assert!(matches!(sampler.next(), Err(Error::UniqueExhausted)));
        }

        #[test]
        fn floats_stay_in_range(seed: u64, a in -1e6_f64..1e6, b in -1e6_f64..1e6, zipf: bool) {
            let (min, max) = if a <= b { (a, b) } else { (b, a) };
            let distribution = if zipf { Distribution::Zipf { skew: 1.3 } } else { Distribution::Uniform };
            let mut sampler = FloatSampler::new(min, max, distribution, false, rng(seed)).unwrap();
            for _ in 0..64 {
                let v = sampler.next().unwrap();
                prop_assert!(min <= v && v <= max);
            }
        }
    }
}
