//! Random strings over configurable code point ranges

use rand::{Rng, rngs::StdRng};
use rustc_hash::FxHashSet;

use crate::{
    Error,
    distribution::{MAX_UNIQUE_ATTEMPTS, Sampler},
    rule::{CodePoints, Distribution},
};

/// `0-9`, `A-Z` and `a-z`, used when no alphabet is configured.
pub(crate) const ALPHANUM: &[CodePoints] = &[
    CodePoints(48, 57),
    CodePoints(65, 90),
    CodePoints(97, 122),
];

const SURROGATES: (u32, u32) = (0xD800, 0xDFFF);

/// Draws characters from a set of code point ranges. A range is picked
/// uniformly, then a code point uniformly within it.
#[derive(Debug)]
pub(crate) struct CharTape {
    ranges: Vec<CodePoints>,
    rng: StdRng,
}

impl CharTape {
    /// # Errors
    ///
    /// Fails if `ranges` is empty, a range is inverted, above `char::MAX` or
    /// overlaps the surrogate block.
    pub(crate) fn new(ranges: &[CodePoints], rng: StdRng) -> Result<Self, Error> {
        if ranges.is_empty() {
            return Err(Error::Alphabet { min: 0, max: 0 });
        }
        for &CodePoints(min, max) in ranges {
            let invalid = min > max
                || max > u32::from(char::MAX)
                || (min <= SURROGATES.1 && max >= SURROGATES.0);
            if invalid {
                return Err(Error::Alphabet { min, max });
            }
        }
        Ok(Self {
            ranges: ranges.to_vec(),
            rng,
        })
    }

    pub(crate) fn next_char(&mut self) -> char {
        let idx = self.rng.random_range(0..self.ranges.len());
        let CodePoints(min, max) = self.ranges[idx];
        let point = self.rng.random_range(min..=max);
        // Ranges are validated to hold only scalar values.
        char::from_u32(point).unwrap_or(char::REPLACEMENT_CHARACTER)
    }
}

/// Strings with a sampled length filled from a [`CharTape`].
#[derive(Debug)]
pub(crate) struct StringSource {
    length: Sampler<u64>,
    tape: CharTape,
    seen: Option<FxHashSet<String>>,
}

impl StringSource {
    /// # Errors
    ///
    /// Fails if the length range is inverted, the skew is unusable or the
    /// alphabet is invalid.
    pub(crate) fn new(
        min_length: u64,
        max_length: u64,
        distribution: Distribution,
        unique: bool,
        tape: CharTape,
        length_rng: StdRng,
    ) -> Result<Self, Error> {
        Ok(Self {
            length: Sampler::new(min_length, max_length, distribution, false, length_rng)?,
            tape,
            seen: unique.then(FxHashSet::default),
        })
    }

    fn draw(&mut self) -> Result<String, Error> {
        let len = self.length.next()?;
        Ok((0..len).map(|_| self.tape.next_char()).collect())
    }

    /// # Errors
    ///
    /// Fails with [`Error::UniqueExhausted`] when unique and no fresh string
    /// turned up.
    pub(crate) fn next(&mut self) -> Result<String, Error> {
        if self.seen.is_none() {
            return self.draw();
        }
        for _ in 0..MAX_UNIQUE_ATTEMPTS {
            let s = self.draw()?;
            if let Some(seen) = self.seen.as_mut() {
                if !seen.contains(&s) {
                    seen.insert(s.clone());
                    return Ok(s);
                }
            }
        }
        Err(Error::UniqueExhausted)
    }
}
