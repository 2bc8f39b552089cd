//! Test RNGs.

use taleforge_core::rng::DeterministicRng;

/// Always returns `min` for `next_u32_range` and `0.0` for `next_f64`.
#[derive(Debug)]
pub struct MockRng;

impl DeterministicRng for MockRng {
    fn next_u32_range(&mut self, min: u32, _max: u32) -> u32 {
        min
    }

    fn next_f64(&mut self) -> f64 {
        0.0
    }
}

/// Returns values from a predetermined sequence. Panics when the integer
/// sequence is exhausted; fractions fall back to `0.0`.
#[derive(Debug)]
pub struct SequenceRng {
    values: Vec<u32>,
    index: usize,
    fractions: Vec<f64>,
    fraction_index: usize,
}

impl SequenceRng {
    /// Create a `SequenceRng` yielding `values` from `next_u32_range`.
    #[must_use]
    pub fn new(values: Vec<u32>) -> Self {
        Self::with_fractions(values, Vec::new())
    }

    /// Create a `SequenceRng` that also scripts `next_f64`.
    #[must_use]
    pub fn with_fractions(values: Vec<u32>, fractions: Vec<f64>) -> Self {
        Self {
            values,
            index: 0,
            fractions,
            fraction_index: 0,
        }
    }

    /// Integer values consumed so far.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.index
    }
}

impl DeterministicRng for SequenceRng {
    fn next_u32_range(&mut self, _min: u32, _max: u32) -> u32 {
        let val = self.values[self.index];
        self.index += 1;
        val
    }

    fn next_f64(&mut self) -> f64 {
        let val = self.fractions.get(self.fraction_index).copied().unwrap_or(0.0);
        self.fraction_index += 1;
        val
    }
}
