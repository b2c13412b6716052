//! Slippage sources.
//!
//! The broker never touches an ambient RNG. Each run owns one `SlippageModel`,
//! which returns a slippage amount in `[0, max]` (price units) every time a fill
//! happens. The broker applies it adversely: buys pay more, sells receive less.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of slippage amounts.
pub trait SlippageModel: Send + Sync {
    /// Draw a slippage amount in `[0, max]`.
    fn sample(&mut self, max: f64) -> f64;

    fn name(&self) -> &str;
}

/// Uniform slippage from a seeded `StdRng`. Same seed, same fills.
#[derive(Debug, Clone)]
pub struct SeededSlippage {
    rng: StdRng,
}

impl SeededSlippage {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_rng(rng: StdRng) -> Self {
        Self { rng }
    }
}

impl SlippageModel for SeededSlippage {
    fn sample(&mut self, max: f64) -> f64 {
        if !(max.is_finite() && max > 0.0) {
            return 0.0;
        }
        self.rng.gen_range(0.0..=max)
    }

    fn name(&self) -> &str {
        "Seeded"
    }
}

/// No slippage.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSlippage;

impl SlippageModel for NoSlippage {
    fn sample(&mut self, _max: f64) -> f64 {
        0.0
    }

    fn name(&self) -> &str {
        "None"
    }
}

/// A constant fraction of the maximum (1.0 = always worst case).
#[derive(Debug, Clone, Copy)]
pub struct FixedSlippage {
    fraction: f64,
}

impl FixedSlippage {
    pub fn new(fraction: f64) -> Self {
        Self {
            fraction: if fraction.is_finite() {
                fraction.clamp(0.0, 1.0)
            } else {
                0.0
            },
        }
    }

    pub fn worst_case() -> Self {
        Self::new(1.0)
    }
}

impl SlippageModel for FixedSlippage {
    fn sample(&mut self, max: f64) -> f64 {
        if !(max.is_finite() && max > 0.0) {
            return 0.0;
        }
        max * self.fraction
    }

    fn name(&self) -> &str {
        "Fixed"
    }
}

/// Cycles through a fixed list of fractions of the maximum.
#[derive(Debug, Clone)]
pub struct SlippageSequence {
    fractions: Vec<f64>,
    cursor: usize,
}

impl SlippageSequence {
    pub fn new(fractions: Vec<f64>) -> Self {
        Self {
            fractions: fractions
                .into_iter()
                .map(|f| if f.is_finite() { f.clamp(0.0, 1.0) } else { 0.0 })
                .collect(),
            cursor: 0,
        }
    }
}

impl SlippageModel for SlippageSequence {
    fn sample(&mut self, max: f64) -> f64 {
        if self.fractions.is_empty() || !(max.is_finite() && max > 0.0) {
            return 0.0;
        }
        let f = self.fractions[self.cursor % self.fractions.len()];
        self.cursor += 1;
        max * f
    }

    fn name(&self) -> &str {
        "Sequence"
    }
}
