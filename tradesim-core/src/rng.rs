//! Deterministic RNG hierarchy.
//!
//! A master seed yields one sub-seed per `(run_id, iteration)` pair via BLAKE3,
//! so parallel sweeps draw identical slippage regardless of thread scheduling.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::broker::SeededSlippage;

#[derive(Debug, Clone)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Sub-seed for `(run_id, iteration)`. Independent of derivation order.
    pub fn sub_seed(&self, run_id: &str, iteration: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(run_id.as_bytes());
        hasher.update(&iteration.to_le_bytes());
        let hash = hasher.finalize();
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(seed)
    }

    pub fn rng_for(&self, run_id: &str, iteration: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(run_id, iteration))
    }

    /// Seeded slippage source for one run.
    pub fn slippage_for(&self, run_id: &str, iteration: u64) -> SeededSlippage {
        SeededSlippage::from_rng(self.rng_for(run_id, iteration))
    }
}
