//! Deterministic RNG hierarchy.
//!
//! A master seed generates sub-seeds for each `(run_id, stream, iteration)`
//! tuple via BLAKE3, independently of thread scheduling order, so Monte Carlo
//! results are identical regardless of thread count.

use rand::rngs::StdRng;
use rand::SeedableRng;

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

    /// Derive the sub-seed for one `(run_id, stream, iteration)`.
    pub fn sub_seed(&self, run_id: &str, stream: &str, iteration: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(run_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(stream.as_bytes());
        hasher.update(&iteration.to_le_bytes());
        let hash = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }

    pub fn rng_for(&self, run_id: &str, stream: &str, iteration: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(run_id, stream, iteration))
    }
}
