use super::params::SEED_BYTE_LEN;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use turboshake::TurboShake128;

/// Source of uniformly distributed integers, drawn in sequence.
///
/// Implementations must be fully determined by how they were constructed, so that two parties holding the same seed draw the
/// same values, in the same order.
pub trait RandomStream {
    /// Returns a uniformly random integer in `[0, bound)`. `bound` must be non-zero.
    fn next_below(&mut self, bound: u32) -> u32;
}

/// Call-scoped ChaCha8 stream, seeded from a 64-bit value.
///
/// Each call owning one of these draws from its own stream, hence concurrent calls, with same or different seeds, never interfere.
#[derive(Clone)]
pub struct SeededStream {
    rng: ChaCha8Rng,
}

impl SeededStream {
    pub fn new(seed: u64) -> SeededStream {
        SeededStream {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl RandomStream for SeededStream {
    #[inline(always)]
    fn next_below(&mut self, bound: u32) -> u32 {
        self.rng.random_range(0..bound)
    }
}

/// Derives the 64-bit permutation seed, shared by client and server of the single-pass protocol, from a SEED_BYTE_LEN -byte seed,
/// using TurboSHAKE128 xof.
pub fn derive_permutation_seed(seed: &[u8; SEED_BYTE_LEN]) -> u64 {
    let mut hasher = TurboShake128::default();
    hasher.absorb(seed);
    hasher.finalize::<{ TurboShake128::DEFAULT_DOMAIN_SEPARATOR }>();

    let mut seed_bytes = [0u8; std::mem::size_of::<u64>()];
    hasher.squeeze(&mut seed_bytes);

    u64::from_le_bytes(seed_bytes)
}
