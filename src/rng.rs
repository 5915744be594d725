//! Seedable random number generator for deterministic testing.
//!
//! When a seed is provided via [`HandshakeConfig::rng_seed`], randoms, cookies,
//! retransmission jitter and ephemeral keys are all deterministic. This is useful
//! for testing and debugging, never for production.
//!
//! [`HandshakeConfig::rng_seed`]: crate::HandshakeConfig::rng_seed

use rand::rngs::StdRng;
use rand::{CryptoRng, RngCore, SeedableRng};

/// A random number generator that can be seeded for deterministic behavior.
///
/// Without a seed it is seeded from the operating system.
pub struct SeededRng {
    inner: StdRng,
    seeded: bool,
}

impl SeededRng {
    /// Create a new RNG with an optional seed.
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => SeededRng {
                inner: StdRng::seed_from_u64(seed),
                seeded: true,
            },
            None => SeededRng {
                inner: StdRng::from_entropy(),
                seeded: false,
            },
        }
    }
}

impl RngCore for SeededRng {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}

// StdRng is a CSPRNG.
impl CryptoRng for SeededRng {}

impl std::fmt::Debug for SeededRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeededRng")
            .field("seeded", &self.seeded)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn seeded_rng_is_deterministic() {
        let mut rng1 = SeededRng::new(Some(12345));
        let mut rng2 = SeededRng::new(Some(12345));

        let values1: [u8; 10] = rng1.gen();
        let values2: [u8; 10] = rng2.gen();

        assert_eq!(values1, values2, "Same seed should produce same values");
    }

    #[test]
    fn different_seeds_differ() {
        let mut rng1 = SeededRng::new(Some(1));
        let mut rng2 = SeededRng::new(Some(2));

        let a: u64 = rng1.gen();
        let b: u64 = rng2.gen();
        assert_ne!(a, b);
    }
}
