//! Seeded RNG wrapper for reproducible behavior.
//!
//! Provides a thread-safe, seeded random number generator for sensor noise and
//! deterministic failure scenarios in tests.

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded RNG wrapper for reproducible random behavior
pub struct MockRng {
    inner: Mutex<ChaCha8Rng>,
}

impl MockRng {
    /// Create a new RNG with optional seed.
    /// If seed is None, uses a random seed from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            inner: Mutex::new(rng),
        }
    }

    /// Returns true with probability `rate` (clamped to `[0, 1]`).
    pub fn should_fail(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        self.inner.lock().r#gen::<f64>() < rate
    }

    /// Random f64 in `[0.0, 1.0)`
    pub fn next_f64(&self) -> f64 {
        self.inner.lock().r#gen()
    }

    /// Fill `out` with uniform offsets in `[-amplitude, amplitude]`.
    ///
    /// Takes the lock once for the whole buffer.
    pub fn fill_noise(&self, out: &mut [f64], amplitude: f64) {
        if amplitude <= 0.0 {
            out.iter_mut().for_each(|v| *v = 0.0);
            return;
        }
        let mut rng = self.inner.lock();
        for v in out.iter_mut() {
            *v = rng.gen_range(-amplitude..=amplitude);
        }
    }
}

impl Default for MockRng {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for MockRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRng")
            .field("inner", &"<Mutex<ChaCha8Rng>>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_rng_deterministic() {
        let rng1 = MockRng::new(Some(42));
        let rng2 = MockRng::new(Some(42));
        assert_eq!(rng1.next_f64(), rng2.next_f64());

        let mut a = [0.0; 16];
        let mut b = [0.0; 16];
        rng1.fill_noise(&mut a, 3.0);
        rng2.fill_noise(&mut b, 3.0);
        assert_eq!(a, b, "Same seed should produce same noise");
    }

    #[test]
    fn test_should_fail_bounds() {
        let rng = MockRng::new(Some(42));
        for _ in 0..100 {
            assert!(!rng.should_fail(0.0), "Rate 0.0 should never fail");
            assert!(rng.should_fail(1.0), "Rate 1.0 should always fail");
        }
    }

    #[test]
    fn test_should_fail_probability() {
        let rng = MockRng::new(Some(42));
        let rate = 0.3;
        let samples = 10000;
        let failures = (0..samples).filter(|_| rng.should_fail(rate)).count();

        // Allow 10% deviation around 3000
        assert!(
            failures > 2700 && failures < 3300,
            "Expected ~3000 failures, got {}",
            failures
        );
    }

    #[test]
    fn test_noise_amplitude() {
        let rng = MockRng::new(Some(7));
        let mut buf = [0.0; 1000];
        rng.fill_noise(&mut buf, 2.5);
        assert!(buf.iter().all(|v| v.abs() <= 2.5));
        assert!(buf.iter().any(|v| *v != 0.0));

        rng.fill_noise(&mut buf, 0.0);
        assert!(buf.iter().all(|v| *v == 0.0));
    }
}
