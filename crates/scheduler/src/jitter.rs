use std::sync::Arc;

use rand::Rng;

/// Source of the small random offset added after folding.
///
/// Injected so the deterministic part of the schedule can be tested with a
/// fixed value.
pub trait Jitter: Send + Sync {
    /// Sample a value in `[0, max]`.
    fn sample(&self, max: u64) -> u64;
}

/// Uniform jitter from the thread-local RNG.
#[derive(Debug, Default, Copy, Clone)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn sample(&self, max: u64) -> u64 {
        rand::thread_rng().gen_range(0..=max)
    }
}

/// Always returns the same value (capped at `max`).
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct FixedJitter(pub u64);

impl Jitter for FixedJitter {
    fn sample(&self, max: u64) -> u64 {
        self.0.min(max)
    }
}

impl<J> Jitter for Arc<J>
where
    J: Jitter + ?Sized,
{
    fn sample(&self, max: u64) -> u64 {
        (**self).sample(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_jitter_stays_in_range() {
        let jitter = RandomJitter;
        for _ in 0..1_000 {
            assert!(jitter.sample(5) <= 5);
        }
        assert_eq!(jitter.sample(0), 0);
    }

    #[test]
    fn fixed_jitter_is_capped() {
        assert_eq!(FixedJitter(3).sample(5), 3);
        assert_eq!(FixedJitter(9).sample(5), 5);
    }
}
