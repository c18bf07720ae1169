//! Daily spread and delay folding.

use thiserror::Error;

use crate::jitter::Jitter;

pub const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Ideal offsets (seconds since the trigger) for `n` jobs spread over one day.
///
/// `offset[i] = floor(i * 86400 / max(1, n - 1))`: the first job runs at 0 and
/// the last at the end of the window, linearly spaced in between. `n = 0`
/// yields an empty schedule and `n = 1` a single zero offset.
pub fn spread_offsets(n: usize) -> Vec<u64> {
    let divisor = n.saturating_sub(1).max(1) as u64;
    (0..n as u64)
        .map(|i| i * SECONDS_PER_DAY / divisor)
        .collect()
}

/// Fold an ideal offset into the channel's delay range.
///
/// Returns `min(ceiling, offset mod ceiling + jitter)`, so the result never
/// exceeds `ceiling`. A zero ceiling folds everything to zero.
pub fn fold_offset(offset: u64, ceiling: u64, jitter: u64) -> u64 {
    if ceiling == 0 {
        return 0;
    }
    ((offset % ceiling).saturating_add(jitter)).min(ceiling)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("delay ceiling must be positive")]
    ZeroCeiling,
}

/// Spread + fold for one dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPlan {
    ceiling: u64,
    max_jitter: u64,
}

impl DelayPlan {
    /// Queue delay ceiling used by FIFO channels (15 minutes).
    pub const DEFAULT_CEILING_SECS: u64 = 900;
    pub const DEFAULT_MAX_JITTER_SECS: u64 = 5;

    pub fn new(ceiling: u64, max_jitter: u64) -> Result<Self, PlanError> {
        if ceiling == 0 {
            return Err(PlanError::ZeroCeiling);
        }
        Ok(Self { ceiling, max_jitter })
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    pub fn max_jitter(&self) -> u64 {
        self.max_jitter
    }

    /// Folded delays (seconds) for a batch of `n` jobs, in batch order.
    pub fn delays(&self, n: usize, jitter: &dyn Jitter) -> Vec<u64> {
        spread_offsets(n)
            .into_iter()
            .map(|offset| fold_offset(offset, self.ceiling, jitter.sample(self.max_jitter)))
            .collect()
    }
}

impl Default for DelayPlan {
    fn default() -> Self {
        Self {
            ceiling: Self::DEFAULT_CEILING_SECS,
            max_jitter: Self::DEFAULT_MAX_JITTER_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jitter::{FixedJitter, RandomJitter};
    use proptest::prelude::*;

    #[test]
    fn empty_batch_has_no_offsets() {
        assert!(spread_offsets(0).is_empty());
        assert!(DelayPlan::default().delays(0, &RandomJitter).is_empty());
    }

    #[test]
    fn single_record_runs_immediately() {
        assert_eq!(spread_offsets(1), vec![0]);
        let delays = DelayPlan::default().delays(1, &RandomJitter);
        assert_eq!(delays.len(), 1);
        assert!(delays[0] < 900);
    }

    #[test]
    fn endpoints_cover_the_whole_day() {
        assert_eq!(spread_offsets(2), vec![0, SECONDS_PER_DAY]);
        assert_eq!(spread_offsets(3), vec![0, 43_200, 86_400]);
        assert_eq!(spread_offsets(5), vec![0, 21_600, 43_200, 64_800, 86_400]);
    }

    #[test]
    fn end_of_day_folds_back_to_window_start() {
        assert_eq!(fold_offset(86_400, 900, 0), 0);
        for j in 0..=5 {
            assert_eq!(fold_offset(86_400, 900, j), j);
        }
    }

    #[test]
    fn fold_clamps_to_ceiling() {
        assert_eq!(fold_offset(899, 900, 5), 900);
        assert_eq!(fold_offset(898, 900, 1), 899);
        assert_eq!(fold_offset(10, 0, 3), 0);
    }

    #[test]
    fn plan_rejects_zero_ceiling() {
        assert_eq!(DelayPlan::new(0, 5), Err(PlanError::ZeroCeiling));
    }

    #[test]
    fn deterministic_with_fixed_jitter() {
        let plan = DelayPlan::new(900, 5).unwrap();
        // 0, 43200 and 86400 are multiples of 900.
        assert_eq!(plan.delays(3, &FixedJitter(0)), vec![0, 0, 0]);
        assert_eq!(plan.delays(3, &FixedJitter(2)), vec![2, 2, 2]);
        assert_eq!(
            plan.delays(8, &FixedJitter(0)),
            vec![0, 642, 385, 128, 771, 514, 257, 0]
        );
    }

    proptest! {
        #[test]
        fn offsets_are_distinct_non_decreasing_and_start_at_zero(n in 2usize..5_000) {
            let offsets = spread_offsets(n);
            prop_assert_eq!(offsets.len(), n);
            prop_assert_eq!(offsets[0], 0);
            prop_assert_eq!(*offsets.last().unwrap(), SECONDS_PER_DAY);
            for pair in offsets.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }

        #[test]
        fn folded_delay_never_exceeds_ceiling(
            offset in 0u64..=SECONDS_PER_DAY,
            ceiling in 1u64..=900,
            jitter in 0u64..=5,
        ) {
            let folded = fold_offset(offset, ceiling, jitter);
            prop_assert!(folded <= ceiling);
            prop_assert_eq!(folded, ((offset % ceiling) + jitter).min(ceiling));
        }

        #[test]
        fn plan_delays_stay_within_ceiling(n in 0usize..2_000) {
            let plan = DelayPlan::default();
            let delays = plan.delays(n, &RandomJitter);
            prop_assert_eq!(delays.len(), n);
            prop_assert!(delays.iter().all(|d| *d <= plan.ceiling()));
        }
    }
}
