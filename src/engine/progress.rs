//! Per-run progress tracking.

/// Completed share of a run. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressState {
    completed_weight: u64,
    total_weight: u64,
}

impl ProgressState {
    /// A zero total is clamped to 1 so percent is always defined
    pub fn new(total_weight: u64) -> Self {
        Self {
            completed_weight: 0,
            total_weight: total_weight.max(1),
        }
    }

    /// Record a finished step. Completion never exceeds the total.
    pub fn advance(&mut self, weight: u32) -> u8 {
        self.completed_weight = self
            .completed_weight
            .saturating_add(u64::from(weight))
            .min(self.total_weight);
        self.percent()
    }

    /// Whole percent, rounded down
    #[inline]
    pub fn percent(&self) -> u8 {
        // Bounded by 100 because completed <= total
        (self.completed_weight * 100 / self.total_weight) as u8
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.completed_weight == self.total_weight
    }

    pub fn completed_weight(&self) -> u64 {
        self.completed_weight
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_reaches_hundred_only_at_end() {
        let mut progress = ProgressState::new(16);
        let mut last = 0;
        for step in 0..16 {
            let p = progress.advance(1);
            assert!(p >= last);
            last = p;
            if step < 15 {
                assert!(p < 100);
            }
        }
        assert_eq!(last, 100);
        assert!(progress.is_complete());
    }

    #[test]
    fn test_overshoot_is_clamped() {
        let mut progress = ProgressState::new(3);
        progress.advance(10);
        assert_eq!(progress.percent(), 100);
        assert_eq!(progress.completed_weight(), 3);
    }

    #[test]
    fn test_zero_total_does_not_divide_by_zero() {
        let progress = ProgressState::new(0);
        assert_eq!(progress.total_weight(), 1);
        assert_eq!(progress.percent(), 0);
    }
}
