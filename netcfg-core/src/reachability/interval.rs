/// Adaptive polling interval of the reachability monitor, in seconds.
///
/// Sustained success doubles the interval up to `max`. A failure, or the
/// first success after a failure, drops it back to `min` so flapping links
/// are re-checked quickly.
#[derive(Debug, Clone)]
pub struct AdaptiveInterval {
    min: u64,
    max: u64,
    current: u64,
    last_available: Option<bool>,
}

impl AdaptiveInterval {
    pub fn new(min: u64, max: u64) -> Self {
        let min = min.max(1);
        let max = max.max(min);
        Self {
            min,
            max,
            current: min,
            last_available: None,
        }
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn last_available(&self) -> Option<bool> {
        self.last_available
    }

    /// Applies one probe result and returns the new interval.
    pub fn record(&mut self, available: bool) -> u64 {
        self.current = match (available, self.last_available) {
            (false, _) => self.min,
            (true, Some(false)) => self.min,
            (true, _) => self.current.saturating_mul(2).min(self.max),
        };
        self.last_available = Some(available);
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(interval: &mut AdaptiveInterval, results: &[bool]) -> Vec<u64> {
        results.iter().map(|&r| interval.record(r)).collect()
    }

    #[test]
    fn sustained_success_doubles() {
        let mut interval = AdaptiveInterval::new(1, 64);
        assert_eq!(interval.current(), 1);
        assert_eq!(run(&mut interval, &[true, true, true]), vec![2, 4, 8]);
    }

    #[test]
    fn failure_resets_immediately() {
        let mut interval = AdaptiveInterval::new(1, 64);
        assert_eq!(run(&mut interval, &[true, true, false]), vec![2, 4, 1]);
        assert_eq!(interval.last_available(), Some(false));
    }

    #[test]
    fn recovery_after_failure_starts_from_minimum() {
        let mut interval = AdaptiveInterval::new(1, 64);
        assert_eq!(run(&mut interval, &[false, true, true]), vec![1, 1, 2]);
    }

    #[test]
    fn interval_is_capped() {
        let mut interval = AdaptiveInterval::new(1, 64);
        let seq = run(&mut interval, &[true; 9]);
        assert_eq!(seq, vec![2, 4, 8, 16, 32, 64, 64, 64, 64]);
    }

    #[test]
    fn bounds_are_sanitised() {
        let interval = AdaptiveInterval::new(0, 0);
        assert_eq!(interval.min(), 1);
        assert_eq!(interval.current(), 1);
    }

    #[test]
    fn reset_keeps_last_result() {
        let mut interval = AdaptiveInterval::new(1, 64);
        run(&mut interval, &[true, true]);
        interval.reset();
        assert_eq!(interval.current(), 1);
        assert_eq!(interval.last_available(), Some(true));
    }
}
