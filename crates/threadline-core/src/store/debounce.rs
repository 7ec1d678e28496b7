//! Trailing-edge debounce for view recomputation.
//!
//! A `Debouncer` is the pending-timer handle of one tier. Nothing sleeps
//! here: the host loop asks for the next deadline and calls back in.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    /// Scheduled fire time, if a recompute is pending
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn from_millis(delay_ms: u64) -> Self {
        Self::new(Duration::from_millis(delay_ms))
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Schedule a fire after the delay. Replaces any pending deadline, so a
    /// burst of triggers fires once, `delay` after the last one.
    pub fn trigger(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    /// Returns true once the deadline has passed. Clears the deadline when it
    /// fires.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(fire_at) if now >= fire_at => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_after_delay() {
        let start = Instant::now();
        let mut debouncer = Debouncer::from_millis(250);
        assert!(!debouncer.fire_if_due(start));

        debouncer.trigger(start);
        assert!(debouncer.is_pending());
        assert!(!debouncer.fire_if_due(start + Duration::from_millis(249)));
        assert!(debouncer.fire_if_due(start + Duration::from_millis(250)));
        // once
        assert!(!debouncer.fire_if_due(start + Duration::from_millis(500)));
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_trigger_pushes_deadline_back() {
        let start = Instant::now();
        let mut debouncer = Debouncer::from_millis(250);
        debouncer.trigger(start);
        debouncer.trigger(start + Duration::from_millis(200));

        assert!(!debouncer.fire_if_due(start + Duration::from_millis(300)));
        assert_eq!(
            debouncer.deadline(),
            Some(start + Duration::from_millis(450))
        );
        assert!(debouncer.fire_if_due(start + Duration::from_millis(450)));
    }

    #[test]
    fn test_cancel() {
        let start = Instant::now();
        let mut debouncer = Debouncer::from_millis(3000);
        debouncer.trigger(start);
        debouncer.cancel();
        assert!(!debouncer.fire_if_due(start + Duration::from_secs(10)));
    }
}
