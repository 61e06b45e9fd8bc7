//! Trailing-edge debounce driven by caller-supplied instants.

use std::time::{Duration, Instant};

/// A deferred value that fires once `delay` has passed since the most recent
/// [`Debounce::schedule`]. Scheduling again before then replaces the value and
/// restarts the wait, so only the last one ever fires.
#[derive(Debug, Clone)]
pub struct Debounce<T> {
    delay: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> Debounce<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn schedule(&mut self, now: Instant, value: T) {
        self.pending = Some((now, value));
    }

    /// The pending value, if its delay has elapsed at `now`.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        let (armed, _) = self.pending.as_ref()?;
        if now.saturating_duration_since(*armed) < self.delay {
            return None;
        }
        self.pending.take().map(|(_, value)| value)
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(_, value)| value)
    }

    /// When the pending value becomes due.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(armed, _)| *armed + self.delay)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(300);

    #[test]
    fn fires_after_the_delay() {
        let t0 = Instant::now();
        let mut d = Debounce::new(DELAY);
        d.schedule(t0, "a");
        assert_eq!(d.take_due(t0 + Duration::from_millis(299)), None);
        assert_eq!(d.take_due(t0 + DELAY), Some("a"));
        assert!(!d.is_pending());
        assert_eq!(d.take_due(t0 + DELAY * 2), None);
    }

    #[test]
    fn rescheduling_restarts_and_keeps_the_last_value() {
        let t0 = Instant::now();
        let mut d = Debounce::new(DELAY);
        d.schedule(t0, 1);
        d.schedule(t0 + Duration::from_millis(200), 2);
        assert_eq!(d.deadline(), Some(t0 + Duration::from_millis(500)));
        assert_eq!(d.take_due(t0 + Duration::from_millis(400)), None);
        assert_eq!(d.take_due(t0 + Duration::from_millis(500)), Some(2));
    }

    #[test]
    fn cancel_drops_the_pending_value() {
        let t0 = Instant::now();
        let mut d = Debounce::new(DELAY);
        d.schedule(t0, ());
        assert_eq!(d.cancel(), Some(()));
        assert_eq!(d.deadline(), None);
        assert_eq!(d.take_due(t0 + DELAY), None);
    }
}
