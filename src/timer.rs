//! Software timers executed from the event loop's tick.
//!
//! A timer is a schedulable unit of work: it fires once ([`TimerKind::Timeout`])
//! or repeatedly ([`TimerKind::Interval`]) based on elapsed time. The server
//! checks every registered timer at the start of each tick; resolution is
//! therefore bounded by the tick cadence, not by the OS clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Global atomic counter for timer IDs.
static TIMER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Result of one timer callback execution.
pub type TimerResult = Result<(), Box<dyn std::error::Error>>;

/// Unique identifier for a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    /// Generate a new unique timer ID.
    pub fn new() -> Self {
        Self(TIMER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TimerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Whether a timer fires once or repeatedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires on every period until explicitly removed.
    Interval,
    /// Fires once, then the server removes it from the registry.
    Timeout,
}

/// A schedulable unit of work with a captured callback.
pub struct Timer {
    id: TimerId,
    kind: TimerKind,
    next_fire: Instant,
    period: Duration,
    callback: Box<dyn FnMut() -> TimerResult>,
    executions: u64,
}

impl Timer {
    /// A one-shot timer firing after `delay`.
    pub fn timeout<F>(delay: Duration, callback: F) -> Self
    where
        F: FnMut() -> TimerResult + 'static,
    {
        Self {
            id: TimerId::new(),
            kind: TimerKind::Timeout,
            next_fire: Instant::now() + delay,
            period: delay,
            callback: Box::new(callback),
            executions: 0,
        }
    }

    /// A repeating timer firing every `period`.
    pub fn interval<F>(period: Duration, callback: F) -> Self
    where
        F: FnMut() -> TimerResult + 'static,
    {
        Self {
            id: TimerId::new(),
            kind: TimerKind::Interval,
            next_fire: Instant::now() + period,
            period,
            callback: Box::new(callback),
            executions: 0,
        }
    }

    /// This timer's ID.
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Whether this timer repeats.
    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    /// How many times the callback has run.
    pub fn executions(&self) -> u64 {
        self.executions
    }

    /// When the timer is next due.
    pub fn next_fire(&self) -> Instant {
        self.next_fire
    }

    /// Pure time predicate: due iff `now` has reached the next-fire time.
    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_fire
    }

    /// Run the callback once and reschedule.
    ///
    /// Interval timers advance from the previously scheduled time rather
    /// than from "now", so late ticks do not accumulate drift.
    pub fn fire(&mut self) -> TimerResult {
        self.executions += 1;
        if self.kind == TimerKind::Interval {
            self.next_fire += self.period;
        }
        (self.callback)()
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("period", &self.period)
            .field("executions", &self.executions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn timer_id_unique() {
        assert_ne!(TimerId::new(), TimerId::new());
    }

    #[test]
    fn due_predicate_is_pure_time_comparison() {
        let timer = Timer::timeout(Duration::from_secs(10), || Ok(()));
        let now = Instant::now();
        assert!(!timer.is_due(now));
        assert!(timer.is_due(now + Duration::from_secs(11)));
    }

    #[test]
    fn fire_runs_callback_and_counts() {
        let count = Rc::new(Cell::new(0u32));
        let seen = Rc::clone(&count);
        let mut timer = Timer::timeout(Duration::ZERO, move || {
            seen.set(seen.get() + 1);
            Ok(())
        });

        timer.fire().unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(timer.executions(), 1);
    }

    #[test]
    fn interval_reschedules_from_previous_schedule() {
        let period = Duration::from_millis(100);
        let mut timer = Timer::interval(period, || Ok(()));
        let first = timer.next_fire();

        timer.fire().unwrap();
        assert_eq!(timer.next_fire(), first + period, "no drift from a late fire");

        timer.fire().unwrap();
        assert_eq!(timer.next_fire(), first + period * 2);
    }

    #[test]
    fn timeout_keeps_its_schedule_after_firing() {
        let mut timer = Timer::timeout(Duration::ZERO, || Ok(()));
        let scheduled = timer.next_fire();
        timer.fire().unwrap();
        assert_eq!(timer.next_fire(), scheduled);
    }

    #[test]
    fn callback_errors_are_returned_not_panicked() {
        let mut timer = Timer::interval(Duration::from_millis(1), || Err("boom".into()));
        assert!(timer.fire().is_err());
        // The timer itself stays usable.
        assert!(timer.fire().is_err());
        assert_eq!(timer.executions(), 2);
    }
}
