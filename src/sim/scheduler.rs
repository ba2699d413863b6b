//! Virtual clock and ordered event queue.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

use super::Event;

/// A point in virtual time, in microseconds since simulation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimTime(u64);

impl SimTime {
    /// Simulation start.
    pub const ZERO: SimTime = SimTime(0);

    /// Construct from microseconds.
    pub const fn from_micros(us: u64) -> Self {
        SimTime(us)
    }

    /// Microseconds since simulation start.
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Seconds since simulation start.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Elapsed time since `earlier`, saturating at zero.
    pub fn since(self, earlier: SimTime) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Duration) -> SimTime {
        SimTime(self.0 + rhs.as_micros() as u64)
    }
}

impl Sub<SimTime> for SimTime {
    type Output = Duration;

    fn sub(self, rhs: SimTime) -> Duration {
        self.since(rhs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

/// Identifier of a scheduled event, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct Entry {
    at: SimTime,
    id: TimerId,
    event: Event,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.id == other.id
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Insertion id breaks timestamp ties, giving FIFO order within a
        // single instant.
        (self.at, self.id.0).cmp(&(other.at, other.id.0))
    }
}

/// Ordered event queue with lazy cancellation.
pub struct Scheduler {
    now: SimTime,
    queue: BinaryHeap<Reverse<Entry>>,
    canceled: HashSet<TimerId>,
    next_id: u64,
}

impl Scheduler {
    /// Create an empty scheduler at time zero.
    pub fn new() -> Self {
        Self {
            now: SimTime::ZERO,
            queue: BinaryHeap::new(),
            canceled: HashSet::new(),
            next_id: 0,
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedule an event `delay` after the current time.
    pub fn schedule_in(&mut self, delay: Duration, event: Event) -> TimerId {
        self.schedule_at(self.now + delay, event)
    }

    /// Schedule an event at an absolute time. Times in the past fire at the
    /// current instant.
    pub fn schedule_at(&mut self, at: SimTime, event: Event) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let at = at.max(self.now);
        self.queue.push(Reverse(Entry { at, id, event }));
        id
    }

    /// Cancel a scheduled event. Canceled entries are dropped when popped.
    pub fn cancel(&mut self, id: TimerId) {
        self.canceled.insert(id);
    }

    /// Pop the next live event, advancing the clock.
    pub fn pop(&mut self) -> Option<(SimTime, Event)> {
        while let Some(Reverse(entry)) = self.queue.pop() {
            if self.canceled.remove(&entry.id) {
                continue;
            }
            self.now = entry.at;
            return Some((entry.at, entry.event));
        }
        None
    }

    /// Number of queued entries, canceled ones included.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when no entries remain.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_fire_in_time_order() {
        let mut sched = Scheduler::new();
        sched.schedule_in(Duration::from_micros(300), Event::NextPage);
        sched.schedule_in(Duration::from_micros(100), Event::PageDeadline { page: 0 });

        let (t1, e1) = sched.pop().unwrap();
        assert_eq!(t1.as_micros(), 100);
        assert!(matches!(e1, Event::PageDeadline { page: 0 }));

        let (t2, e2) = sched.pop().unwrap();
        assert_eq!(t2.as_micros(), 300);
        assert!(matches!(e2, Event::NextPage));
    }

    #[test]
    fn test_fifo_within_same_instant() {
        let mut sched = Scheduler::new();
        sched.schedule_in(Duration::ZERO, Event::PageDeadline { page: 1 });
        sched.schedule_in(Duration::ZERO, Event::PageDeadline { page: 2 });

        assert!(matches!(
            sched.pop().unwrap().1,
            Event::PageDeadline { page: 1 }
        ));
        assert!(matches!(
            sched.pop().unwrap().1,
            Event::PageDeadline { page: 2 }
        ));
    }

    #[test]
    fn test_cancel_is_lazy_but_final() {
        let mut sched = Scheduler::new();
        let keep = sched.schedule_in(Duration::from_micros(10), Event::NextPage);
        let drop = sched.schedule_in(Duration::from_micros(5), Event::PageDeadline { page: 0 });
        sched.cancel(drop);

        let (_, event) = sched.pop().unwrap();
        assert!(matches!(event, Event::NextPage));
        assert!(sched.pop().is_none());

        // Canceling something already fired changes nothing.
        sched.cancel(keep);
        assert!(sched.pop().is_none());
    }

    #[test]
    fn test_clock_advances_monotonically() {
        let mut sched = Scheduler::new();
        sched.schedule_in(Duration::from_micros(50), Event::NextPage);
        sched.pop();
        assert_eq!(sched.now().as_micros(), 50);

        // Scheduling in the past clamps to now.
        sched.schedule_at(SimTime::from_micros(10), Event::NextPage);
        let (t, _) = sched.pop().unwrap();
        assert_eq!(t.as_micros(), 50);
    }
}
