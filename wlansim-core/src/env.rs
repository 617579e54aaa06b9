//! Event environment: the logical-time timer queue.
//!
//! The environment pairs the [`LogicalClock`] with a ready-queue of scheduled
//! entries. Entries fire in strictly increasing deadline order; entries with
//! the same deadline fire in insertion order, so a scheduler built on top of
//! this is deterministic.
//!
//! The payload type is generic: the service scheduler stores service wake
//! tokens, tests store closures or plain markers.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

use crate::error::CoreError;
use crate::time::{LogicalClock, SimTime};

/// Handle for a scheduled entry, used to deregister pending timers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TimerId(u64);

struct TimerEntry<T> {
    deadline: SimTime,
    seq: u64,
    item: T,
}

impl<T> PartialEq for TimerEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<T> Eq for TimerEntry<T> {}

impl<T> PartialOrd for TimerEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for TimerEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Deadline first, insertion order second.
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Logical-time scheduler for coroutine-style suspension.
pub struct Environment<T> {
    clock: LogicalClock,
    queue: BinaryHeap<Reverse<TimerEntry<T>>>,
    cancelled: HashSet<u64>,
    seq: u64,
}

impl<T> Environment<T> {
    pub fn new() -> Self {
        Self {
            clock: LogicalClock::new(SimTime::ZERO),
            queue: BinaryHeap::new(),
            cancelled: HashSet::new(),
            seq: 0,
        }
    }

    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    /// Shared read handle on the simulation clock.
    pub fn clock(&self) -> LogicalClock {
        self.clock.clone()
    }

    /// Registers `item` to fire once logical time reaches `now + delay`.
    pub fn schedule_after(&mut self, delay: Duration, item: T) -> TimerId {
        let deadline = self.clock.now() + delay;
        self.push(deadline, item)
    }

    /// Registers `item` to fire at the absolute time `at`.
    ///
    /// Scheduling into the past is a caller bug and is rejected.
    pub fn schedule_at(&mut self, at: SimTime, item: T) -> Result<TimerId, CoreError> {
        if at < self.clock.now() {
            return Err(CoreError::invalid_argument(format!(
                "cannot schedule at {at:?}, clock is already at {:?}",
                self.clock.now()
            )));
        }
        Ok(self.push(at, item))
    }

    fn push(&mut self, deadline: SimTime, item: T) -> TimerId {
        let seq = self.seq;
        self.seq += 1;
        self.queue.push(Reverse(TimerEntry {
            deadline,
            seq,
            item,
        }));
        TimerId(seq)
    }

    /// Deregisters a pending timer. Returns false if it already fired or was
    /// never scheduled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        if id.0 >= self.seq {
            return false;
        }
        self.cancelled.insert(id.0)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.len() == self.cancelled.len()
    }

    /// Deadline of the earliest pending (non-cancelled) entry.
    pub fn next_deadline(&mut self) -> Option<SimTime> {
        self.skip_cancelled();
        self.queue.peek().map(|Reverse(e)| e.deadline)
    }

    /// Pops the earliest entry, advancing the clock to its deadline.
    pub fn pop_due(&mut self) -> Option<(TimerId, T)> {
        self.skip_cancelled();
        let Reverse(entry) = self.queue.pop()?;
        self.clock.advance_to(entry.deadline);
        Some((TimerId(entry.seq), entry.item))
    }

    /// Drives entries in time order until `dispatch` returns false, the
    /// queue drains, or `deadline` is reached. On a deadline stop the clock
    /// is advanced to the deadline and later entries stay queued.
    pub fn run_until<F>(&mut self, deadline: Option<SimTime>, mut dispatch: F)
    where
        F: FnMut(TimerId, T) -> bool,
    {
        loop {
            let next = match self.next_deadline() {
                Some(next) => next,
                None => break,
            };
            if let Some(limit) = deadline {
                if next > limit {
                    self.clock.advance_to(limit);
                    break;
                }
            }
            // Guaranteed present, next_deadline just saw it.
            if let Some((id, item)) = self.pop_due() {
                if !dispatch(id, item) {
                    break;
                }
            }
        }
    }

    fn skip_cancelled(&mut self) {
        while let Some(Reverse(entry)) = self.queue.peek() {
            if self.cancelled.remove(&entry.seq) {
                self.queue.pop();
            } else {
                break;
            }
        }
    }
}

impl<T> Default for Environment<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_deadline_order() {
        let mut env: Environment<&str> = Environment::new();
        env.schedule_after(Duration::from_secs(3), "late");
        env.schedule_after(Duration::from_secs(1), "early");
        env.schedule_after(Duration::from_secs(2), "middle");

        let mut order = Vec::new();
        env.run_until(None, |_, item| {
            order.push(item);
            true
        });
        assert_eq!(order, vec!["early", "middle", "late"]);
        assert_eq!(env.now(), SimTime::ZERO + Duration::from_secs(3));
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut env: Environment<u32> = Environment::new();
        for i in 0..10 {
            env.schedule_after(Duration::from_secs(1), i);
        }
        let mut order = Vec::new();
        env.run_until(None, |_, item| {
            order.push(item);
            true
        });
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn cancelled_timers_do_not_fire() {
        let mut env: Environment<&str> = Environment::new();
        let keep = env.schedule_after(Duration::from_secs(1), "keep");
        let drop = env.schedule_after(Duration::from_secs(2), "drop");
        assert!(env.cancel(drop));
        assert!(!env.cancel(drop), "double cancel");
        let _ = keep;

        let mut fired = Vec::new();
        env.run_until(None, |_, item| {
            fired.push(item);
            true
        });
        assert_eq!(fired, vec!["keep"]);
    }

    #[test]
    fn deadline_stops_the_run_and_advances_clock() {
        let mut env: Environment<&str> = Environment::new();
        env.schedule_after(Duration::from_secs(5), "later");
        let limit = SimTime::ZERO + Duration::from_secs(2);
        let mut fired = Vec::new();
        env.run_until(Some(limit), |_, item| {
            fired.push(item);
            true
        });
        assert!(fired.is_empty());
        assert_eq!(env.now(), limit);
        assert!(!env.is_empty());
    }

    #[test]
    fn scheduling_into_the_past_is_rejected() {
        let mut env: Environment<()> = Environment::new();
        env.schedule_after(Duration::from_secs(1), ());
        env.run_until(None, |_, _| true);
        let past = SimTime::ZERO;
        assert!(matches!(
            env.schedule_at(past, ()),
            Err(CoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn dispatch_predicate_stops_early() {
        let mut env: Environment<u32> = Environment::new();
        for i in 0..5 {
            env.schedule_after(Duration::from_secs(i as u64), i);
        }
        let mut seen = Vec::new();
        env.run_until(None, |_, item| {
            seen.push(item);
            item < 2
        });
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(!env.is_empty());
    }
}
