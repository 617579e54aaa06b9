//! Logical time.
//!
//! Device services run against a virtual clock with nanosecond resolution.
//! The clock never moves on its own: the owning environment advances it when
//! it dispatches the next scheduled timer, which makes simulated time
//! deterministic and fast-forwardable in tests.

use std::fmt;
use std::ops::{Add, Sub};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A point in simulated time, nanoseconds since simulation start.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SimTime(u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub const fn from_nanos(ns: u64) -> Self {
        SimTime(ns)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        SimTime(Duration::from_secs_f64(secs.max(0.0)).as_nanos() as u64)
    }

    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1e9
    }

    pub fn saturating_sub(&self, other: SimTime) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(other.0))
    }
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Duration) -> SimTime {
        SimTime(self.0.saturating_add(rhs.as_nanos() as u64))
    }
}

impl Sub for SimTime {
    type Output = Duration;

    fn sub(self, rhs: SimTime) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Debug for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

/// Shared handle on the simulation clock.
///
/// Cheap to clone; reads are lock-free. Only the environment that owns the
/// timer queue advances it.
#[derive(Clone, Default)]
pub struct LogicalClock {
    offset: Arc<AtomicU64>,
}

impl LogicalClock {
    pub fn new(start: SimTime) -> Self {
        Self {
            offset: Arc::new(AtomicU64::new(start.as_nanos())),
        }
    }

    #[inline]
    pub fn now(&self) -> SimTime {
        SimTime(self.offset.load(Ordering::Acquire))
    }

    /// Moves the clock forward to `to`. Moving backwards is ignored so that
    /// a late observer can never rewind time.
    pub fn advance_to(&self, to: SimTime) {
        self.offset.fetch_max(to.as_nanos(), Ordering::AcqRel);
    }
}
