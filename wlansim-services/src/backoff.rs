//! Retransmission backoff.
//!
//! The wait before retry `i` is `slot_time^(i+1)` seconds plus uniform
//! jitter in [-1, 1] s. After `max_retries` timeouts the attempt counter
//! resets to zero and the same schedule restarts; the sequence never
//! terminates on its own. That reset-instead-of-give-up behavior is
//! deliberate here (it matches the deployed association service) even
//! though it reads like an infinite retry loop.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug)]
pub struct Backoff {
    slot_time: f64,
    max_retries: u32,
    attempt: u32,
    rng: StdRng,
}

impl Backoff {
    pub fn new(slot_time: f64, max_retries: u32) -> Backoff {
        Backoff::with_seed(slot_time, max_retries, rand::rng().random())
    }

    /// Deterministic jitter for tests.
    pub fn with_seed(slot_time: f64, max_retries: u32, seed: u64) -> Backoff {
        Backoff {
            slot_time,
            max_retries: max_retries.max(1),
            attempt: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Wait before the next retransmission; advances (and wraps) the
    /// attempt counter.
    pub fn next_wait(&mut self) -> Duration {
        let jitter: f64 = self.rng.random_range(-1.0..=1.0);
        let wait = self.slot_time.powi(self.attempt as i32 + 1) + jitter;
        self.attempt += 1;
        if self.attempt >= self.max_retries {
            self.attempt = 0;
        }
        Duration::from_secs_f64(wait.max(0.0))
    }

    /// Back to attempt 0, e.g. after a successful exchange.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn waits_track_the_exponential_schedule_with_bounded_jitter() {
        let slot = 2.0f64;
        let mut backoff = Backoff::with_seed(slot, 3, 7);
        for cycle in 0..3 {
            for i in 0..3u32 {
                assert_eq!(backoff.attempt(), i, "cycle {cycle}");
                let wait = backoff.next_wait().as_secs_f64();
                let expected = slot.powi(i as i32 + 1);
                assert!(
                    (wait - expected).abs() <= 1.0,
                    "attempt {i}: wait {wait} not within 1s of {expected}"
                );
            }
            // Fourth timeout of each cycle starts over at attempt 0.
            assert_eq!(backoff.attempt(), 0);
        }
    }

    #[test]
    fn reset_restarts_the_schedule() {
        let mut backoff = Backoff::with_seed(2.0, 3, 1);
        backoff.next_wait();
        backoff.next_wait();
        assert_eq!(backoff.attempt(), 2);
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
    }

    proptest! {
        #[test]
        fn jitter_stays_within_one_second(seed in any::<u64>(), slot in 1.0f64..8.0) {
            let mut backoff = Backoff::with_seed(slot, 4, seed);
            for i in 0..4u32 {
                let wait = backoff.next_wait().as_secs_f64();
                let expected = slot.powi(i as i32 + 1);
                prop_assert!((wait - expected).abs() <= 1.0 + 1e-9);
            }
        }
    }

    #[test]
    fn wait_never_goes_negative() {
        // slot_time 0.5 with negative jitter would dip below zero.
        let mut backoff = Backoff::with_seed(0.5, 3, 42);
        for _ in 0..20 {
            let wait = backoff.next_wait();
            assert!(wait >= Duration::ZERO);
        }
    }
}
