//! Injectable time, randomness, and id generation.
//!
//! Every nondeterminism source the engine touches (wall clock,
//! random jitter, random strings, UUIDs) is routed through this
//! trait rather than called directly, so a test harness can supply a
//! fixed/sequential implementation and replay identical output.

use chrono::Utc;
use rand::Rng;

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
    fn now_us(&self) -> u64;
    fn now_rfc3339(&self) -> String;
    fn now_formatted(&self, fmt: &str) -> String;
    fn random_hex(&self, n: usize) -> String;
    fn random_uuid(&self) -> String;
    /// Jitter multiplier in `[0.5, 1.5)`, used by the retry backoff.
    fn jitter(&self) -> f64;
}

/// Real-clock, real-random implementation used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        Utc::now().timestamp_millis() as u64
    }

    fn now_us(&self) -> u64 {
        Utc::now().timestamp_micros() as u64
    }

    fn now_rfc3339(&self) -> String {
        Utc::now().to_rfc3339()
    }

    fn now_formatted(&self, fmt: &str) -> String {
        Utc::now().format(fmt).to_string()
    }

    fn random_hex(&self, n: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..n)
            .map(|_| {
                let v: u8 = rng.gen_range(0..16);
                std::char::from_digit(v as u32, 16).unwrap()
            })
            .collect()
    }

    fn random_uuid(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn jitter(&self) -> f64 {
        rand::thread_rng().gen_range(0.5..1.5)
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Deterministic clock for tests: time and randomness advance by
    /// fixed, caller-controlled steps rather than real wall time.
    pub struct FixedClock {
        pub base_ms: u64,
        tick: AtomicU64,
    }

    impl FixedClock {
        pub fn new(base_ms: u64) -> Self {
            Self {
                base_ms,
                tick: AtomicU64::new(0),
            }
        }
    }

    impl Clock for FixedClock {
        fn now_ms(&self) -> u64 {
            self.base_ms + self.tick.fetch_add(1, Ordering::SeqCst)
        }

        fn now_us(&self) -> u64 {
            self.now_ms() * 1000
        }

        fn now_rfc3339(&self) -> String {
            "2026-01-01T00:00:00+00:00".to_string()
        }

        fn now_formatted(&self, _fmt: &str) -> String {
            "2026-01-01".to_string()
        }

        fn random_hex(&self, n: usize) -> String {
            "a".repeat(n)
        }

        fn random_uuid(&self) -> String {
            "00000000-0000-0000-0000-000000000000".to_string()
        }

        fn jitter(&self) -> f64 {
            1.0
        }
    }

    #[test]
    fn fixed_clock_advances_monotonically() {
        let clock = FixedClock::new(1000);
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b > a);
    }

    #[test]
    fn fixed_clock_random_hex_has_requested_length() {
        let clock = FixedClock::new(0);
        assert_eq!(clock.random_hex(8).len(), 8);
    }
}
