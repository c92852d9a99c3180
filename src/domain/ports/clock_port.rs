//! Clock port definition.

use chrono::{DateTime, Utc};

/// Source of the current time for expiry decisions.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;

    /// Clock that only moves when told to.
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Creates a clock frozen at `now`.
        pub fn at(now: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(now),
            }
        }

        /// Moves the clock forward.
        pub fn advance(&self, by: chrono::Duration) {
            let mut now = self.now.lock();
            *now += by;
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::at(Utc::now())
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock()
        }
    }
}
