//! Log throttling utility
//!
//! Sampling runs several times per second, so a failure that repeats on every
//! tick would flood the log. The throttler lets one message per key through
//! per interval.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Limits how often the same log message is recorded
///
/// # Example
///
/// ```rust
/// use qr_checkin::utils::LogThrottler;
/// use std::time::Duration;
///
/// let throttler = LogThrottler::new(Duration::from_secs(5));
/// assert!(throttler.should_log("decode_engine"));
/// assert!(!throttler.should_log("decode_engine"));
/// ```
pub struct LogThrottler {
    /// Last time each key was logged
    last_logged: Mutex<HashMap<String, Instant>>,
    interval: Duration,
}

impl LogThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_logged: Mutex::new(HashMap::new()),
            interval,
        }
    }

    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Returns `true` if a message for `key` should be logged now
    pub fn should_log(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut last_logged = self.last_logged.lock();
        match last_logged.get_mut(key) {
            Some(last) if now.duration_since(*last) < self.interval => false,
            Some(last) => {
                *last = now;
                true
            }
            None => {
                last_logged.insert(key.to_string(), now);
                true
            }
        }
    }

    /// Forget `key`, so the next occurrence is logged immediately
    ///
    /// Call this when the condition behind the message recovers.
    pub fn clear(&self, key: &str) {
        self.last_logged.lock().remove(key);
    }
}

/// Throttled `tracing::warn!`
#[macro_export]
macro_rules! warn_throttled {
    ($throttler:expr, $key:expr, $($arg:tt)*) => {
        if $throttler.should_log($key) {
            tracing::warn!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_throttling() {
        let throttler = LogThrottler::new(Duration::from_millis(100));

        assert!(throttler.should_log("test_key"));
        assert!(!throttler.should_log("test_key"));
        assert!(!throttler.should_log("test_key"));

        thread::sleep(Duration::from_millis(150));

        assert!(throttler.should_log("test_key"));
        assert!(!throttler.should_log("test_key"));
    }

    #[test]
    fn test_different_keys() {
        let throttler = LogThrottler::with_secs(10);

        assert!(throttler.should_log("key1"));
        assert!(throttler.should_log("key2"));
        assert!(!throttler.should_log("key1"));
        assert!(!throttler.should_log("key2"));
    }

    #[test]
    fn test_clear() {
        let throttler = LogThrottler::with_secs(10);

        assert!(throttler.should_log("key1"));
        assert!(throttler.should_log("key2"));
        throttler.clear("key1");
        assert!(throttler.should_log("key1"));
        assert!(!throttler.should_log("key2"));
    }
}
