//! Log throttling utility
//!
//! Receive loops run once per packet, so anything they log (presentation
//! progress, write failures) goes through a throttler keyed per track.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Limits how often the same message key is logged
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use rtc_player::utils::LogThrottler;
///
/// let throttler = LogThrottler::new(Duration::from_secs(5));
///
/// assert!(throttler.should_log("track_1"));
/// assert!(!throttler.should_log("track_1"));
/// ```
pub struct LogThrottler {
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

    /// `true` if `key` was not logged within the interval; records the time
    pub fn should_log(&self, key: &str) -> bool {
        self.should_log_at(key, Instant::now())
    }

    fn should_log_at(&self, key: &str, now: Instant) -> bool {
        let mut map = self.last_logged.lock();
        match map.get(key) {
            Some(last) if now.saturating_duration_since(*last) < self.interval => false,
            _ => {
                map.insert(key.to_string(), now);
                true
            }
        }
    }

    /// Forget a key so its next message is logged immediately
    pub fn clear(&self, key: &str) {
        self.last_logged.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.last_logged.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_logged.lock().is_empty()
    }
}

impl Default for LogThrottler {
    /// 5 second interval
    fn default() -> Self {
        Self::with_secs(5)
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

/// Throttled `tracing::info!`
#[macro_export]
macro_rules! info_throttled {
    ($throttler:expr, $key:expr, $($arg:tt)*) => {
        if $throttler.should_log($key) {
            tracing::info!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_per_key() {
        let throttler = LogThrottler::with_secs(1);
        let start = Instant::now();

        assert!(throttler.should_log_at("track_1", start));
        assert!(!throttler.should_log_at("track_1", start + Duration::from_millis(500)));
        assert!(throttler.should_log_at("track_2", start + Duration::from_millis(500)));
        assert!(throttler.should_log_at("track_1", start + Duration::from_secs(1)));
        assert_eq!(throttler.len(), 2);
    }

    #[test]
    fn test_clear() {
        let throttler = LogThrottler::default();
        assert!(throttler.is_empty());

        assert!(throttler.should_log("write_error"));
        assert!(!throttler.should_log("write_error"));
        throttler.clear("write_error");
        assert!(throttler.should_log("write_error"));
    }
}
