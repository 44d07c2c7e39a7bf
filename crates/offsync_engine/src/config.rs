//! Configuration for the sync engine.

use std::time::Duration;

/// Default key under which the queue is persisted.
pub const DEFAULT_STORAGE_KEY: &str = "offsync.queue";

/// Configuration for a [`crate::SyncManager`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Durable store key holding the serialized queue.
    pub storage_key: String,
    /// Retry configuration.
    pub retry: RetryConfig,
    /// Buffer size of the event broadcast channel.
    pub event_capacity: usize,
}

impl SyncConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            retry: RetryConfig::default(),
            event_capacity: 64,
        }
    }

    /// Sets the storage key.
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the maximum number of retries per operation.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    /// Sets the event channel capacity (minimum 1).
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// How failed replays are retried.
///
/// A failed operation stays queued until it has been retried `max_retries`
/// times. With `auto_retry` off (the default) a retry waits for the next
/// drain trigger; with it on, a pass that carried failures schedules its own
/// follow-up drain after [`RetryConfig::delay_for_attempt`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries allowed per operation before it is dropped.
    pub max_retries: u32,
    /// Delay before the first scheduled retry.
    pub initial_delay: Duration,
    /// Upper bound on any scheduled delay, jitter included.
    pub max_delay: Duration,
    /// Growth factor applied per retry.
    pub backoff_multiplier: f64,
    /// Spread scheduled retries by up to a quarter of their delay.
    pub add_jitter: bool,
    /// Schedule a follow-up drain after a pass that carried failures.
    pub auto_retry: bool,
}

impl RetryConfig {
    /// Creates a retry policy allowing `max_retries` retries per operation.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
            auto_retry: false,
        }
    }

    /// Drops an operation on its first failed replay.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
            auto_retry: false,
        }
    }

    /// Sets the delay before the first scheduled retry.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the cap on scheduled delays.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the per-retry growth factor.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Turns jitter on or off.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Turns follow-up drain scheduling on or off.
    pub fn with_auto_retry(mut self, auto_retry: bool) -> Self {
        self.auto_retry = auto_retry;
        self
    }

    /// Delay before scheduling a drain for operations at `retry_count`.
    ///
    /// Zero for a count of zero. The result never exceeds `max_delay`, and
    /// overflowing or non-finite intermediate values saturate to it.
    pub fn delay_for_attempt(&self, retry_count: u32) -> Duration {
        if retry_count == 0 {
            return Duration::ZERO;
        }

        let exponent = retry_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let mut secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if self.add_jitter {
            secs += secs * 0.25 * rand::random::<f64>();
        }

        let capped = secs.min(self.max_delay.as_secs_f64()).max(0.0);
        Duration::try_from_secs_f64(capped)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
