use std::{num::NonZeroUsize, time::Duration};

use crate::{
    matcher::{CaseSensitivity, MatchOptions},
    poller_thread::PollerThreadConfig,
};

/// Configuration for [`TargetingEngine`](crate::TargetingEngine).
///
/// # Examples
/// ```
/// # use std::time::Duration;
/// # use targeting_engine::{CaseSensitivity, EngineConfig};
/// let config = EngineConfig::new()
///     .with_cache_capacity(50_000)
///     .with_refresh_interval(Duration::from_secs(60))
///     .with_country_case(CaseSensitivity::Insensitive);
/// ```
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub(crate) cache_capacity: NonZeroUsize,
    pub(crate) fetch_timeout: Duration,
    pub(crate) refresh_interval: Duration,
    pub(crate) refresh_jitter: Duration,
    pub(crate) country_case: CaseSensitivity,
}

impl EngineConfig {
    /// Default value for the result cache capacity.
    pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;
    /// Default bound on a single refresh fetch.
    pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default interval between background refreshes.
    pub const DEFAULT_REFRESH_INTERVAL: Duration = PollerThreadConfig::DEFAULT_POLL_INTERVAL;
    /// Default jitter subtracted from the refresh interval.
    pub const DEFAULT_REFRESH_JITTER: Duration = PollerThreadConfig::DEFAULT_POLL_JITTER;

    /// Create a new `EngineConfig` using default configuration.
    pub fn new() -> EngineConfig {
        EngineConfig::default()
    }

    /// Maximum number of memoized results. A capacity of zero is treated as one.
    pub fn with_cache_capacity(mut self, capacity: usize) -> EngineConfig {
        self.cache_capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        self
    }

    /// Bound on fetching campaigns and rules during a refresh. When it elapses, the refresh is
    /// abandoned and the previous snapshot stays active.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> EngineConfig {
        self.fetch_timeout = timeout;
        self
    }

    /// Interval between background refreshes run by the poller thread.
    pub fn with_refresh_interval(mut self, interval: Duration) -> EngineConfig {
        self.refresh_interval = interval;
        self
    }

    /// Randomized duration subtracted from each refresh interval. This helps to avoid multiple
    /// server instances hitting the source at the same time.
    pub fn with_refresh_jitter(mut self, jitter: Duration) -> EngineConfig {
        self.refresh_jitter = jitter;
        self
    }

    /// Comparison used for the country dimension.
    ///
    /// Requests are upper-cased during normalization. Keep the default
    /// [`CaseSensitivity::Sensitive`] only if rule data stores countries upper-case; otherwise a
    /// rule listing `"Canada"` never matches a request for `canada`.
    pub fn with_country_case(mut self, case: CaseSensitivity) -> EngineConfig {
        self.country_case = case;
        self
    }

    #[allow(missing_docs)]
    pub fn cache_capacity(&self) -> usize {
        self.cache_capacity.get()
    }

    #[allow(missing_docs)]
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub(crate) fn match_options(&self) -> MatchOptions {
        MatchOptions {
            country: self.country_case,
        }
    }

    pub(crate) fn poller_thread_config(&self) -> PollerThreadConfig {
        PollerThreadConfig::new()
            .with_interval(self.refresh_interval)
            .with_jitter(self.refresh_jitter)
    }
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            cache_capacity: NonZeroUsize::new(EngineConfig::DEFAULT_CACHE_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
            fetch_timeout: EngineConfig::DEFAULT_FETCH_TIMEOUT,
            refresh_interval: EngineConfig::DEFAULT_REFRESH_INTERVAL,
            refresh_jitter: EngineConfig::DEFAULT_REFRESH_JITTER,
            country_case: CaseSensitivity::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::EngineConfig;
    use crate::matcher::CaseSensitivity;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();

        assert_eq!(config.cache_capacity(), EngineConfig::DEFAULT_CACHE_CAPACITY);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(config.match_options().country, CaseSensitivity::Sensitive);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        assert_eq!(EngineConfig::new().with_cache_capacity(0).cache_capacity(), 1);
    }

    #[test]
    fn poller_config_follows_refresh_settings() {
        let config = EngineConfig::new()
            .with_refresh_interval(Duration::from_secs(120))
            .with_refresh_jitter(Duration::from_secs(10))
            .poller_thread_config();

        assert_eq!(config.interval, Duration::from_secs(120));
        assert_eq!(config.jitter, Duration::from_secs(10));
    }
}
