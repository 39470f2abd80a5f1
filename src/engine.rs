use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[cfg(doc)]
use crate::Error;
use crate::{
    matcher::MatchOptions,
    poller_thread::PollerThread,
    refresher::Refresher,
    result_cache::{CachedResult, ResultCache},
    snapshot::SnapshotStore,
    source::CampaignSource,
    DeliveryRequest, EngineConfig, Result,
};

/// The campaign targeting engine.
///
/// Owns the active [`Snapshot`](crate::Snapshot), the result cache, and the refresher pulling
/// data from a [`CampaignSource`]. Each engine instance is fully independent.
///
/// # Refreshing
///
/// [`TargetingEngine::start`] performs one refresh before returning, so the engine is immediately
/// queryable. Call [`TargetingEngine::start_poller_thread`] afterwards to keep the snapshot up to
/// date in the background.
///
/// # Examples
/// ```
/// # async fn test() -> targeting_engine::Result<()> {
/// use targeting_engine::{DeliveryRequest, EngineConfig, MemorySource, TargetingEngine};
///
/// let engine = TargetingEngine::start(MemorySource::with_sample_data(), EngineConfig::new()).await?;
/// let campaigns = engine.get_matching_campaigns(&DeliveryRequest::new(
///     "com.abc.xyz",
///     "germany",
///     "android",
/// ))?;
/// assert_eq!(campaigns.len(), 1);
/// assert_eq!(campaigns[0].cid, "duolingo");
/// # Ok(())
/// # }
/// ```
pub struct TargetingEngine<S> {
    store: Arc<SnapshotStore>,
    cache: Arc<ResultCache>,
    refresher: Arc<Refresher<S>>,
    options: MatchOptions,
    config: EngineConfig,
}

/// Point-in-time statistics about a [`TargetingEngine`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    /// Number of campaigns in the active snapshot.
    pub campaigns_count: usize,
    /// Number of targeting rules in the active snapshot, including rules referencing unknown
    /// campaigns and rules that failed to parse.
    pub targeting_rules_count: usize,
    /// Number of memoized results.
    pub query_cache_size: usize,
    /// Time of the last successful refresh. `None` if no refresh has succeeded yet.
    pub last_refresh: Option<DateTime<Utc>>,
    /// Seconds since the last successful refresh.
    pub cache_age_seconds: Option<f64>,
    /// Version of the active snapshot. 0 before the first refresh.
    pub snapshot_version: u64,
    /// Lookups served from the result cache.
    pub cache_hits: u64,
    /// Lookups that required a matching pass.
    pub cache_misses: u64,
}

impl<S: CampaignSource> TargetingEngine<S> {
    /// Create an engine holding an empty snapshot. Nothing matches until the first refresh.
    pub fn new(source: S, config: EngineConfig) -> TargetingEngine<S> {
        let store = Arc::new(SnapshotStore::new());
        let cache = Arc::new(ResultCache::new(config.cache_capacity));
        let refresher = Arc::new(Refresher::new(
            source,
            store.clone(),
            cache.clone(),
            config.fetch_timeout,
        ));

        TargetingEngine {
            store,
            cache,
            refresher,
            options: config.match_options(),
            config,
        }
    }

    /// Create an engine and load the first snapshot.
    ///
    /// # Errors
    ///
    /// Returns the error of the initial refresh, see [`TargetingEngine::refresh`].
    pub async fn start(source: S, config: EngineConfig) -> Result<TargetingEngine<S>> {
        let engine = TargetingEngine::new(source, config);
        engine.refresh().await?;
        Ok(engine)
    }

    /// Return every active campaign eligible for `request`.
    ///
    /// Results are memoized per normalized request until the next successful refresh. Returns an
    /// empty list if no campaign matches.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingField`] if a request field is missing or blank. No matching is performed
    ///   and nothing is cached.
    pub fn get_matching_campaigns(&self, request: &DeliveryRequest) -> Result<CachedResult> {
        let request = request.normalize().map_err(|err| {
            log::trace!(target: "targeting", "rejected delivery request: {}", err);
            err
        })?;
        let key = request.cache_key();

        // The whole lookup works against one snapshot, even if a refresh lands in between.
        let snapshot = self.store.get_snapshot();
        if let Some(result) = self.cache.get(snapshot.version(), &key) {
            return Ok(result);
        }

        let result = Arc::new(snapshot.matching_campaigns(&request, &self.options));
        self.cache.put(snapshot.version(), key, result.clone());

        Ok(result)
    }

    /// Take a point-in-time view of snapshot and cache sizes.
    pub fn get_stats(&self) -> Stats {
        let snapshot = self.store.get_snapshot();
        let last_refresh = snapshot.refreshed_at();

        Stats {
            campaigns_count: snapshot.campaigns_count(),
            targeting_rules_count: snapshot.rules_count(),
            query_cache_size: self.cache.len(),
            last_refresh,
            cache_age_seconds: last_refresh
                .map(|at| (Utc::now() - at).num_milliseconds().max(0) as f64 / 1000.0),
            snapshot_version: snapshot.version(),
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
        }
    }

    /// Fetch fresh data from the source and replace the active snapshot. Drops all memoized
    /// results on success.
    ///
    /// # Errors
    ///
    /// - [`Error::SourceTimeout`] if the source did not answer within the fetch timeout.
    /// - Any error returned by the source. The previous snapshot stays active.
    pub async fn refresh(&self) -> Result<()> {
        self.refresher.refresh().await
    }

    /// Start a background thread refreshing the snapshot every
    /// [`EngineConfig::with_refresh_interval`].
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the thread failed to start.
    pub fn start_poller_thread(&self) -> Result<PollerThread> {
        Ok(PollerThread::start_with_config(
            self.refresher.clone(),
            self.config.poller_thread_config(),
        )?)
    }

    #[allow(missing_docs)]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
