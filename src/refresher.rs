//! Pulls a full snapshot from the [`CampaignSource`] and installs it.
use std::{sync::Arc, time::Duration};

use crate::{
    result_cache::ResultCache,
    snapshot::{Snapshot, SnapshotStore},
    source::CampaignSource,
    Error, Result,
};

/// Fetches campaigns and rules, builds a [`Snapshot`] off the request path, and swaps it into the
/// [`SnapshotStore`].
///
/// A failed or timed-out fetch leaves the previous snapshot and all cached results untouched.
/// A successful refresh discards every cached result. When refreshes overlap, the one that
/// started last wins regardless of which fetch completes first.
pub(crate) struct Refresher<S> {
    source: S,
    store: Arc<SnapshotStore>,
    cache: Arc<ResultCache>,
    fetch_timeout: Duration,
}

impl<S: CampaignSource> Refresher<S> {
    pub(crate) fn new(
        source: S,
        store: Arc<SnapshotStore>,
        cache: Arc<ResultCache>,
        fetch_timeout: Duration,
    ) -> Refresher<S> {
        Refresher {
            source,
            store,
            cache,
            fetch_timeout,
        }
    }

    /// Run a single refresh.
    ///
    /// Dropping the returned future before it completes aborts the fetch and leaves the store
    /// untouched.
    ///
    /// # Errors
    ///
    /// - [`Error::SourceTimeout`] if the source did not answer within the fetch timeout.
    /// - Any error returned by the source, typically [`Error::Source`].
    pub(crate) async fn refresh(&self) -> Result<()> {
        // Reserved before fetching: a fetch that started later sees newer data and must win.
        let version = self.store.next_version();
        log::debug!(target: "targeting", version = version; "fetching campaigns and targeting rules");

        let fetch = async {
            let campaigns = self.source.get_active_campaigns().await?;
            let rules = self.source.get_targeting_rules().await?;
            Ok::<_, Error>((campaigns, rules))
        };

        let result = tokio::time::timeout(self.fetch_timeout, fetch)
            .await
            .map_err(|_| Error::SourceTimeout(self.fetch_timeout))
            .and_then(|result| result);
        let (campaigns, rules) = match result {
            Ok(fetched) => fetched,
            Err(err) => {
                log::warn!(target: "targeting", "failed to refresh campaigns, keeping previous snapshot: {}", err);
                return Err(err);
            }
        };

        // Constructing the snapshot before taking the lock to minimize lock span.
        let snapshot = Arc::new(Snapshot::build(version, campaigns, rules));
        let campaigns_count = snapshot.campaigns_count();
        let rules_count = snapshot.rules_count();

        if !self.store.set_snapshot(snapshot) {
            log::debug!(target: "targeting", version = version; "a newer snapshot was installed concurrently, discarding");
            return Ok(());
        }
        self.cache.invalidate(version);

        log::info!(target: "targeting",
                   version = version,
                   campaigns_count = campaigns_count,
                   rules_count = rules_count;
                   "installed new campaign snapshot");

        Ok(())
    }
}
