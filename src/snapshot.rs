//! Immutable campaign snapshots and the thread-safe store holding the active one.
//!
//! A [`Snapshot`] is built entirely off the request path and then swapped into the
//! [`SnapshotStore`] as a unit. Readers clone the `Arc` and keep using the same snapshot for the
//! whole operation, so they never observe campaigns from one refresh mixed with rules from
//! another.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use chrono::{DateTime, Utc};

use crate::{
    matcher::{rules_match, MatchOptions},
    model::{Campaign, DeliveryResponse, NormalizedRequest, TargetingRule, TryParse},
};

/// A consistent view of all campaigns and targeting rules at some point in time.
#[derive(Debug)]
pub struct Snapshot {
    version: u64,
    refreshed_at: Option<DateTime<Utc>>,
    campaigns: HashMap<String, Campaign>,
    rules: HashMap<String, Vec<TryParse<TargetingRule>>>,
    rules_count: usize,
}

impl Snapshot {
    /// An empty snapshot that has never been refreshed. Every store starts with it.
    pub fn empty() -> Snapshot {
        Snapshot {
            version: 0,
            refreshed_at: None,
            campaigns: HashMap::new(),
            rules: HashMap::new(),
            rules_count: 0,
        }
    }

    /// Build a snapshot from source data, grouping rules by owning campaign.
    ///
    /// Rules keep their multiplicity and order. Rules whose campaign cannot be determined (they
    /// failed to parse and carry no `campaign_id`) can never be evaluated and are dropped.
    pub fn build(
        version: u64,
        campaigns: Vec<Campaign>,
        rules: Vec<TryParse<TargetingRule>>,
    ) -> Snapshot {
        let campaigns: HashMap<String, Campaign> = campaigns
            .into_iter()
            .map(|campaign| (campaign.id.clone(), campaign))
            .collect();

        let mut grouped: HashMap<String, Vec<TryParse<TargetingRule>>> = HashMap::new();
        let mut rules_count = 0;
        for rule in rules {
            let Some(campaign_id) = rule.campaign_id().map(str::to_owned) else {
                log::warn!(target: "targeting", "dropping unparseable targeting rule without campaign_id");
                continue;
            };
            if matches!(rule, TryParse::ParseFailed(_)) {
                log::warn!(target: "targeting", campaign_id:display = campaign_id; "keeping unparseable targeting rule as non-matching");
            }
            grouped.entry(campaign_id).or_default().push(rule);
            rules_count += 1;
        }

        Snapshot {
            version,
            refreshed_at: Some(Utc::now()),
            campaigns,
            rules: grouped,
            rules_count,
        }
    }

    /// Monotonic version of the snapshot. The initial empty snapshot has version 0.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Time the snapshot was built. `None` for the initial empty snapshot.
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    #[allow(missing_docs)]
    pub fn campaign(&self, campaign_id: &str) -> Option<&Campaign> {
        self.campaigns.get(campaign_id)
    }

    /// Targeting rules attached to `campaign_id`. Empty if there are none.
    pub fn rules_for(&self, campaign_id: &str) -> &[TryParse<TargetingRule>] {
        self.rules
            .get(campaign_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of campaigns in the snapshot.
    pub fn campaigns_count(&self) -> usize {
        self.campaigns.len()
    }

    /// Number of targeting rules in the snapshot, including rules that reference unknown
    /// campaigns and rules that failed to parse. This counts rules, not campaigns with rules.
    pub fn rules_count(&self) -> usize {
        self.rules_count
    }

    /// Returns `true` if campaign `campaign_id` is eligible for `request` under its own rules.
    ///
    /// A campaign without rules matches every request. Otherwise at least one rule has to match.
    /// Campaign status is not considered here, see [`Snapshot::matching_campaigns`].
    pub fn matches(
        &self,
        campaign_id: &str,
        request: &NormalizedRequest,
        options: &MatchOptions,
    ) -> bool {
        rules_match(self.rules_for(campaign_id), request, options)
    }

    /// Run a full matching pass: every active campaign whose rules match `request`.
    ///
    /// The result has no particular order.
    pub fn matching_campaigns(
        &self,
        request: &NormalizedRequest,
        options: &MatchOptions,
    ) -> Vec<DeliveryResponse> {
        self.campaigns
            .values()
            .filter(|campaign| campaign.is_active())
            .filter(|campaign| self.matches(&campaign.id, request, options))
            .map(Campaign::to_delivery_response)
            .collect()
    }
}

/// `SnapshotStore` provides a thread-safe (`Sync`) storage for the active [`Snapshot`] that
/// allows concurrent access for readers and writers.
///
/// `Snapshot` itself is always immutable and can only be replaced completely.
#[derive(Debug)]
pub struct SnapshotStore {
    snapshot: RwLock<Arc<Snapshot>>,
    last_version: AtomicU64,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        SnapshotStore {
            snapshot: RwLock::new(Arc::new(Snapshot::empty())),
            last_version: AtomicU64::new(0),
        }
    }
}

impl SnapshotStore {
    /// Create a new store holding an empty snapshot.
    pub fn new() -> Self {
        SnapshotStore::default()
    }

    /// Reserve the version for the next snapshot to be built.
    pub fn next_version(&self) -> u64 {
        self.last_version.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get currently-active snapshot.
    pub fn get_snapshot(&self) -> Arc<Snapshot> {
        // self.snapshot.read() should always return Ok(). Err() is possible only if the lock is
        // poisoned (writer panicked while holding the lock), which should never happen.
        let snapshot = self
            .snapshot
            .read()
            .expect("thread holding snapshot lock should not panic");

        snapshot.clone()
    }

    /// Install `snapshot` unless a newer one is already active. Returns `true` if installed.
    pub fn set_snapshot(&self, snapshot: Arc<Snapshot>) -> bool {
        let mut slot = self
            .snapshot
            .write()
            .expect("thread holding snapshot lock should not panic");

        if snapshot.version <= slot.version {
            return false;
        }
        *slot = snapshot;
        true
    }
}
