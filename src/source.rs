//! The collaborator that supplies campaigns and targeting rules, plus an in-memory
//! implementation.
use std::{
    collections::HashMap,
    future::Future,
    io::Read,
    sync::{Arc, RwLock},
};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    model::{Campaign, CampaignStatus, TargetingRule, TryParse},
    Result,
};

/// A source of campaign data, typically backed by a database.
///
/// The engine calls both methods on every refresh and builds a snapshot only if both succeed.
/// Implementations should report failures with [`Error::from_source`](crate::Error::from_source).
pub trait CampaignSource: Send + Sync + 'static {
    /// All campaigns with status [`CampaignStatus::Active`].
    fn get_active_campaigns(&self) -> impl Future<Output = Result<Vec<Campaign>>> + Send;

    /// The complete set of targeting rules. Grouping by campaign is done by the engine.
    fn get_targeting_rules(
        &self,
    ) -> impl Future<Output = Result<Vec<TryParse<TargetingRule>>>> + Send;
}

impl<S: CampaignSource> CampaignSource for Arc<S> {
    fn get_active_campaigns(&self) -> impl Future<Output = Result<Vec<Campaign>>> + Send {
        S::get_active_campaigns(self)
    }

    fn get_targeting_rules(
        &self,
    ) -> impl Future<Output = Result<Vec<TryParse<TargetingRule>>>> + Send {
        S::get_targeting_rules(self)
    }
}

/// Document format accepted by [`MemorySource::from_json`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Campaigns in any status.
    #[serde(default)]
    pub campaigns: Vec<Campaign>,
    /// Targeting rules. Entries that fail to parse are kept and never match.
    #[serde(default)]
    pub targeting_rules: Vec<TryParse<TargetingRule>>,
}

/// An in-memory [`CampaignSource`].
///
/// Writes become visible to an engine on its next refresh.
#[derive(Debug, Default)]
pub struct MemorySource {
    inner: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    campaigns: HashMap<String, Campaign>,
    rules: Vec<TryParse<TargetingRule>>,
    last_rule_id: i64,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new() -> MemorySource {
        MemorySource::default()
    }

    /// Create a source pre-populated with the three sample campaigns (`spotify`, `duolingo`,
    /// `subwaysurfer`) and their targeting rules.
    pub fn with_sample_data() -> MemorySource {
        let source = MemorySource::new();
        source.upsert_campaign(Campaign::new(
            "spotify",
            "Spotify - Music for everyone",
            "https://somelink",
            "Download",
        ));
        source.upsert_campaign(Campaign::new(
            "duolingo",
            "Duolingo: Best way to learn",
            "https://somelink2",
            "Install",
        ));
        source.upsert_campaign(Campaign::new(
            "subwaysurfer",
            "Subway Surfer",
            "https://somelink3",
            "Play",
        ));

        source.add_targeting_rule(TargetingRule {
            include_country: vec!["US".into(), "Canada".into()],
            ..TargetingRule::for_campaign("spotify")
        });
        source.add_targeting_rule(TargetingRule {
            include_os: vec!["Android".into(), "iOS".into()],
            exclude_country: vec!["US".into()],
            ..TargetingRule::for_campaign("duolingo")
        });
        source.add_targeting_rule(TargetingRule {
            include_os: vec!["Android".into()],
            include_app: vec!["com.gametion.ludokinggame".into()],
            ..TargetingRule::for_campaign("subwaysurfer")
        });

        source
    }

    /// Load a source from a JSON [`SourceDocument`].
    pub fn from_json(json: &str) -> serde_json::Result<MemorySource> {
        Ok(MemorySource::from_document(serde_json::from_str(json)?))
    }

    /// Load a source from a reader producing a JSON [`SourceDocument`].
    pub fn from_reader(reader: impl Read) -> serde_json::Result<MemorySource> {
        Ok(MemorySource::from_document(serde_json::from_reader(reader)?))
    }

    fn from_document(document: SourceDocument) -> MemorySource {
        let last_rule_id = document
            .targeting_rules
            .iter()
            .filter_map(|rule| Option::<&TargetingRule>::from(rule).map(|rule| rule.id))
            .max()
            .unwrap_or(0);

        MemorySource {
            inner: RwLock::new(MemoryState {
                campaigns: document
                    .campaigns
                    .into_iter()
                    .map(|campaign| (campaign.id.clone(), campaign))
                    .collect(),
                rules: document.targeting_rules,
                last_rule_id,
            }),
        }
    }

    /// Insert a campaign or replace the one with the same id.
    pub fn upsert_campaign(&self, mut campaign: Campaign) {
        campaign.updated_at = Utc::now();
        self.write().campaigns.insert(campaign.id.clone(), campaign);
    }

    /// Change the status of an existing campaign. Returns `false` if there is no such campaign.
    pub fn set_campaign_status(&self, campaign_id: &str, status: CampaignStatus) -> bool {
        let mut state = self.write();
        let Some(campaign) = state.campaigns.get_mut(campaign_id) else {
            return false;
        };
        campaign.status = status;
        campaign.updated_at = Utc::now();
        true
    }

    /// Remove a campaign. Its targeting rules are kept. Returns the removed campaign.
    pub fn remove_campaign(&self, campaign_id: &str) -> Option<Campaign> {
        self.write().campaigns.remove(campaign_id)
    }

    /// Add a targeting rule, assigning it the next rule id. Returns the assigned id.
    pub fn add_targeting_rule(&self, mut rule: TargetingRule) -> i64 {
        let mut state = self.write();
        state.last_rule_id += 1;
        rule.id = state.last_rule_id;
        state.rules.push(TryParse::Parsed(rule));
        state.last_rule_id
    }

    /// Remove every targeting rule owned by `campaign_id`. Returns the number of removed rules.
    pub fn remove_targeting_rules(&self, campaign_id: &str) -> usize {
        let mut state = self.write();
        let before = state.rules.len();
        state
            .rules
            .retain(|rule| rule.campaign_id() != Some(campaign_id));
        before - state.rules.len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryState> {
        self.inner
            .read()
            .expect("thread holding memory source lock should not panic")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryState> {
        self.inner
            .write()
            .expect("thread holding memory source lock should not panic")
    }
}

impl CampaignSource for MemorySource {
    async fn get_active_campaigns(&self) -> Result<Vec<Campaign>> {
        Ok(self
            .read()
            .campaigns
            .values()
            .filter(|campaign| campaign.is_active())
            .cloned()
            .collect())
    }

    async fn get_targeting_rules(&self) -> Result<Vec<TryParse<TargetingRule>>> {
        Ok(self.read().rules.clone())
    }
}
