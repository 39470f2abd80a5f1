//! Campaigns, targeting rules, and the delivery request/response types.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// An advertising campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    /// Unique campaign identifier.
    #[serde(rename = "cid")]
    pub id: String,
    /// Human-readable campaign name.
    pub name: String,
    /// Creative image reference.
    #[serde(rename = "img")]
    pub image: String,
    /// Call-to-action text.
    pub cta: String,
    /// Only [`CampaignStatus::Active`] campaigns are eligible for delivery.
    pub status: CampaignStatus,
    /// Creation time. Defaults to now when absent from the source document.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last update time. Defaults to now when absent from the source document.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Create an active campaign with both timestamps set to now.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        image: impl Into<String>,
        cta: impl Into<String>,
    ) -> Campaign {
        let now = Utc::now();
        Campaign {
            id: id.into(),
            name: name.into(),
            image: image.into(),
            cta: cta.into(),
            status: CampaignStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` if the campaign is eligible for delivery.
    pub fn is_active(&self) -> bool {
        self.status == CampaignStatus::Active
    }

    /// Project the campaign into the shape returned to delivery callers.
    pub fn to_delivery_response(&self) -> DeliveryResponse {
        DeliveryResponse {
            cid: self.id.clone(),
            img: self.image.clone(),
            cta: self.cta.clone(),
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    #[display("ACTIVE")]
    Active,
    #[display("INACTIVE")]
    Inactive,
}

/// Targeting criteria attached to a campaign.
///
/// Each dimension has an include list and an exclude list. Empty lists place no restriction on
/// the dimension. See [`Snapshot::matches`](crate::Snapshot::matches) for the full semantics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetingRule {
    /// Monotonic rule identifier assigned by the source.
    #[serde(default)]
    pub id: i64,
    /// Owning campaign. This is a soft reference: a rule pointing at a missing or inactive
    /// campaign never contributes to a match.
    pub campaign_id: String,
    /// Country allow-list.
    #[serde(default)]
    pub include_country: Vec<String>,
    /// Country deny-list.
    #[serde(default)]
    pub exclude_country: Vec<String>,
    /// Operating system allow-list.
    #[serde(default)]
    pub include_os: Vec<String>,
    /// Operating system deny-list.
    #[serde(default)]
    pub exclude_os: Vec<String>,
    /// Application identifier allow-list.
    #[serde(default)]
    pub include_app: Vec<String>,
    /// Application identifier deny-list.
    #[serde(default)]
    pub exclude_app: Vec<String>,
}

impl TargetingRule {
    /// Create a rule with no restrictions for `campaign_id`.
    pub fn for_campaign(campaign_id: impl Into<String>) -> TargetingRule {
        TargetingRule {
            campaign_id: campaign_id.into(),
            ..TargetingRule::default()
        }
    }
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
///
/// Targeting rules are delivered wrapped in `TryParse`, so that a single malformed rule does not
/// prevent the rest of the snapshot from loading. A rule that failed to parse never matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed. The raw value is kept for diagnostics.
    ParseFailed(serde_json::Value),
}

impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

impl<'a, T> From<&'a TryParse<T>> for Option<&'a T> {
    fn from(value: &TryParse<T>) -> Option<&T> {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

impl From<TargetingRule> for TryParse<TargetingRule> {
    fn from(value: TargetingRule) -> Self {
        TryParse::Parsed(value)
    }
}

impl TryParse<TargetingRule> {
    /// Owning campaign of the rule. For a rule that failed to parse, this is recovered from the raw
    /// `campaign_id` field when present.
    pub fn campaign_id(&self) -> Option<&str> {
        match self {
            TryParse::Parsed(rule) => Some(&rule.campaign_id),
            TryParse::ParseFailed(raw) => raw.get("campaign_id").and_then(|v| v.as_str()),
        }
    }
}

/// A request field. Used to report validation errors.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum RequestField {
    #[display("app")]
    App,
    #[display("country")]
    Country,
    #[display("os")]
    Os,
}

/// An incoming delivery request as received from the transport layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    /// Application identifier, e.g. `com.gametion.ludokinggame`.
    #[serde(default)]
    pub app: String,
    /// Country name or code.
    #[serde(default)]
    pub country: String,
    /// Operating system name.
    #[serde(default)]
    pub os: String,
}

impl DeliveryRequest {
    /// Create a request from raw field values.
    pub fn new(
        app: impl Into<String>,
        country: impl Into<String>,
        os: impl Into<String>,
    ) -> DeliveryRequest {
        DeliveryRequest {
            app: app.into(),
            country: country.into(),
            os: os.into(),
        }
    }

    /// Validate and normalize the request.
    ///
    /// All three fields are required and must be non-empty after trimming. Normalization trims
    /// every field and upper-cases the country. The operating system keeps its case.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingField`] naming the first missing field.
    pub fn normalize(&self) -> Result<NormalizedRequest> {
        let app = required(&self.app, RequestField::App)?;
        let country = required(&self.country, RequestField::Country)?;
        let os = required(&self.os, RequestField::Os)?;

        Ok(NormalizedRequest {
            app: app.to_owned(),
            country: country.to_uppercase(),
            os: os.to_owned(),
        })
    }
}

fn required(value: &str, field: RequestField) -> Result<&str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::MissingField(field));
    }
    Ok(value)
}

/// A validated [`DeliveryRequest`] after trimming and country upper-casing. This is the unit of
/// cache-key generation and matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRequest {
    pub(crate) app: String,
    pub(crate) country: String,
    pub(crate) os: String,
}

#[allow(missing_docs)]
impl NormalizedRequest {
    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    /// Result cache key: `app|country|os` with the operating system lower-cased.
    ///
    /// Lower-casing only applies to the key. Matching still sees the original case of `os`.
    ///
    /// Fields are joined without escaping, so requests whose values contain `|` may share a key
    /// (`a|B` + `C` and `a` + `B|C`). Application identifiers, country names and operating system
    /// names never contain `|`.
    pub fn cache_key(&self) -> String {
        format!("{}|{}|{}", self.app, self.country, self.os.to_lowercase())
    }
}

/// The projection of a [`Campaign`] returned to delivery callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeliveryResponse {
    /// Campaign identifier.
    pub cid: String,
    /// Creative image reference.
    pub img: String,
    /// Call-to-action text.
    pub cta: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        Campaign, CampaignStatus, DeliveryRequest, RequestField, TargetingRule, TryParse,
    };
    use crate::Error;

    #[test]
    fn normalizes_request_fields() {
        let request = DeliveryRequest::new(" com.gametion.ludokinggame ", " us ", " Android ");
        let normalized = request.normalize().unwrap();

        assert_eq!(normalized.app(), "com.gametion.ludokinggame");
        assert_eq!(normalized.country(), "US");
        assert_eq!(normalized.os(), "Android");
    }

    #[test]
    fn cache_key_lowercases_os_only() {
        let normalized = DeliveryRequest::new("com.App", "de", "iOS")
            .normalize()
            .unwrap();

        assert_eq!(normalized.cache_key(), "com.App|DE|ios");
        assert_eq!(normalized.os(), "iOS");
    }

    #[test]
    fn os_case_does_not_split_cache_keys() {
        let a = DeliveryRequest::new("app", "us", "Android").normalize().unwrap();
        let b = DeliveryRequest::new("app", "US", "android").normalize().unwrap();

        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn rejects_missing_fields() {
        let cases = [
            (DeliveryRequest::new("", "us", "android"), RequestField::App),
            (DeliveryRequest::new("app", "", "android"), RequestField::Country),
            (DeliveryRequest::new("app", "us", ""), RequestField::Os),
            (DeliveryRequest::new("app", "   ", "android"), RequestField::Country),
        ];

        for (request, field) in cases {
            match request.normalize() {
                Err(Error::MissingField(missing)) => assert_eq!(missing, field),
                other => panic!("expected missing {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn parses_campaign_wire_names() {
        let campaign: Campaign = serde_json::from_value(json!({
            "cid": "spotify",
            "name": "Spotify - Music for everyone",
            "img": "https://somelink",
            "cta": "Download",
            "status": "ACTIVE",
        }))
        .unwrap();

        assert_eq!(campaign.id, "spotify");
        assert!(campaign.is_active());
        assert_eq!(
            campaign.to_delivery_response().img,
            "https://somelink".to_owned()
        );
        assert_eq!(CampaignStatus::Inactive.to_string(), "INACTIVE");
    }

    #[test]
    fn parse_partially_if_unexpected() {
        let rules: Vec<TryParse<TargetingRule>> = serde_json::from_value(json!([
            { "id": 1, "campaign_id": "spotify", "include_country": ["US"] },
            { "id": 2, "campaign_id": "duolingo", "include_os": "Android" },
        ]))
        .unwrap();

        assert!(matches!(rules[0], TryParse::Parsed(_)));
        assert!(matches!(rules[1], TryParse::ParseFailed(_)));
        assert_eq!(rules[1].campaign_id(), Some("duolingo"));
    }
}
