//! Targeting rule evaluation.
//!
//! A campaign with no rules matches every request. Otherwise it matches if any of its rules
//! matches, and a rule matches if all three dimensions (country, operating system, application)
//! pass. A dimension fails if the request value is excluded; otherwise it passes if the include
//! list is empty or contains the value.
use serde::{Deserialize, Serialize};

use crate::model::{NormalizedRequest, TargetingRule, TryParse};

/// How a dimension compares request values against rule lists.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseSensitivity {
    /// Exact string equality.
    #[default]
    Sensitive,
    /// Case-insensitive equality (simple Unicode case folding).
    Insensitive,
}

impl CaseSensitivity {
    fn equals(self, a: &str, b: &str) -> bool {
        match self {
            CaseSensitivity::Sensitive => a == b,
            CaseSensitivity::Insensitive => a
                .chars()
                .flat_map(char::to_lowercase)
                .eq(b.chars().flat_map(char::to_lowercase)),
        }
    }
}

/// Per-dimension comparison settings.
///
/// Application identifiers are always compared exactly and operating systems always ignore case.
/// Country comparison is configurable: requests are upper-cased during normalization, so with
/// [`CaseSensitivity::Sensitive`] rule data must list countries upper-case (`"US"`, not `"Us"`)
/// to ever match.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    /// Comparison used for the country dimension.
    pub country: CaseSensitivity,
}

impl MatchOptions {
    const OS: CaseSensitivity = CaseSensitivity::Insensitive;
    const APP: CaseSensitivity = CaseSensitivity::Sensitive;
}

impl TargetingRule {
    /// Returns `true` if `request` passes all three dimensions of the rule.
    pub fn matches(&self, request: &NormalizedRequest, options: &MatchOptions) -> bool {
        dimension_matches(
            &request.country,
            &self.include_country,
            &self.exclude_country,
            options.country,
        ) && dimension_matches(
            &request.os,
            &self.include_os,
            &self.exclude_os,
            MatchOptions::OS,
        ) && dimension_matches(
            &request.app,
            &self.include_app,
            &self.exclude_app,
            MatchOptions::APP,
        )
    }
}

impl TryParse<TargetingRule> {
    /// Rules that failed to parse never match.
    pub(crate) fn matches(&self, request: &NormalizedRequest, options: &MatchOptions) -> bool {
        match self {
            TryParse::Parsed(rule) => rule.matches(request, options),
            TryParse::ParseFailed(_) => false,
        }
    }
}

/// Evaluate a campaign's rule set. Absence of rules is universal eligibility.
pub(crate) fn rules_match(
    rules: &[TryParse<TargetingRule>],
    request: &NormalizedRequest,
    options: &MatchOptions,
) -> bool {
    rules.is_empty() || rules.iter().any(|rule| rule.matches(request, options))
}

fn dimension_matches(
    value: &str,
    include: &[String],
    exclude: &[String],
    case: CaseSensitivity,
) -> bool {
    if exclude.iter().any(|item| case.equals(item, value)) {
        return false;
    }

    include.is_empty() || include.iter().any(|item| case.equals(item, value))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{dimension_matches, rules_match, CaseSensitivity, MatchOptions};
    use crate::model::{DeliveryRequest, NormalizedRequest, TargetingRule, TryParse};

    fn request(app: &str, country: &str, os: &str) -> NormalizedRequest {
        DeliveryRequest::new(app, country, os).normalize().unwrap()
    }

    fn list(values: &[&str]) -> Vec<String> {
        values.iter().map(|&v| v.to_owned()).collect()
    }

    #[test]
    fn empty_dimension_passes() {
        assert!(dimension_matches("US", &[], &[], CaseSensitivity::Sensitive));
    }

    #[test]
    fn exclude_wins_over_include() {
        assert!(!dimension_matches(
            "US",
            &list(&["US", "CA"]),
            &list(&["US"]),
            CaseSensitivity::Sensitive
        ));
    }

    #[test]
    fn include_restricts_values() {
        assert!(dimension_matches(
            "CA",
            &list(&["US", "CA"]),
            &[],
            CaseSensitivity::Sensitive
        ));
        assert!(!dimension_matches(
            "DE",
            &list(&["US", "CA"]),
            &[],
            CaseSensitivity::Sensitive
        ));
    }

    #[test]
    fn exclude_only_lets_other_values_through() {
        assert!(dimension_matches(
            "DE",
            &[],
            &list(&["US"]),
            CaseSensitivity::Sensitive
        ));
    }

    #[test]
    fn case_sensitivity() {
        assert!(!dimension_matches(
            "CANADA",
            &list(&["Canada"]),
            &[],
            CaseSensitivity::Sensitive
        ));
        assert!(dimension_matches(
            "CANADA",
            &list(&["Canada"]),
            &[],
            CaseSensitivity::Insensitive
        ));
    }

    #[test]
    fn os_ignores_case() {
        let rule = TargetingRule {
            include_os: list(&["Android", "iOS"]),
            ..TargetingRule::for_campaign("duolingo")
        };

        assert!(rule.matches(&request("app", "de", "android"), &MatchOptions::default()));
        assert!(rule.matches(&request("app", "de", "IOS"), &MatchOptions::default()));
        assert!(!rule.matches(&request("app", "de", "windows"), &MatchOptions::default()));
    }

    #[test]
    fn excluded_os_ignores_case() {
        let rule = TargetingRule {
            exclude_os: list(&["iOS"]),
            ..TargetingRule::for_campaign("spotify")
        };

        assert!(!rule.matches(&request("app", "us", "ios"), &MatchOptions::default()));
    }

    #[test]
    fn app_is_case_sensitive() {
        let rule = TargetingRule {
            include_app: list(&["com.gametion.ludokinggame"]),
            ..TargetingRule::for_campaign("subwaysurfer")
        };

        assert!(rule.matches(
            &request("com.gametion.ludokinggame", "us", "android"),
            &MatchOptions::default()
        ));
        assert!(!rule.matches(
            &request("com.Gametion.LudoKingGame", "us", "android"),
            &MatchOptions::default()
        ));
    }

    #[test]
    fn country_follows_options() {
        let rule = TargetingRule {
            include_country: list(&["US", "Canada"]),
            ..TargetingRule::for_campaign("spotify")
        };
        let canada = request("app", "canada", "android");

        assert!(!rule.matches(&canada, &MatchOptions::default()));
        assert!(rule.matches(
            &canada,
            &MatchOptions {
                country: CaseSensitivity::Insensitive
            }
        ));
    }

    #[test]
    fn all_dimensions_must_pass() {
        let rule = TargetingRule {
            include_os: list(&["Android"]),
            include_app: list(&["com.gametion.ludokinggame"]),
            ..TargetingRule::for_campaign("subwaysurfer")
        };

        assert!(!rule.matches(
            &request("com.abc.xyz", "us", "android"),
            &MatchOptions::default()
        ));
        assert!(!rule.matches(
            &request("com.gametion.ludokinggame", "us", "ios"),
            &MatchOptions::default()
        ));
    }

    #[test]
    fn no_rules_match_everything() {
        assert!(rules_match(
            &[],
            &request("x", "antarctica", "windows"),
            &MatchOptions::default()
        ));
    }

    #[test]
    fn any_rule_is_enough() {
        let rules: Vec<TryParse<TargetingRule>> = vec![
            TargetingRule {
                include_country: list(&["US"]),
                ..TargetingRule::for_campaign("c")
            }
            .into(),
            TargetingRule {
                include_country: list(&["DE"]),
                ..TargetingRule::for_campaign("c")
            }
            .into(),
        ];

        assert!(rules_match(&rules, &request("a", "de", "android"), &MatchOptions::default()));
        assert!(!rules_match(&rules, &request("a", "fr", "android"), &MatchOptions::default()));
    }

    #[test]
    fn unparseable_rule_never_matches() {
        let rules = vec![TryParse::ParseFailed(json!({
            "campaign_id": "c",
            "include_os": "Android",
        }))];

        assert!(!rules_match(
            &rules,
            &request("a", "us", "android"),
            &MatchOptions::default()
        ));
    }
}
