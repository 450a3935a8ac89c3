//! Fleet classification of vehicles by identifier pattern.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Operating-agency bucket a vehicle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FleetCategory {
    Dtc,
    Dimts,
    Electric,
}

impl FleetCategory {
    pub const ALL: [FleetCategory; 3] = [
        FleetCategory::Dtc,
        FleetCategory::Dimts,
        FleetCategory::Electric,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FleetCategory::Dtc => "DTC",
            FleetCategory::Dimts => "DIMTS",
            FleetCategory::Electric => "ELECTRIC",
        }
    }

    fn default_color(&self) -> &'static str {
        match self {
            FleetCategory::Dtc => "green",
            FleetCategory::Dimts => "orange",
            FleetCategory::Electric => "blue",
        }
    }
}

impl fmt::Display for FleetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Prefix,
    Contains,
}

/// One identifier pattern. Matching ignores ASCII case.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FleetRule {
    pub category: FleetCategory,
    pub kind: MatchKind,
    pub pattern: String,
}

impl FleetRule {
    pub fn prefix(category: FleetCategory, pattern: &str) -> Self {
        Self {
            category,
            kind: MatchKind::Prefix,
            pattern: pattern.to_string(),
        }
    }

    pub fn contains(category: FleetCategory, pattern: &str) -> Self {
        Self {
            category,
            kind: MatchKind::Contains,
            pattern: pattern.to_string(),
        }
    }

    fn matches(&self, id: &str) -> bool {
        let id = id.as_bytes();
        let pattern = self.pattern.as_bytes();
        if pattern.is_empty() {
            return true;
        }
        match self.kind {
            MatchKind::Prefix => id
                .get(..pattern.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(pattern)),
            MatchKind::Contains => id
                .windows(pattern.len())
                .any(|window| window.eq_ignore_ascii_case(pattern)),
        }
    }
}

/// Ordered classification rules plus the category → color mapping.
///
/// Rules are evaluated in order and the first match wins; an identifier that
/// matches nothing falls into `default_category`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FleetRules {
    pub rules: Vec<FleetRule>,
    pub default_category: FleetCategory,
    pub colors: HashMap<FleetCategory, String>,
}

impl Default for FleetRules {
    fn default() -> Self {
        Self {
            rules: vec![
                FleetRule::prefix(FleetCategory::Electric, "DL51"),
                FleetRule::contains(FleetCategory::Dimts, "DL1PC"),
            ],
            default_category: FleetCategory::Dtc,
            colors: FleetCategory::ALL
                .iter()
                .map(|c| (*c, c.default_color().to_string()))
                .collect(),
        }
    }
}

impl FleetRules {
    pub fn classify(&self, vehicle_id: &str) -> FleetCategory {
        self.rules
            .iter()
            .find(|rule| rule.matches(vehicle_id))
            .map(|rule| rule.category)
            .unwrap_or(self.default_category)
    }

    /// Display color for `category`, falling back to the built-in palette when
    /// the configuration leaves a category out.
    pub fn color(&self, category: FleetCategory) -> &str {
        self.colors
            .get(&category)
            .map(String::as_str)
            .unwrap_or_else(|| category.default_color())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_classify() {
        let rules = FleetRules::default();
        assert_eq!(rules.classify("DL51EV0012"), FleetCategory::Electric);
        assert_eq!(rules.classify("DL1PC5521"), FleetCategory::Dimts);
        assert_eq!(rules.classify("DL1PD0042"), FleetCategory::Dtc);
        assert_eq!(rules.classify("Unknown"), FleetCategory::Dtc);
    }

    #[test]
    fn test_prefix_rule_wins_over_contains_rule() {
        let rules = FleetRules::default();
        assert_eq!(rules.classify("DL51PC001"), FleetCategory::Electric);
        // Matches both the DL51 prefix and the DL1PC substring
        assert_eq!(rules.classify("DL51DL1PC07"), FleetCategory::Electric);
    }

    #[test]
    fn test_prefix_rule_is_anchored() {
        let rules = FleetRules::default();
        assert_eq!(rules.classify("XDL51001"), FleetCategory::Dtc);
    }

    #[test]
    fn test_matching_ignores_case() {
        let rules = FleetRules::default();
        assert_eq!(rules.classify("dl1pc0001"), FleetCategory::Dimts);
    }

    #[test]
    fn test_default_colors() {
        let rules = FleetRules::default();
        assert_eq!(rules.color(FleetCategory::Electric), "blue");
        assert_eq!(rules.color(FleetCategory::Dimts), "orange");
        assert_eq!(rules.color(FleetCategory::Dtc), "green");
    }

    #[test]
    fn test_missing_color_falls_back_to_palette() {
        let rules = FleetRules {
            colors: HashMap::new(),
            ..Default::default()
        };
        assert_eq!(rules.color(FleetCategory::Dimts), "orange");
    }
}
