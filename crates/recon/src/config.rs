use std::collections::HashMap;

use serde::Deserialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Engine policy. Every section has defaults, so an empty document is valid.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconConfig {
    #[serde(default)]
    pub roster: RosterConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RosterConfig {
    /// Sports whose rosters don't publish weight; the field is never compared.
    #[serde(default = "default_sports_without_weight")]
    pub sports_without_weight: Vec<String>,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            sports_without_weight: default_sports_without_weight(),
        }
    }
}

fn default_sports_without_weight() -> Vec<String> {
    [
        "womens-basketball",
        "womens-soccer",
        "womens-volleyball",
        "womens-lacrosse",
        "field-hockey",
        "softball",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl RosterConfig {
    pub fn tracks_weight(&self, sport: Option<&str>) -> bool {
        match sport {
            Some(sport) => !self
                .sports_without_weight
                .iter()
                .any(|s| s.eq_ignore_ascii_case(sport.trim())),
            None => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ClockConfig {
    /// Minutes a played-time value may drift before it is flagged.
    #[serde(default = "default_drift_minutes")]
    pub drift_minutes: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            drift_minutes: default_drift_minutes(),
        }
    }
}

fn default_drift_minutes() -> f64 {
    1.0
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsConfig {
    /// Extra per-category exclusions, added to the built-in lists.
    #[serde(default)]
    pub exclusions: HashMap<String, Vec<String>>,
}

impl StatsConfig {
    pub fn is_excluded(&self, category: &str, stat: &str) -> bool {
        self.exclusions
            .get(category)
            .is_some_and(|list| list.iter().any(|s| s.eq_ignore_ascii_case(stat)))
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let drift = self.clock.drift_minutes;
        if !drift.is_finite() || drift < 0.0 {
            return Err(ReconError::ConfigValidation(format!(
                "clock.drift_minutes must be a non-negative number, got {drift}"
            )));
        }

        for category in self.stats.exclusions.keys() {
            if category.trim().is_empty() {
                return Err(ReconError::ConfigValidation(
                    "stats.exclusions: category name must not be empty".into(),
                ));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
