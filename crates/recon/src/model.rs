use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Entity kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Roster,
    Schedule,
    Stats,
    Boxscore,
}

impl EntityKind {
    /// Roster, stats and boxscore records pair by normalized player name.
    pub fn is_name_keyed(&self) -> bool {
        !matches!(self, Self::Schedule)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Roster => write!(f, "roster"),
            Self::Schedule => write!(f, "schedule"),
            Self::Stats => write!(f, "stats"),
            Self::Boxscore => write!(f, "boxscore"),
        }
    }
}

impl FromStr for EntityKind {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "roster" => Ok(Self::Roster),
            "schedule" => Ok(Self::Schedule),
            "stats" => Ok(Self::Stats),
            "boxscore" => Ok(Self::Boxscore),
            _ => Err(ReconError::InvalidEntityKind(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One entity from one side. Accessors never fail: absent or null fields read
/// as an empty string or zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub kind: EntityKind,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    /// Look up a field. Dotted paths (`batting.hits`) descend into objects.
    pub fn get(&self, path: &str) -> Option<&Value> {
        if let Some(v) = self.fields.get(path) {
            return Some(v);
        }
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn text(&self, path: &str) -> String {
        self.get(path).map(value_text).unwrap_or_default()
    }

    pub fn number(&self, path: &str) -> f64 {
        self.get(path).and_then(value_number).unwrap_or(0.0)
    }

    /// Multi-valued field: a JSON array, or a string separated by `,`, `/`, `|` or `&`.
    pub fn list(&self, path: &str) -> Vec<String> {
        match self.get(path) {
            Some(Value::Array(items)) => items
                .iter()
                .map(value_text)
                .filter(|s| !s.is_empty())
                .collect(),
            Some(v) => value_text(v)
                .split([',', '/', '|', '&'])
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Display name, falling back to `first_name last_name`.
    pub fn name(&self) -> String {
        let name = self.text("name");
        if !name.is_empty() {
            return name;
        }
        let first = self.text("first_name");
        let last = self.text("last_name");
        format!("{first} {last}").trim().to_string()
    }

    pub fn player_id(&self) -> Option<String> {
        let id = self.text("player_id");
        (!id.is_empty()).then_some(id)
    }
}

pub fn value_text(v: &Value) -> String {
    match v {
        Value::Null | Value::Object(_) => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

pub fn value_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s == "-" || s == "--" {
                Some(0.0)
            } else {
                s.replace(',', "").parse().ok()
            }
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    Global,
    League,
    Sport,
    Team,
    Player,
}

impl ScopeLevel {
    pub const ALL: [ScopeLevel; 5] = [
        Self::Global,
        Self::League,
        Self::Sport,
        Self::Team,
        Self::Player,
    ];

    /// Narrower scopes rank higher.
    pub fn specificity(self) -> u8 {
        match self {
            Self::Global => 0,
            Self::League => 1,
            Self::Sport => 2,
            Self::Team => 3,
            Self::Player => 4,
        }
    }
}

impl std::fmt::Display for ScopeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::League => write!(f, "league"),
            Self::Sport => write!(f, "sport"),
            Self::Team => write!(f, "team"),
            Self::Player => write!(f, "player"),
        }
    }
}

/// Either a rule's own scope (only the discriminator for `level` matters) or a
/// comparison's scope context (every known discriminator filled in).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub level: ScopeLevel,
    #[serde(default)]
    pub league: Option<String>,
    #[serde(default)]
    pub sport: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub player_id: Option<String>,
}

impl Scope {
    pub fn global() -> Self {
        Self {
            level: ScopeLevel::Global,
            league: None,
            sport: None,
            team_id: None,
            player_id: None,
        }
    }

    pub fn league(league: &str) -> Self {
        Self {
            level: ScopeLevel::League,
            league: Some(league.into()),
            ..Self::global()
        }
    }

    pub fn sport(sport: &str) -> Self {
        Self {
            level: ScopeLevel::Sport,
            sport: Some(sport.into()),
            ..Self::global()
        }
    }

    pub fn team(team_id: &str) -> Self {
        Self {
            level: ScopeLevel::Team,
            team_id: Some(team_id.into()),
            ..Self::global()
        }
    }

    pub fn player(player_id: &str) -> Self {
        Self {
            level: ScopeLevel::Player,
            player_id: Some(player_id.into()),
            ..Self::global()
        }
    }

    pub fn with_player(&self, player_id: Option<&str>) -> Self {
        let mut scope = self.clone();
        scope.player_id = player_id.map(str::to_string);
        if scope.player_id.is_some() {
            scope.level = ScopeLevel::Player;
        }
        scope
    }

    /// The discriminator a scope carries for `level`. `Global` has none and
    /// needs none.
    pub fn discriminator(&self, level: ScopeLevel) -> Option<&str> {
        let value = match level {
            ScopeLevel::Global => return None,
            ScopeLevel::League => self.league.as_deref(),
            ScopeLevel::Sport => self.sport.as_deref(),
            ScopeLevel::Team => self.team_id.as_deref(),
            ScopeLevel::Player => self.player_id.as_deref(),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    /// A non-global scope whose own level lacks its discriminator.
    pub fn is_degenerate(&self) -> bool {
        self.level != ScopeLevel::Global && self.discriminator(self.level).is_none()
    }
}

// ---------------------------------------------------------------------------
// Mapping rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingType {
    Equivalence,
    Tolerance,
    Ignore,
}

impl std::fmt::Display for MappingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Equivalence => write!(f, "equivalence"),
            Self::Tolerance => write!(f, "tolerance"),
            Self::Ignore => write!(f, "ignore"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToleranceType {
    #[default]
    Absolute,
    Percentage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RulePayload {
    Equivalence {
        primary_value: String,
        #[serde(default)]
        equivalents: Vec<String>,
    },
    Tolerance {
        tolerance: f64,
        #[serde(default)]
        tolerance_type: ToleranceType,
    },
    Ignore {
        primary_value: String,
        #[serde(default)]
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRule {
    pub id: u64,
    pub field_type: String,
    pub scope: Scope,
    pub payload: RulePayload,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl MappingRule {
    pub fn new(id: u64, field_type: &str, scope: Scope, payload: RulePayload) -> Self {
        Self {
            id,
            field_type: field_type.to_string(),
            scope,
            payload,
            case_sensitive: false,
            priority: 0,
            active: true,
            usage_count: 0,
            last_used_at: None,
        }
    }

    pub fn equivalence(
        id: u64,
        field_type: &str,
        scope: Scope,
        primary: &str,
        equivalents: &[&str],
    ) -> Self {
        Self::new(
            id,
            field_type,
            scope,
            RulePayload::Equivalence {
                primary_value: primary.to_string(),
                equivalents: equivalents.iter().map(|e| e.to_string()).collect(),
            },
        )
    }

    pub fn tolerance(
        id: u64,
        field_type: &str,
        scope: Scope,
        tolerance: f64,
        tolerance_type: ToleranceType,
    ) -> Self {
        Self::new(
            id,
            field_type,
            scope,
            RulePayload::Tolerance {
                tolerance,
                tolerance_type,
            },
        )
    }

    pub fn ignore(id: u64, field_type: &str, scope: Scope, primary: &str, reason: &str) -> Self {
        Self::new(
            id,
            field_type,
            scope,
            RulePayload::Ignore {
                primary_value: primary.to_string(),
                reason: reason.to_string(),
            },
        )
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn mapping_type(&self) -> MappingType {
        match self.payload {
            RulePayload::Equivalence { .. } => MappingType::Equivalence,
            RulePayload::Tolerance { .. } => MappingType::Tolerance,
            RulePayload::Ignore { .. } => MappingType::Ignore,
        }
    }

    /// Fold a value the way this rule compares it.
    pub fn fold(&self, value: &str) -> String {
        let value = value.trim();
        if self.case_sensitive {
            value.to_string()
        } else {
            value.to_lowercase()
        }
    }

    /// For an equivalence rule: the primary value when `value` belongs to the
    /// rule's equivalence class.
    pub fn canonical_for(&self, value: &str) -> Option<&str> {
        let RulePayload::Equivalence {
            primary_value,
            equivalents,
        } = &self.payload
        else {
            return None;
        };
        let folded = self.fold(value);
        let member = self.fold(primary_value) == folded
            || equivalents.iter().any(|e| self.fold(e) == folded);
        member.then_some(primary_value.as_str())
    }

    /// True when a rule's scope applies to the given filter.
    pub fn applies_to(&self, level: ScopeLevel, value: Option<&str>) -> bool {
        if self.scope.level != level {
            return false;
        }
        match level {
            ScopeLevel::Global => true,
            _ => match (self.scope.discriminator(level), value) {
                (Some(own), Some(wanted)) => own == wanted.trim(),
                _ => false,
            },
        }
    }

    pub fn applied(&self) -> AppliedMapping {
        AppliedMapping::Rule {
            rule_id: self.id,
            mapping_type: self.mapping_type(),
            scope_level: self.scope.level,
        }
    }
}

/// What resolved (or informed) a field comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppliedMapping {
    Rule {
        rule_id: u64,
        mapping_type: MappingType,
        scope_level: ScopeLevel,
    },
    /// Both values were converted to a common unit before comparing.
    UnitConversion { unit: String },
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// One reference record paired with one scraped record. Built once per pass.
#[derive(Debug, Clone)]
pub struct MatchedPair<'a> {
    pub reference: &'a Record,
    pub scraped: &'a Record,
    pub match_key: String,
}

#[derive(Debug, Clone)]
pub struct UnmatchedRecord<'a> {
    pub key: String,
    pub record: &'a Record,
}

#[derive(Debug)]
pub struct MatchOutput<'a> {
    pub matched: Vec<MatchedPair<'a>>,
    pub missing_in_scraped: Vec<UnmatchedRecord<'a>>,
    pub missing_in_reference: Vec<UnmatchedRecord<'a>>,
}

// ---------------------------------------------------------------------------
// Comparison output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Discrepancy {
    pub match_key: String,
    pub field: String,
    pub reference_value: String,
    pub scraped_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_applied: Option<AppliedMapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityMatch {
    pub match_key: String,
    pub reference: Record,
    pub scraped: Record,
    pub discrepancies: Vec<Discrepancy>,
    pub mappings_used: Vec<AppliedMapping>,
    pub auto_conversions: usize,
    /// An ignore rule fired on this entity; it is left out of the match rate.
    pub ignored: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingEntity {
    pub key: String,
    pub record: Record,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ComparisonSummary {
    pub perfect_matches: usize,
    pub matches_with_discrepancies: usize,
    pub unique_to_reference: usize,
    pub unique_to_scraped: usize,
    pub ignored_reference: usize,
    pub ignored_scraped: usize,
    pub total_discrepancies: usize,
    pub discrepancies_by_field: BTreeMap<String, usize>,
    pub auto_conversions: usize,
    pub mapping_usage: BTreeMap<u64, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonMeta {
    pub entity_kind: EntityKind,
    pub source_kind: String,
    pub team_id: String,
    pub sport: Option<String>,
    pub league: Option<String>,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub meta: ComparisonMeta,
    pub total_reference: usize,
    pub total_scraped: usize,
    pub matches: Vec<EntityMatch>,
    pub discrepancies: Vec<Discrepancy>,
    pub missing_in_reference: Vec<MissingEntity>,
    pub missing_in_scraped: Vec<MissingEntity>,
    pub match_percentage: f64,
    pub summary: ComparisonSummary,
}

/// Caller-supplied context for one comparison run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareContext {
    pub sport: Option<String>,
    pub team_id: String,
    pub league: Option<String>,
    pub source_kind: String,
}

impl CompareContext {
    pub fn new(team_id: &str, source_kind: &str) -> Self {
        Self {
            sport: None,
            team_id: team_id.to_string(),
            league: None,
            source_kind: source_kind.to_string(),
        }
    }

    pub fn with_sport(mut self, sport: &str) -> Self {
        self.sport = Some(sport.to_string());
        self
    }

    pub fn with_league(mut self, league: &str) -> Self {
        self.league = Some(league.to_string());
        self
    }

    /// Team-level scope context carrying every known discriminator.
    pub fn scope(&self) -> Scope {
        Scope {
            level: ScopeLevel::Team,
            league: self.league.clone(),
            sport: self.sport.clone(),
            team_id: Some(self.team_id.clone()),
            player_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entity_kind_parses_tags() {
        assert_eq!("Roster".parse::<EntityKind>().unwrap(), EntityKind::Roster);
        assert_eq!("boxscore".parse::<EntityKind>().unwrap(), EntityKind::Boxscore);
        assert!(matches!(
            "standings".parse::<EntityKind>(),
            Err(ReconError::InvalidEntityKind(_))
        ));
    }

    #[test]
    fn dotted_paths_descend_into_categories() {
        let r = Record::new(EntityKind::Stats)
            .with("name", "Sam Lee")
            .with("batting", json!({ "h": 12, "avg": ".300" }));
        assert_eq!(r.number("batting.h"), 12.0);
        assert_eq!(r.text("batting.avg"), ".300");
        assert_eq!(r.number("batting.hr"), 0.0);
        assert_eq!(r.text("pitching.era"), "");
    }

    #[test]
    fn list_splits_strings_and_arrays() {
        let r = Record::new(EntityKind::Schedule)
            .with("tv", "ESPN2 / ACCN")
            .with("radio", json!(["WXYZ", "", "WABC"]));
        assert_eq!(r.list("tv"), vec!["ESPN2", "ACCN"]);
        assert_eq!(r.list("radio"), vec!["WXYZ", "WABC"]);
        assert!(r.list("streaming").is_empty());
    }

    #[test]
    fn name_falls_back_to_parts() {
        let r = Record::new(EntityKind::Roster)
            .with("first_name", "Ana")
            .with("last_name", "Ruiz");
        assert_eq!(r.name(), "Ana Ruiz");
    }

    #[test]
    fn degenerate_scope_detected() {
        let mut s = Scope::team("duke");
        assert!(!s.is_degenerate());
        s.team_id = Some("  ".into());
        assert!(s.is_degenerate());
        assert!(!Scope::global().is_degenerate());
    }

    #[test]
    fn canonical_respects_case_sensitivity() {
        let mut rule = MappingRule::equivalence(1, "position", Scope::global(), "G", &["Guard"]);
        assert_eq!(rule.canonical_for("guard"), Some("G"));
        rule.case_sensitive = true;
        assert_eq!(rule.canonical_for("guard"), None);
        assert_eq!(rule.canonical_for("Guard"), Some("G"));
    }
}
