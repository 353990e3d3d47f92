//! Rule store port.
//!
//! The core only needs two primitives from whatever persists mapping rules:
//! a per-level query and a best-effort usage increment. `MemoryRuleStore`
//! serves tests and embedded use; database-backed stores live with the caller.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;

use crate::error::ReconError;
use crate::model::{MappingRule, RulePayload, ScopeLevel};

/// One scope level and the discriminator a rule at that level must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeFilter<'a> {
    pub level: ScopeLevel,
    pub value: Option<&'a str>,
}

pub trait RuleStore: Send + Sync {
    fn find_active_rules(
        &self,
        field_type: &str,
        filter: &ScopeFilter<'_>,
    ) -> Result<Vec<MappingRule>, ReconError>;

    fn increment_usage(&self, rule_id: u64) -> Result<(), ReconError>;
}

/// Holds no rules and accepts every increment.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRuleStore;

impl RuleStore for NoopRuleStore {
    fn find_active_rules(
        &self,
        _field_type: &str,
        _filter: &ScopeFilter<'_>,
    ) -> Result<Vec<MappingRule>, ReconError> {
        Ok(Vec::new())
    }

    fn increment_usage(&self, _rule_id: u64) -> Result<(), ReconError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    rules: Vec<MappingRule>,
    usage: HashMap<u64, AtomicU64>,
}

#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(default)]
    rules: Vec<MappingRule>,
}

impl MemoryRuleStore {
    pub fn new(rules: Vec<MappingRule>) -> Self {
        let usage = rules
            .iter()
            .map(|r| (r.id, AtomicU64::new(r.usage_count)))
            .collect();
        Self { rules, usage }
    }

    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let file: RulesFile =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        validate_rules(&file.rules)?;
        Ok(Self::new(file.rules))
    }

    pub fn from_path(path: &Path) -> Result<Self, ReconError> {
        let input = std::fs::read_to_string(path)
            .map_err(|e| ReconError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&input)
    }

    pub fn rules(&self) -> &[MappingRule] {
        &self.rules
    }

    /// Current usage count for a rule (stored count plus increments).
    pub fn usage(&self, rule_id: u64) -> u64 {
        self.usage
            .get(&rule_id)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl RuleStore for MemoryRuleStore {
    fn find_active_rules(
        &self,
        field_type: &str,
        filter: &ScopeFilter<'_>,
    ) -> Result<Vec<MappingRule>, ReconError> {
        Ok(self
            .rules
            .iter()
            .filter(|r| r.active && r.field_type == field_type)
            .filter(|r| r.applies_to(filter.level, filter.value))
            .map(|r| {
                let mut rule = r.clone();
                rule.usage_count = self.usage(r.id);
                rule
            })
            .collect())
    }

    fn increment_usage(&self, rule_id: u64) -> Result<(), ReconError> {
        let counter = self
            .usage
            .get(&rule_id)
            .ok_or_else(|| ReconError::RuleStore(format!("unknown rule id {rule_id}")))?;
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn validate_rules(rules: &[MappingRule]) -> Result<(), ReconError> {
    let mut seen = HashSet::new();
    for rule in rules {
        if !seen.insert(rule.id) {
            return Err(ReconError::ConfigValidation(format!(
                "duplicate rule id {}",
                rule.id
            )));
        }
        if rule.field_type.trim().is_empty() {
            return Err(ReconError::ConfigValidation(format!(
                "rule {}: field_type must not be empty",
                rule.id
            )));
        }
        if rule.scope.is_degenerate() {
            return Err(ReconError::ConfigValidation(format!(
                "rule {}: {} scope without its identifier",
                rule.id, rule.scope.level
            )));
        }
        match &rule.payload {
            RulePayload::Tolerance { tolerance, .. }
                if !tolerance.is_finite() || *tolerance < 0.0 =>
            {
                return Err(ReconError::ConfigValidation(format!(
                    "rule {}: tolerance must be a non-negative number",
                    rule.id
                )));
            }
            RulePayload::Equivalence {
                primary_value,
                equivalents,
            } => {
                let primary = rule.fold(primary_value);
                if equivalents.iter().any(|e| rule.fold(e) == primary) {
                    log::warn!(
                        "rule {}: primary value '{}' is also listed as an equivalent",
                        rule.id,
                        primary_value
                    );
                }
            }
            _ => {}
        }
    }
    Ok(())
}
