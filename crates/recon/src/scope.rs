use std::collections::HashSet;

use crate::model::{MappingRule, Scope, ScopeLevel};
use crate::store::{RuleStore, ScopeFilter};

/// Collects the rules that apply to a field under a scope context.
pub struct ScopeResolver<'a> {
    store: &'a dyn RuleStore,
}

impl<'a> ScopeResolver<'a> {
    pub fn new(store: &'a dyn RuleStore) -> Self {
        Self { store }
    }

    /// Active rules for `field_type`, highest priority first; among equal
    /// priorities the narrower scope wins.
    ///
    /// Levels deeper than `scope.level`, or whose identifier is missing,
    /// contribute nothing. A failed store read is logged and treated the same.
    pub fn resolve(&self, field_type: &str, scope: &Scope) -> Vec<MappingRule> {
        let mut rules: Vec<MappingRule> = Vec::new();
        let mut seen = HashSet::new();

        for level in ScopeLevel::ALL {
            if level.specificity() > scope.level.specificity() {
                break;
            }
            let value = scope.discriminator(level);
            if level != ScopeLevel::Global && value.is_none() {
                continue;
            }

            let filter = ScopeFilter { level, value };
            match self.store.find_active_rules(field_type, &filter) {
                Ok(found) => {
                    for rule in found {
                        if rule.active
                            && rule.field_type == field_type
                            && rule.applies_to(level, value)
                            && seen.insert(rule.id)
                        {
                            rules.push(rule);
                        }
                    }
                }
                Err(e) => {
                    log::warn!("rule lookup for '{field_type}' at {level} scope failed: {e}");
                }
            }
        }

        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.scope.level.specificity().cmp(&a.scope.level.specificity()))
        });
        rules
    }
}
