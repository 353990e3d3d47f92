use crate::model::{AppliedMapping, MappingRule, RulePayload, ToleranceType};
use crate::normalize::{normalize_height, parse_number};
use crate::store::RuleStore;

/// Field type whose values get built-in unit conversion.
pub const HEIGHT_FIELD: &str = "height";

const TOLERANCE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub equivalent: bool,
    pub mapping_used: Option<AppliedMapping>,
    pub auto_converted: bool,
    /// An ignore rule fired; the caller excludes the entity from match-rate accounting.
    pub ignored: bool,
}

impl Evaluation {
    fn not_equivalent() -> Self {
        Self {
            equivalent: false,
            mapping_used: None,
            auto_converted: false,
            ignored: false,
        }
    }

    fn exact() -> Self {
        Self {
            equivalent: true,
            ..Self::not_equivalent()
        }
    }

    fn by_rule(rule: &MappingRule, ignored: bool) -> Self {
        Self {
            equivalent: true,
            mapping_used: Some(rule.applied()),
            auto_converted: false,
            ignored,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleOutcome {
    NoMatch,
    Equivalent,
    Ignored,
}

pub struct RuleEvaluator<'a> {
    store: &'a dyn RuleStore,
}

impl<'a> RuleEvaluator<'a> {
    pub fn new(store: &'a dyn RuleStore) -> Self {
        Self { store }
    }

    /// Decide whether `a` and `b` are the same value for `field_type`.
    /// `rules` must already be resolved and ordered for the scope.
    pub fn evaluate(
        &self,
        a: &str,
        b: &str,
        field_type: &str,
        rules: &[MappingRule],
    ) -> Evaluation {
        let (a, b) = (a.trim(), b.trim());
        if a == b {
            return Evaluation::exact();
        }

        if field_type == HEIGHT_FIELD {
            if let (Some(x), Some(y)) = (normalize_height(a), normalize_height(b)) {
                if x == y {
                    return Evaluation {
                        auto_converted: true,
                        ..Evaluation::exact()
                    };
                }
            }
        }

        for rule in rules {
            let outcome = match_rule(rule, a, b);
            if outcome != RuleOutcome::NoMatch {
                self.record_usage(rule);
                return Evaluation::by_rule(rule, outcome == RuleOutcome::Ignored);
            }
        }

        Evaluation::not_equivalent()
    }

    /// Best-effort usage increment. Failures are logged and dropped.
    pub fn record_usage(&self, rule: &MappingRule) {
        if let Err(e) = self.store.increment_usage(rule.id) {
            log::warn!("usage increment for rule {} failed: {e}", rule.id);
        }
    }
}

fn match_rule(rule: &MappingRule, a: &str, b: &str) -> RuleOutcome {
    match &rule.payload {
        RulePayload::Equivalence { .. } => {
            if rule.canonical_for(a).is_some() && rule.canonical_for(b).is_some() {
                RuleOutcome::Equivalent
            } else {
                RuleOutcome::NoMatch
            }
        }
        RulePayload::Tolerance {
            tolerance,
            tolerance_type,
        } => match within_tolerance(a, b, *tolerance, *tolerance_type) {
            Some(true) => RuleOutcome::Equivalent,
            _ => RuleOutcome::NoMatch,
        },
        RulePayload::Ignore { primary_value, .. } => {
            let primary = primary_value.trim().to_lowercase();
            if a.to_lowercase() == primary || b.to_lowercase() == primary {
                RuleOutcome::Ignored
            } else {
                RuleOutcome::NoMatch
            }
        }
    }
}

/// `None` when either side isn't numeric; the rule is then skipped.
fn within_tolerance(a: &str, b: &str, tolerance: f64, kind: ToleranceType) -> Option<bool> {
    let x = parse_number(a)?;
    let y = parse_number(b)?;
    let diff = (x - y).abs();
    let allowed = match kind {
        ToleranceType::Absolute => diff,
        ToleranceType::Percentage => {
            let base = x.abs().max(y.abs());
            if base == 0.0 {
                0.0
            } else {
                diff / base * 100.0
            }
        }
    };
    Some(allowed <= tolerance + TOLERANCE_EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconError;
    use crate::model::{MappingType, Scope, ScopeLevel};
    use crate::store::{MemoryRuleStore, NoopRuleStore, ScopeFilter};

    #[test]
    fn exact_match_needs_no_rule() {
        let eval = RuleEvaluator::new(&NoopRuleStore).evaluate(" 23", "23 ", "jersey", &[]);
        assert!(eval.equivalent);
        assert!(eval.mapping_used.is_none());
        assert!(!eval.auto_converted);
    }

    #[test]
    fn height_converts_without_rules() {
        // A rule that would also match must not be consulted.
        let rules = vec![MappingRule::equivalence(1, "height", Scope::global(), "6'2\"", &["74"])];
        let store = MemoryRuleStore::new(rules.clone());
        let eval = RuleEvaluator::new(&store).evaluate("74", "6'2\"", HEIGHT_FIELD, &rules);
        assert!(eval.equivalent);
        assert!(eval.auto_converted);
        assert!(eval.mapping_used.is_none());
        assert_eq!(store.usage(1), 0);
    }

    #[test]
    fn height_mismatch_is_not_equivalent() {
        let eval = RuleEvaluator::new(&NoopRuleStore).evaluate("75", "6'2\"", HEIGHT_FIELD, &[]);
        assert!(!eval.equivalent);
    }

    #[test]
    fn equivalence_counts_usage() {
        let rules = vec![MappingRule::equivalence(
            1,
            "position",
            Scope::global(),
            "G",
            &["Guard", "PG"],
        )];
        let store = MemoryRuleStore::new(rules.clone());
        let evaluator = RuleEvaluator::new(&store);

        let eval = evaluator.evaluate("guard", "PG", "position", &rules);
        assert!(eval.equivalent);
        assert_eq!(
            eval.mapping_used,
            Some(AppliedMapping::Rule {
                rule_id: 1,
                mapping_type: MappingType::Equivalence,
                scope_level: ScopeLevel::Global,
            })
        );
        assert_eq!(store.usage(1), 1);

        assert!(!evaluator.evaluate("G", "F", "position", &rules).equivalent);
        assert_eq!(store.usage(1), 1);
    }

    #[test]
    fn absolute_tolerance_boundary() {
        let rules = vec![MappingRule::tolerance(
            1,
            "weight",
            Scope::global(),
            5.0,
            ToleranceType::Absolute,
        )];
        let evaluator = RuleEvaluator::new(&NoopRuleStore);
        assert!(evaluator.evaluate("200", "205", "weight", &rules).equivalent);
        assert!(!evaluator.evaluate("200", "205.01", "weight", &rules).equivalent);
    }

    #[test]
    fn percentage_tolerance() {
        let rules = vec![MappingRule::tolerance(
            1,
            "pts",
            Scope::global(),
            10.0,
            ToleranceType::Percentage,
        )];
        let evaluator = RuleEvaluator::new(&NoopRuleStore);
        assert!(evaluator.evaluate("90", "100", "pts", &rules).equivalent);
        assert!(!evaluator.evaluate("89", "100", "pts", &rules).equivalent);
        assert!(evaluator.evaluate("0", "0.0", "pts", &rules).equivalent);
    }

    #[test]
    fn unparsable_tolerance_operands_skip_rule() {
        let rules = vec![
            MappingRule::tolerance(1, "weight", Scope::global(), 50.0, ToleranceType::Absolute),
            MappingRule::ignore(2, "weight", Scope::global(), "--", "not listed"),
        ];
        let eval = RuleEvaluator::new(&NoopRuleStore).evaluate("--", "190", "weight", &rules);
        assert!(eval.equivalent);
        assert!(eval.ignored);
        assert!(matches!(eval.mapping_used, Some(AppliedMapping::Rule { rule_id: 2, .. })));
    }

    #[test]
    fn ignore_is_case_insensitive() {
        let mut rule = MappingRule::ignore(3, "venue", Scope::global(), "TBA", "placeholder");
        rule.case_sensitive = true;
        let eval =
            RuleEvaluator::new(&NoopRuleStore).evaluate("Cameron Indoor", "tba", "venue", &[rule]);
        assert!(eval.equivalent);
        assert!(eval.ignored);
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = vec![
            MappingRule::equivalence(4, "position", Scope::team("duke"), "G", &["Guard"]),
            MappingRule::ignore(1, "position", Scope::global(), "Guard", "legacy"),
        ];
        let eval = RuleEvaluator::new(&NoopRuleStore).evaluate("G", "Guard", "position", &rules);
        assert!(eval.equivalent);
        assert!(!eval.ignored);
        assert!(matches!(eval.mapping_used, Some(AppliedMapping::Rule { rule_id: 4, .. })));
    }

    #[test]
    fn primary_listed_as_equivalent_still_matches_itself() {
        let rules = vec![MappingRule::equivalence(
            1,
            "position",
            Scope::global(),
            "F",
            &["F", "Forward"],
        )];
        let eval = RuleEvaluator::new(&NoopRuleStore).evaluate("f", "Forward", "position", &rules);
        assert!(eval.equivalent);
    }

    struct FailingStore;

    impl RuleStore for FailingStore {
        fn find_active_rules(
            &self,
            _field_type: &str,
            _filter: &ScopeFilter<'_>,
        ) -> Result<Vec<MappingRule>, ReconError> {
            Ok(Vec::new())
        }

        fn increment_usage(&self, rule_id: u64) -> Result<(), ReconError> {
            Err(ReconError::RuleStore(format!("rule {rule_id}: write timed out")))
        }
    }

    #[test]
    fn usage_failure_does_not_change_outcome() {
        let rules = vec![MappingRule::equivalence(
            1,
            "position",
            Scope::global(),
            "C",
            &["Center"],
        )];
        let eval = RuleEvaluator::new(&FailingStore).evaluate("C", "Center", "position", &rules);
        assert!(eval.equivalent);
        assert!(eval.mapping_used.is_some());
    }
}
