use std::collections::HashMap;

use crate::config::ReconConfig;
use crate::evaluate::{Evaluation, RuleEvaluator};
use crate::model::{
    value_number, AppliedMapping, Discrepancy, EntityKind, MappingRule, MatchedPair, Record,
    RulePayload, Scope,
};
use crate::normalize::{
    clock_minutes, normalize_class_year, normalize_height, normalize_location, normalize_weight,
    team_key, time_of_day,
};
use crate::schema::{fields_for, FieldKind, FieldSpec};
use crate::scope::ScopeResolver;
use crate::store::RuleStore;

const NUMERIC_EPSILON: f64 = 1e-9;

/// Field-level outcome for one matched pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairComparison {
    pub discrepancies: Vec<Discrepancy>,
    pub mappings_used: Vec<AppliedMapping>,
    pub auto_conversions: usize,
    pub ignored: bool,
}

impl PairComparison {
    fn absorb(&mut self, eval: Evaluation) {
        if let Some(mapping) = eval.mapping_used {
            self.mappings_used.push(mapping);
        }
        if eval.auto_converted {
            self.auto_conversions += 1;
        }
    }
}

/// Compares matched pairs field by field. Resolved rules are cached per
/// (field, player) for the lifetime of the comparator, i.e. one entry-point call.
pub struct FieldComparator<'a> {
    kind: EntityKind,
    scope: Scope,
    sport: Option<&'a str>,
    config: &'a ReconConfig,
    resolver: ScopeResolver<'a>,
    evaluator: RuleEvaluator<'a>,
    rules: HashMap<(String, Option<String>), Vec<MappingRule>>,
}

impl<'a> FieldComparator<'a> {
    pub fn new(
        kind: EntityKind,
        scope: Scope,
        sport: Option<&'a str>,
        store: &'a dyn RuleStore,
        config: &'a ReconConfig,
    ) -> Self {
        Self {
            kind,
            scope,
            sport,
            config,
            resolver: ScopeResolver::new(store),
            evaluator: RuleEvaluator::new(store),
            rules: HashMap::new(),
        }
    }

    pub fn compare(&mut self, pair: &MatchedPair<'_>) -> PairComparison {
        let player = pair.reference.player_id().or_else(|| pair.scraped.player_id());
        let fields = fields_for(
            self.kind,
            self.sport,
            pair.reference,
            pair.scraped,
            &self.config.stats,
        );

        let mut out = PairComparison::default();
        for spec in &fields {
            match spec.kind {
                FieldKind::Set => self.compare_set(spec, pair, player.as_deref(), &mut out),
                _ => self.compare_scalar(spec, pair, player.as_deref(), &mut out),
            }
        }
        out
    }

    fn rules_for(&mut self, field: &str, player: Option<&str>) -> Vec<MappingRule> {
        let key = (field.to_string(), player.map(str::to_string));
        if let Some(rules) = self.rules.get(&key) {
            return rules.clone();
        }
        let scope = self.scope.with_player(player);
        let rules = self.resolver.resolve(field, &scope);
        self.rules.insert(key, rules.clone());
        rules
    }

    fn compare_scalar(
        &mut self,
        spec: &FieldSpec,
        pair: &MatchedPair<'_>,
        player: Option<&str>,
        out: &mut PairComparison,
    ) {
        let (a, b) = match spec.kind {
            FieldKind::Numeric => (
                numeric_text(pair.reference, &spec.path),
                numeric_text(pair.scraped, &spec.path),
            ),
            _ => (pair.reference.text(&spec.path), pair.scraped.text(&spec.path)),
        };
        if a.trim() == b.trim() {
            return;
        }

        match spec.kind {
            FieldKind::Weight => {
                if !self.config.roster.tracks_weight(self.sport) {
                    return;
                }
                if let (Some(x), Some(y)) = (normalize_weight(&a), normalize_weight(&b)) {
                    if x == y {
                        out.auto_conversions += 1;
                        return;
                    }
                }
            }
            FieldKind::Numeric => {
                if let (Some(x), Some(y)) = (
                    numeric(pair.reference, &spec.path),
                    numeric(pair.scraped, &spec.path),
                ) {
                    if (x - y).abs() < NUMERIC_EPSILON {
                        return;
                    }
                }
            }
            FieldKind::Clock => {
                if let (Some(x), Some(y)) = (clock_minutes(&a), clock_minutes(&b)) {
                    if (x - y).abs() <= self.config.clock.drift_minutes + NUMERIC_EPSILON {
                        return;
                    }
                }
            }
            FieldKind::Time => {
                if time_of_day(&a).is_some() && time_of_day(&a) == time_of_day(&b) {
                    return;
                }
            }
            FieldKind::Location => {
                let location = normalize_location(&a);
                if location.is_some() && location == normalize_location(&b) {
                    return;
                }
            }
            FieldKind::Opponent => {
                let key = team_key(&a);
                if !key.is_empty() && key == team_key(&b) {
                    return;
                }
            }
            FieldKind::ClassYear => {
                let year = normalize_class_year(&a);
                if year.is_some() && year == normalize_class_year(&b) {
                    return;
                }
            }
            FieldKind::Text | FieldKind::Height | FieldKind::Set => {}
        }

        let rules = self.rules_for(&spec.path, player);
        let eval = match spec.kind {
            // Tolerance rules read plain numbers, so hand them the converted weights.
            FieldKind::Weight => match (normalize_weight(&a), normalize_weight(&b)) {
                (Some(x), Some(y)) => {
                    self.evaluator
                        .evaluate(&x.to_string(), &y.to_string(), &spec.path, &rules)
                }
                _ => self.evaluator.evaluate(&a, &b, &spec.path, &rules),
            },
            FieldKind::Opponent => {
                let raw = self.evaluator.evaluate(&a, &b, &spec.path, &rules);
                if raw.equivalent {
                    raw
                } else {
                    // Retry without `at`/`vs.` prefixes, rankings and punctuation.
                    let keyed = team_keyed(&rules);
                    self.evaluator.evaluate(&team_key(&a), &team_key(&b), &spec.path, &keyed)
                }
            }
            _ => self.evaluator.evaluate(&a, &b, &spec.path, &rules),
        };

        if eval.equivalent {
            out.ignored |= eval.ignored;
            out.absorb(eval);
            return;
        }

        out.discrepancies.push(Discrepancy {
            match_key: pair.match_key.clone(),
            field: spec.path.clone(),
            reference_value: a.trim().to_string(),
            scraped_value: b.trim().to_string(),
            mapping_applied: unit_conversion(spec.kind, &a, &b),
        });
    }

    /// Element-wise set comparison. An ignore hit on an element suppresses
    /// that element only; the entity stays in the match rate.
    fn compare_set(
        &mut self,
        spec: &FieldSpec,
        pair: &MatchedPair<'_>,
        player: Option<&str>,
        out: &mut PairComparison,
    ) {
        let ours = pair.reference.list(&spec.path);
        let theirs = pair.scraped.list(&spec.path);
        let fold = |s: &String| s.trim().to_lowercase();
        let their_keys: Vec<String> = theirs.iter().map(fold).collect();
        let our_keys: Vec<String> = ours.iter().map(fold).collect();

        let only_ours: Vec<&String> = ours
            .iter()
            .filter(|v| !their_keys.contains(&fold(*v)))
            .collect();
        let mut only_theirs: Vec<Option<&String>> = theirs
            .iter()
            .filter(|v| !our_keys.contains(&fold(*v)))
            .map(Some)
            .collect();
        if only_ours.is_empty() && only_theirs.is_empty() {
            return;
        }

        let rules = self.rules_for(&spec.path, player);
        let (ignore_rules, pairing_rules): (Vec<MappingRule>, Vec<MappingRule>) = rules
            .into_iter()
            .partition(|r| matches!(r.payload, RulePayload::Ignore { .. }));

        let mut unresolved = 0usize;
        for value in only_ours {
            let partner = only_theirs.iter().position(|slot| {
                slot.is_some_and(|other| {
                    let eval = self.evaluator.evaluate(value, other, &spec.path, &pairing_rules);
                    let hit = eval.equivalent;
                    if hit {
                        out.absorb(eval);
                    }
                    hit
                })
            });
            if let Some(idx) = partner {
                only_theirs[idx] = None;
                continue;
            }
            if !self.element_ignored(value, &spec.path, &ignore_rules, out) {
                unresolved += 1;
            }
        }
        for value in only_theirs.into_iter().flatten() {
            if !self.element_ignored(value, &spec.path, &ignore_rules, out) {
                unresolved += 1;
            }
        }

        if unresolved > 0 {
            out.discrepancies.push(Discrepancy {
                match_key: pair.match_key.clone(),
                field: spec.path.clone(),
                reference_value: ours.join(", "),
                scraped_value: theirs.join(", "),
                mapping_applied: None,
            });
        }
    }

    fn element_ignored(
        &self,
        value: &str,
        field: &str,
        ignore_rules: &[MappingRule],
        out: &mut PairComparison,
    ) -> bool {
        if ignore_rules.is_empty() {
            return false;
        }
        let eval = self.evaluator.evaluate(value, "", field, ignore_rules);
        let hit = eval.ignored;
        if hit {
            out.absorb(eval);
        }
        hit
    }
}

/// Counting stat with an absent value read as zero. `None` for non-numeric text.
fn numeric(record: &Record, path: &str) -> Option<f64> {
    match record.get(path) {
        None => Some(0.0),
        Some(v) => value_number(v),
    }
}

fn numeric_text(record: &Record, path: &str) -> String {
    match numeric(record, path) {
        Some(n) => n.to_string(),
        None => record.text(path),
    }
}

/// Opponent rules with their values folded to team keys, matching how the
/// schedule matcher reads them.
fn team_keyed(rules: &[MappingRule]) -> Vec<MappingRule> {
    rules
        .iter()
        .cloned()
        .map(|mut rule| {
            match &mut rule.payload {
                RulePayload::Equivalence {
                    primary_value,
                    equivalents,
                } => {
                    *primary_value = team_key(primary_value);
                    for e in equivalents.iter_mut() {
                        *e = team_key(e);
                    }
                }
                RulePayload::Ignore { primary_value, .. } => {
                    *primary_value = team_key(primary_value);
                }
                RulePayload::Tolerance { .. } => {}
            }
            rule
        })
        .collect()
}

fn unit_conversion(kind: FieldKind, a: &str, b: &str) -> Option<AppliedMapping> {
    let unit = match kind {
        FieldKind::Height if normalize_height(a).is_some() && normalize_height(b).is_some() => {
            "in"
        }
        FieldKind::Weight if normalize_weight(a).is_some() && normalize_weight(b).is_some() => {
            "lbs"
        }
        _ => return None,
    };
    Some(AppliedMapping::UnitConversion { unit: unit.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompareContext, MappingType, ScopeLevel, ToleranceType};
    use crate::store::{MemoryRuleStore, NoopRuleStore};

    fn pair<'a>(reference: &'a Record, scraped: &'a Record) -> MatchedPair<'a> {
        MatchedPair {
            reference,
            scraped,
            match_key: "k".into(),
        }
    }

    fn roster(jersey: &str, height: &str, weight: &str) -> Record {
        Record::new(EntityKind::Roster)
            .with("name", "Kai Jones")
            .with("jersey", jersey)
            .with("position", "G")
            .with("height", height)
            .with("weight", weight)
            .with("year", "So.")
    }

    fn context() -> CompareContext {
        CompareContext::new("duke", "sidearm").with_sport("mens-basketball")
    }

    fn roster_comparator<'a>(
        sport: Option<&'a str>,
        store: &'a dyn RuleStore,
        config: &'a ReconConfig,
    ) -> FieldComparator<'a> {
        FieldComparator::new(EntityKind::Roster, context().scope(), sport, store, config)
    }

    #[test]
    fn identical_pair_has_no_discrepancies() {
        let config = ReconConfig::default();
        let r = roster("1", "6-2", "185");
        let mut cmp = roster_comparator(Some("mens-basketball"), &NoopRuleStore, &config);
        assert_eq!(cmp.compare(&pair(&r, &r)), PairComparison::default());
    }

    #[test]
    fn unit_conversions_count() {
        let config = ReconConfig::default();
        let a = roster("1", "74", "185");
        let b = roster("1", "6'2\"", "185 lbs").with("year", "Sophomore");
        let mut cmp = roster_comparator(Some("mens-basketball"), &NoopRuleStore, &config);
        let out = cmp.compare(&pair(&a, &b));
        assert!(out.discrepancies.is_empty());
        assert_eq!(out.auto_conversions, 2);
    }

    #[test]
    fn height_mismatch_reports_unit_conversion() {
        let config = ReconConfig::default();
        let a = roster("1", "75", "185");
        let b = roster("1", "6'2\"", "185");
        let mut cmp = roster_comparator(None, &NoopRuleStore, &config);
        let out = cmp.compare(&pair(&a, &b));
        assert_eq!(out.discrepancies.len(), 1);
        assert_eq!(out.discrepancies[0].field, "height");
        assert_eq!(
            out.discrepancies[0].mapping_applied,
            Some(AppliedMapping::UnitConversion { unit: "in".into() })
        );
    }

    #[test]
    fn weight_skipped_for_configured_sport() {
        let config = ReconConfig::default();
        let a = roster("1", "70", "140");
        let b = roster("1", "70", "150");
        let mut cmp = roster_comparator(Some("womens-basketball"), &NoopRuleStore, &config);
        assert!(cmp.compare(&pair(&a, &b)).discrepancies.is_empty());

        let mut cmp = roster_comparator(Some("mens-basketball"), &NoopRuleStore, &config);
        assert_eq!(cmp.compare(&pair(&a, &b)).discrepancies.len(), 1);
    }

    #[test]
    fn weight_tolerance_reads_converted_values() {
        let config = ReconConfig::default();
        let store = MemoryRuleStore::new(vec![MappingRule::tolerance(
            9,
            "weight",
            Scope::team("duke"),
            5.0,
            ToleranceType::Absolute,
        )]);
        let a = roster("1", "70", "200 lbs");
        let b = roster("1", "70", "204");
        let mut cmp = roster_comparator(None, &store, &config);
        let out = cmp.compare(&pair(&a, &b));
        assert!(out.discrepancies.is_empty());
        assert_eq!(
            out.mappings_used,
            vec![AppliedMapping::Rule {
                rule_id: 9,
                mapping_type: MappingType::Tolerance,
                scope_level: ScopeLevel::Team,
            }]
        );
        assert_eq!(store.usage(9), 1);
    }

    #[test]
    fn player_scoped_rule_only_for_that_player() {
        let config = ReconConfig::default();
        let store = MemoryRuleStore::new(vec![MappingRule::equivalence(
            3,
            "position",
            Scope::player("p-7"),
            "G",
            &["PG"],
        )]);
        let a = roster("1", "70", "180").with("player_id", "p-7");
        let b = roster("1", "70", "180").with("position", "PG");
        let mut cmp = roster_comparator(None, &store, &config);
        assert!(cmp.compare(&pair(&a, &b)).discrepancies.is_empty());

        let c = roster("1", "70", "180").with("player_id", "p-8");
        assert_eq!(cmp.compare(&pair(&c, &b)).discrepancies.len(), 1);
    }

    #[test]
    fn ignore_rule_marks_pair() {
        let config = ReconConfig::default();
        let store = MemoryRuleStore::new(vec![MappingRule::ignore(
            4,
            "jersey",
            Scope::global(),
            "--",
            "unassigned",
        )]);
        let a = roster("--", "70", "180");
        let b = roster("12", "71", "180");
        let mut cmp = roster_comparator(None, &store, &config);
        let out = cmp.compare(&pair(&a, &b));
        assert!(out.ignored);
        assert_eq!(out.discrepancies.len(), 1);
        assert_eq!(out.discrepancies[0].field, "height");
    }

    fn boxscore_comparator<'a>(
        store: &'a dyn RuleStore,
        config: &'a ReconConfig,
    ) -> FieldComparator<'a> {
        FieldComparator::new(EntityKind::Boxscore, Scope::team("duke"), None, store, config)
    }

    #[test]
    fn boxscore_minutes_drift_and_missing_zero() {
        let config = ReconConfig::default();
        let a = Record::new(EntityKind::Boxscore)
            .with("pts", 12)
            .with("minutes", "31:45")
            .with("to", 0);
        let b = Record::new(EntityKind::Boxscore).with("pts", "12").with("minutes", "32");
        let mut cmp = boxscore_comparator(&NoopRuleStore, &config);
        assert!(cmp.compare(&pair(&a, &b)).discrepancies.is_empty());

        let c = Record::new(EntityKind::Boxscore).with("pts", 12).with("minutes", "34");
        let out = cmp.compare(&pair(&a, &c));
        assert_eq!(out.discrepancies.len(), 1);
        assert_eq!(out.discrepancies[0].field, "minutes");
    }

    #[test]
    fn absent_stat_reads_zero_under_tolerance() {
        let config = ReconConfig::default();
        let store = MemoryRuleStore::new(vec![MappingRule::tolerance(
            6,
            "pf",
            Scope::team("duke"),
            2.0,
            ToleranceType::Absolute,
        )]);
        let a = Record::new(EntityKind::Boxscore).with("pts", 8);
        let b = Record::new(EntityKind::Boxscore).with("pts", 8).with("pf", 1);
        let mut cmp = boxscore_comparator(&store, &config);
        let out = cmp.compare(&pair(&a, &b));
        assert!(out.discrepancies.is_empty());
        assert_eq!(store.usage(6), 1);

        let mut cmp = boxscore_comparator(&NoopRuleStore, &config);
        let c = Record::new(EntityKind::Boxscore).with("pts", 8).with("pf", 3);
        let out = cmp.compare(&pair(&a, &c));
        assert_eq!(out.discrepancies.len(), 1);
        assert_eq!(out.discrepancies[0].field, "pf");
        assert_eq!(out.discrepancies[0].reference_value, "0");
        assert_eq!(out.discrepancies[0].scraped_value, "3");
    }

    fn game(tv: &str) -> Record {
        Record::new(EntityKind::Schedule)
            .with("date", "2025-02-01")
            .with("opponent", "Duke")
            .with("location_indicator", "H")
            .with("time", "7:00 PM")
            .with("tv", tv)
    }

    fn schedule_comparator<'a>(
        store: &'a dyn RuleStore,
        config: &'a ReconConfig,
    ) -> FieldComparator<'a> {
        FieldComparator::new(EntityKind::Schedule, Scope::team("unc"), None, store, config)
    }

    #[test]
    fn schedule_normalized_fields() {
        let config = ReconConfig::default();
        let a = game("ESPN");
        let b = game("espn")
            .with("opponent", "vs. #4 Duke")
            .with("location_indicator", "home")
            .with("time", "19:00");
        let mut cmp = schedule_comparator(&NoopRuleStore, &config);
        assert!(cmp.compare(&pair(&a, &b)).discrepancies.is_empty());
    }

    #[test]
    fn opponent_rule_with_punctuated_values() {
        let config = ReconConfig::default();
        let store = MemoryRuleStore::new(vec![MappingRule::equivalence(
            11,
            "opponent",
            Scope::team("unc"),
            "St. Mary's",
            &["Saint Mary's (CA)"],
        )]);
        let a = game("ESPN").with("opponent", "St. Mary's");
        let b = game("ESPN").with("opponent", "Saint Mary's (CA)");
        let mut cmp = schedule_comparator(&store, &config);
        let out = cmp.compare(&pair(&a, &b));
        assert!(out.discrepancies.is_empty());
        assert_eq!(store.usage(11), 1);

        let c = game("ESPN").with("opponent", "at #12 Saint Mary's (CA)");
        let out = cmp.compare(&pair(&a, &c));
        assert!(out.discrepancies.is_empty());
        assert_eq!(store.usage(11), 2);

        let d = game("ESPN").with("opponent", "Santa Clara");
        assert_eq!(cmp.compare(&pair(&a, &d)).discrepancies.len(), 1);
        assert_eq!(store.usage(11), 2);
    }

    #[test]
    fn tv_set_elements() {
        let config = ReconConfig::default();
        let store = MemoryRuleStore::new(vec![
            MappingRule::equivalence(1, "tv", Scope::global(), "ACC Network", &["ACCN"]),
            MappingRule::ignore(2, "tv", Scope::global(), "ESPN+", "streaming"),
        ]);
        let a = game("ESPN2, ACC Network");
        let b = game("ACCN / ESPN2 / ESPN+");
        let mut cmp = schedule_comparator(&store, &config);
        let out = cmp.compare(&pair(&a, &b));
        assert!(out.discrepancies.is_empty());
        assert!(!out.ignored);
        assert_eq!(out.mappings_used.len(), 2);

        let c = game("ESPN2 / CBS");
        let out = cmp.compare(&pair(&a, &c));
        assert_eq!(out.discrepancies.len(), 1);
        assert_eq!(out.discrepancies[0].reference_value, "ESPN2, ACC Network");
        assert_eq!(out.discrepancies[0].scraped_value, "ESPN2, CBS");
    }
}
