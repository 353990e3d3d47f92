use std::collections::HashSet;

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::aggregate::{build_result, AggregateInput, Compared, Precision};
use crate::compare::FieldComparator;
use crate::config::ReconConfig;
use crate::error::ReconError;
use crate::evaluate::RuleEvaluator;
use crate::matcher::{drop_ignored_names, game_date, ignored_name, match_by_name, match_schedule};
use crate::model::{
    CompareContext, ComparisonMeta, ComparisonResult, EntityKind, MappingRule, MatchOutput, Record,
};
use crate::scope::ScopeResolver;
use crate::store::RuleStore;

/// Field type of rules that rewrite player names before matching.
pub const NAME_FIELD: &str = "name";
/// Field type of rules that rewrite opponent names before matching.
pub const OPPONENT_FIELD: &str = "opponent";

/// Entry points. Holds no state of its own; every call builds a fresh result.
pub struct Reconciler<'a> {
    store: &'a dyn RuleStore,
    config: &'a ReconConfig,
}

struct MatchStage<'a> {
    output: MatchOutput<'a>,
    matching_rules: Vec<u64>,
    set_aside_reference: usize,
    set_aside_scraped: usize,
    /// Resolved `name` rules; ignore rules among them mark matched pairs.
    name_rules: &'a [MappingRule],
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn RuleStore, config: &'a ReconConfig) -> Self {
        Self { store, config }
    }

    pub fn compare_roster(
        &self,
        reference: &[Record],
        scraped: &[Record],
        ctx: &CompareContext,
    ) -> Result<ComparisonResult, ReconError> {
        self.compare_name_keyed(EntityKind::Roster, reference, scraped, ctx)
    }

    pub fn compare_stats(
        &self,
        reference: &[Record],
        scraped: &[Record],
        ctx: &CompareContext,
    ) -> Result<ComparisonResult, ReconError> {
        self.compare_name_keyed(EntityKind::Stats, reference, scraped, ctx)
    }

    /// Player lines of one game for one team.
    pub fn compare_boxscore(
        &self,
        reference: &[Record],
        scraped: &[Record],
        team_id: &str,
        source_kind: &str,
    ) -> Result<ComparisonResult, ReconError> {
        let ctx = CompareContext::new(team_id, source_kind);
        self.compare_name_keyed(EntityKind::Boxscore, reference, scraped, &ctx)
    }

    /// Games on `ignored_dates` are set aside before matching and counted as
    /// ignored on their side.
    pub fn compare_schedule(
        &self,
        reference: &[Record],
        scraped: &[Record],
        ctx: &CompareContext,
        ignored_dates: &HashSet<NaiveDate>,
    ) -> Result<ComparisonResult, ReconError> {
        check_inputs(EntityKind::Schedule, reference, scraped, ctx)?;

        let on_ignored_date =
            |r: &Record| game_date(r).is_some_and(|d| ignored_dates.contains(&d));
        let kept = |records: &[Record]| -> Vec<Record> {
            records.iter().filter(|r| !on_ignored_date(*r)).cloned().collect()
        };
        let kept_reference = kept(reference);
        let kept_scraped = kept(scraped);

        let opponent_rules = ScopeResolver::new(self.store).resolve(OPPONENT_FIELD, &ctx.scope());
        let (output, used) = match_schedule(&kept_reference, &kept_scraped, &opponent_rules);
        let stage = MatchStage {
            output,
            matching_rules: self.record_matching_rules(&used),
            set_aside_reference: reference.len() - kept_reference.len(),
            set_aside_scraped: scraped.len() - kept_scraped.len(),
            name_rules: &[],
        };
        Ok(self.finish(EntityKind::Schedule, ctx, reference.len(), scraped.len(), stage))
    }

    fn compare_name_keyed(
        &self,
        kind: EntityKind,
        reference: &[Record],
        scraped: &[Record],
        ctx: &CompareContext,
    ) -> Result<ComparisonResult, ReconError> {
        check_inputs(kind, reference, scraped, ctx)?;

        let name_rules = ScopeResolver::new(self.store).resolve(NAME_FIELD, &ctx.scope());
        let (mut output, mut used) = match_by_name(reference, scraped, &name_rules);
        let set_aside_reference =
            drop_ignored_names(&mut output.missing_in_scraped, &name_rules, &mut used);
        let set_aside_scraped =
            drop_ignored_names(&mut output.missing_in_reference, &name_rules, &mut used);
        let stage = MatchStage {
            output,
            matching_rules: self.record_matching_rules(&used),
            set_aside_reference,
            set_aside_scraped,
            name_rules: &name_rules,
        };
        Ok(self.finish(kind, ctx, reference.len(), scraped.len(), stage))
    }

    fn record_matching_rules(&self, used: &[&MappingRule]) -> Vec<u64> {
        let evaluator = RuleEvaluator::new(self.store);
        for rule in used {
            evaluator.record_usage(rule);
        }
        used.iter().map(|r| r.id).collect()
    }

    fn finish(
        &self,
        kind: EntityKind,
        ctx: &CompareContext,
        total_reference: usize,
        total_scraped: usize,
        stage: MatchStage<'_>,
    ) -> ComparisonResult {
        let sport = ctx.sport.as_deref();
        let mut comparator =
            FieldComparator::new(kind, ctx.scope(), sport, self.store, self.config);
        let evaluator = RuleEvaluator::new(self.store);
        let name_rules = stage.name_rules;
        let compared: Vec<Compared<'_>> = stage
            .output
            .matched
            .into_iter()
            .map(|pair| {
                let mut outcome = comparator.compare(&pair);
                let ignore = ignored_name(pair.reference, name_rules)
                    .or_else(|| ignored_name(pair.scraped, name_rules));
                if let Some(rule) = ignore {
                    evaluator.record_usage(rule);
                    outcome.ignored = true;
                    outcome.mappings_used.push(rule.applied());
                }
                Compared { pair, outcome }
            })
            .collect();

        let precision = if kind.is_name_keyed() {
            Precision::Whole
        } else {
            Precision::OneDecimal
        };

        let result = build_result(AggregateInput {
            meta: ComparisonMeta {
                entity_kind: kind,
                source_kind: ctx.source_kind.clone(),
                team_id: ctx.team_id.clone(),
                sport: ctx.sport.clone(),
                league: ctx.league.clone(),
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                run_at: chrono::Utc::now().to_rfc3339(),
            },
            total_reference,
            total_scraped,
            compared,
            missing_in_scraped: stage.output.missing_in_scraped,
            missing_in_reference: stage.output.missing_in_reference,
            set_aside_reference: stage.set_aside_reference,
            set_aside_scraped: stage.set_aside_scraped,
            matching_rules: stage.matching_rules,
            precision,
        });

        log::debug!(
            "{kind} {}: {} matched, {} missing in scraped, {} missing in reference, \
             {} discrepancies, {}%",
            ctx.team_id,
            result.matches.len(),
            result.missing_in_scraped.len(),
            result.missing_in_reference.len(),
            result.summary.total_discrepancies,
            result.match_percentage,
        );
        result
    }
}

fn check_inputs(
    kind: EntityKind,
    reference: &[Record],
    scraped: &[Record],
    ctx: &CompareContext,
) -> Result<(), ReconError> {
    if ctx.team_id.trim().is_empty() {
        return Err(ReconError::MissingArgument("team_id"));
    }
    if let Some(stray) = reference.iter().chain(scraped).find(|r| r.kind != kind) {
        return Err(ReconError::EntityKindMismatch {
            expected: kind.to_string(),
            found: stray.kind.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Record loading
// ---------------------------------------------------------------------------

/// Load CSV rows as records. Empty cells are omitted; a dotted header such as
/// `batting.h` lands in a nested `batting` object, with numeric cells stored
/// as JSON numbers.
pub fn load_csv_records(kind: EntityKind, csv_data: &str) -> Result<Vec<Record>, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ReconError::Io(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut records = Vec::new();
    for (i, row) in reader.records().enumerate() {
        let row = row.map_err(|e| ReconError::RecordParse {
            line: e.position().map(|p| p.line() as usize).unwrap_or(i + 2),
            message: e.to_string(),
        })?;

        let mut record = Record::new(kind);
        for (header, cell) in headers.iter().zip(row.iter()) {
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            match header.split_once('.') {
                Some((category, stat)) => {
                    let group = record
                        .fields
                        .entry(category.to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(group) = group {
                        group.insert(stat.to_string(), stat_cell(cell));
                    }
                }
                None => {
                    record.fields.insert(header.clone(), Value::String(cell.to_string()));
                }
            }
        }
        records.push(record);
    }

    Ok(records)
}

fn stat_cell(cell: &str) -> Value {
    let plain = cell.replace(',', "");
    if let Ok(n) = plain.parse::<i64>() {
        return Value::from(n);
    }
    plain
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(cell.to_string()))
}

/// Load a JSON array of field objects as records.
pub fn load_json_records(kind: EntityKind, json: &str) -> Result<Vec<Record>, ReconError> {
    let rows: Vec<Map<String, Value>> =
        serde_json::from_str(json).map_err(|e| ReconError::RecordParse {
            line: e.line(),
            message: e.to_string(),
        })?;
    Ok(rows
        .into_iter()
        .map(|fields| Record {
            kind,
            fields: fields.into_iter().collect(),
        })
        .collect())
}
