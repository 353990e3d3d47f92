use std::collections::BTreeMap;

use crate::compare::PairComparison;
use crate::model::{
    AppliedMapping, ComparisonMeta, ComparisonResult, ComparisonSummary, EntityMatch, MatchedPair,
    MissingEntity, UnmatchedRecord,
};

/// Rounding applied to the match percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Whole,
    OneDecimal,
}

impl Precision {
    pub fn round(self, value: f64) -> f64 {
        match self {
            Precision::Whole => value.round(),
            Precision::OneDecimal => (value * 10.0).round() / 10.0,
        }
    }
}

pub struct Compared<'a> {
    pub pair: MatchedPair<'a>,
    pub outcome: PairComparison,
}

/// Everything one entry point hands to the aggregator.
pub struct AggregateInput<'a> {
    pub meta: ComparisonMeta,
    pub total_reference: usize,
    pub total_scraped: usize,
    pub compared: Vec<Compared<'a>>,
    pub missing_in_scraped: Vec<UnmatchedRecord<'a>>,
    pub missing_in_reference: Vec<UnmatchedRecord<'a>>,
    /// Records removed before matching (ignored schedule dates).
    pub set_aside_reference: usize,
    pub set_aside_scraped: usize,
    /// Rules that rewrote a matching key.
    pub matching_rules: Vec<u64>,
    pub precision: Precision,
}

/// Build the result. Ignored entities drop out of both the numerator and
/// the denominators of the match percentage.
pub fn build_result(input: AggregateInput<'_>) -> ComparisonResult {
    let mut summary = ComparisonSummary {
        unique_to_reference: input.missing_in_scraped.len(),
        unique_to_scraped: input.missing_in_reference.len(),
        ignored_reference: input.set_aside_reference,
        ignored_scraped: input.set_aside_scraped,
        ..ComparisonSummary::default()
    };
    for rule_id in &input.matching_rules {
        *summary.mapping_usage.entry(*rule_id).or_insert(0) += 1;
    }

    let mut matches = Vec::with_capacity(input.compared.len());
    let mut discrepancies = Vec::new();
    let mut counted_matches = 0usize;

    for Compared { pair, outcome } in input.compared {
        if outcome.discrepancies.is_empty() {
            summary.perfect_matches += 1;
        } else {
            summary.matches_with_discrepancies += 1;
        }
        if outcome.ignored {
            summary.ignored_reference += 1;
            summary.ignored_scraped += 1;
        } else {
            counted_matches += 1;
        }

        summary.total_discrepancies += outcome.discrepancies.len();
        summary.auto_conversions += outcome.auto_conversions;
        for d in &outcome.discrepancies {
            *summary.discrepancies_by_field.entry(d.field.clone()).or_insert(0) += 1;
        }
        for mapping in &outcome.mappings_used {
            if let AppliedMapping::Rule { rule_id, .. } = mapping {
                *summary.mapping_usage.entry(*rule_id).or_insert(0) += 1;
            }
        }

        discrepancies.extend(outcome.discrepancies.iter().cloned());
        matches.push(EntityMatch {
            match_key: pair.match_key,
            reference: pair.reference.clone(),
            scraped: pair.scraped.clone(),
            discrepancies: outcome.discrepancies,
            mappings_used: outcome.mappings_used,
            auto_conversions: outcome.auto_conversions,
            ignored: outcome.ignored,
        });
    }

    let adjusted_reference = input.total_reference.saturating_sub(summary.ignored_reference);
    let adjusted_scraped = input.total_scraped.saturating_sub(summary.ignored_scraped);
    let match_percentage = match_percentage(
        counted_matches,
        adjusted_reference,
        adjusted_scraped,
        input.precision,
    );

    ComparisonResult {
        meta: input.meta,
        total_reference: input.total_reference,
        total_scraped: input.total_scraped,
        matches,
        discrepancies,
        missing_in_reference: to_missing(input.missing_in_reference),
        missing_in_scraped: to_missing(input.missing_in_scraped),
        match_percentage,
        summary,
    }
}

/// `100 * matched / max(reference, scraped)`; 100 when there is nothing to compare.
pub fn match_percentage(
    matched: usize,
    reference: usize,
    scraped: usize,
    precision: Precision,
) -> f64 {
    let denominator = reference.max(scraped);
    if denominator == 0 {
        return 100.0;
    }
    precision.round(100.0 * matched as f64 / denominator as f64)
}

fn to_missing(records: Vec<UnmatchedRecord<'_>>) -> Vec<MissingEntity> {
    records
        .into_iter()
        .map(|u| MissingEntity {
            key: u.key,
            record: u.record.clone(),
        })
        .collect()
}
