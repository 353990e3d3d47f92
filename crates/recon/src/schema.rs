//! Comparable-field schemas, one per entity kind.
//!
//! Roster, schedule and boxscore schemas are fixed lists. Stats schemas are
//! built per pair: every numeric stat found in a category object on either
//! side is compared unless excluded. The sport's category table supplies the
//! built-in exclusions (calculated rates and averages that follow from the
//! counting stats); categories it doesn't list have none.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::config::StatsConfig;
use crate::model::{value_number, EntityKind, Record};
use crate::normalize::clock_minutes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Numeric,
    Height,
    Weight,
    ClassYear,
    /// Played time; tolerates configured drift.
    Clock,
    Time,
    Location,
    Opponent,
    /// Multi-valued; compared element by element.
    Set,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub path: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn new(path: &str, kind: FieldKind) -> Self {
        Self {
            path: path.to_string(),
            kind,
        }
    }
}

pub const ROSTER_FIELDS: &[(&str, FieldKind)] = &[
    ("jersey", FieldKind::Text),
    ("position", FieldKind::Text),
    ("weight", FieldKind::Weight),
    ("height", FieldKind::Height),
    ("year", FieldKind::ClassYear),
];

pub const SCHEDULE_FIELDS: &[(&str, FieldKind)] = &[
    ("opponent", FieldKind::Opponent),
    ("location_indicator", FieldKind::Location),
    ("venue", FieldKind::Text),
    ("tv", FieldKind::Set),
    ("time", FieldKind::Time),
    ("neutral_home_away", FieldKind::Text),
];

pub const BOXSCORE_FIELDS: &[(&str, FieldKind)] = &[
    ("pts", FieldKind::Numeric),
    ("fgm", FieldKind::Numeric),
    ("fga", FieldKind::Numeric),
    ("fg3m", FieldKind::Numeric),
    ("fg3a", FieldKind::Numeric),
    ("ftm", FieldKind::Numeric),
    ("fta", FieldKind::Numeric),
    ("oreb", FieldKind::Numeric),
    ("dreb", FieldKind::Numeric),
    ("reb", FieldKind::Numeric),
    ("ast", FieldKind::Numeric),
    ("stl", FieldKind::Numeric),
    ("blk", FieldKind::Numeric),
    ("to", FieldKind::Numeric),
    ("pf", FieldKind::Numeric),
    ("minutes", FieldKind::Clock),
];

const CLOCK_STATS: &[&str] = &["min", "mins", "minutes"];

// ---------------------------------------------------------------------------
// Stat categories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct StatCategory {
    pub name: &'static str,
    pub excluded: &'static [&'static str],
}

const fn category(name: &'static str, excluded: &'static [&'static str]) -> StatCategory {
    StatCategory { name, excluded }
}

const DIAMOND: &[StatCategory] = &[
    category("batting", &["avg", "obp", "slg", "ops", "ob_pct", "slg_pct"]),
    category("pitching", &["era", "whip", "oba", "k_per_9", "bb_per_9"]),
    category("fielding", &["fpct", "fld_pct"]),
];

const BASKETBALL: &[StatCategory] = &[category(
    "totals",
    &["fg_pct", "fg3_pct", "ft_pct", "ppg", "rpg", "apg", "mpg", "ast_to"],
)];

const FOOTBALL: &[StatCategory] = &[
    category("passing", &["pct", "avg", "ypa", "ypg", "rating"]),
    category("rushing", &["avg", "ypg"]),
    category("receiving", &["avg", "ypg"]),
    category("defense", &[]),
    category("kicking", &["fg_pct", "pat_pct"]),
    category("punting", &["avg"]),
    category("returns", &["avg"]),
];

const SOCCER: &[StatCategory] = &[
    category("totals", &["sh_pct", "sog_pct", "ppg"]),
    category("goalkeeping", &["gaa", "sv_pct"]),
];

const HOCKEY: &[StatCategory] = &[
    category("skating", &["sh_pct", "ppg"]),
    category("goaltending", &["gaa", "sv_pct"]),
];

const VOLLEYBALL: &[StatCategory] = &[
    category("attack", &["pct", "kps"]),
    category("serve", &["aps"]),
    category("defense", &["dps"]),
    category("blocking", &["bps"]),
];

/// Built-in category table for a sport code such as `baseball` or
/// `womens-basketball`. `None` for sports without one.
pub fn stat_categories(sport: &str) -> Option<&'static [StatCategory]> {
    let sport = sport.to_ascii_lowercase();
    let table = if sport.contains("baseball") || sport.contains("softball") {
        DIAMOND
    } else if sport.contains("basketball") {
        BASKETBALL
    } else if sport.contains("football") {
        FOOTBALL
    } else if sport.contains("soccer") {
        SOCCER
    } else if sport.contains("hockey") {
        HOCKEY
    } else if sport.contains("volleyball") {
        VOLLEYBALL
    } else {
        return None;
    };
    Some(table)
}

// ---------------------------------------------------------------------------
// Schema construction
// ---------------------------------------------------------------------------

fn fixed(fields: &[(&str, FieldKind)]) -> Vec<FieldSpec> {
    fields.iter().map(|(path, kind)| FieldSpec::new(path, *kind)).collect()
}

/// Comparable fields for one matched pair.
pub fn fields_for(
    kind: EntityKind,
    sport: Option<&str>,
    reference: &Record,
    scraped: &Record,
    stats: &StatsConfig,
) -> Vec<FieldSpec> {
    match kind {
        EntityKind::Roster => fixed(ROSTER_FIELDS),
        EntityKind::Schedule => fixed(SCHEDULE_FIELDS),
        EntityKind::Boxscore => fixed(BOXSCORE_FIELDS),
        EntityKind::Stats => stats_fields(sport, reference, scraped, stats),
    }
}

fn stats_fields(
    sport: Option<&str>,
    reference: &Record,
    scraped: &Record,
    config: &StatsConfig,
) -> Vec<FieldSpec> {
    let table = sport.and_then(stat_categories).unwrap_or(&[]);
    let names: BTreeSet<&String> = reference
        .fields
        .iter()
        .chain(scraped.fields.iter())
        .filter(|(_, v)| v.is_object())
        .map(|(k, _)| k)
        .collect();

    let mut specs = Vec::new();
    for name in names {
        let excluded = table
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map_or(&[][..], |c| c.excluded);
        let mut stats: BTreeSet<&str> = BTreeSet::new();
        for record in [reference, scraped] {
            if let Some(Value::Object(group)) = record.fields.get(name) {
                stats.extend(
                    group
                        .iter()
                        .filter(|(_, v)| is_stat_value(v))
                        .map(|(k, _)| k.as_str()),
                );
            }
        }
        for stat in stats {
            let lower = stat.to_ascii_lowercase();
            if excluded.contains(&lower.as_str()) || config.is_excluded(name, stat) {
                continue;
            }
            let kind = if CLOCK_STATS.contains(&lower.as_str()) {
                FieldKind::Clock
            } else {
                FieldKind::Numeric
            };
            specs.push(FieldSpec {
                path: format!("{name}.{stat}"),
                kind,
            });
        }
    }
    specs
}

fn is_stat_value(v: &Value) -> bool {
    value_number(v).is_some() || v.as_str().is_some_and(|s| clock_minutes(s).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths(specs: &[FieldSpec]) -> Vec<&str> {
        specs.iter().map(|s| s.path.as_str()).collect()
    }

    #[test]
    fn fixed_schemas() {
        let r = Record::new(EntityKind::Roster);
        let specs = fields_for(EntityKind::Roster, None, &r, &r, &StatsConfig::default());
        assert_eq!(paths(&specs), vec!["jersey", "position", "weight", "height", "year"]);

        let b = Record::new(EntityKind::Boxscore);
        let specs = fields_for(EntityKind::Boxscore, None, &b, &b, &StatsConfig::default());
        assert_eq!(specs.last().unwrap().kind, FieldKind::Clock);
    }

    #[test]
    fn baseball_excludes_calculated_fields() {
        let reference = Record::new(EntityKind::Stats)
            .with("batting", json!({ "ab": 40, "h": 12, "avg": ".300" }))
            .with("pitching", json!({ "ip": "10.1", "era": "2.61" }));
        let scraped = Record::new(EntityKind::Stats)
            .with("batting", json!({ "ab": 40, "h": 11, "hr": 2, "avg": ".275" }));
        let specs = fields_for(
            EntityKind::Stats,
            Some("baseball"),
            &reference,
            &scraped,
            &StatsConfig::default(),
        );
        assert_eq!(
            paths(&specs),
            vec!["batting.ab", "batting.h", "batting.hr", "pitching.ip"]
        );
    }

    #[test]
    fn configured_exclusions_apply() {
        let mut config = StatsConfig::default();
        config.exclusions.insert("batting".into(), vec!["HR".into()]);
        let r = Record::new(EntityKind::Stats).with("batting", json!({ "h": 1, "hr": 1 }));
        let specs = fields_for(EntityKind::Stats, Some("softball"), &r, &r, &config);
        assert_eq!(paths(&specs), vec!["batting.h"]);
    }

    #[test]
    fn unknown_sport_uses_every_category() {
        let r = Record::new(EntityKind::Stats)
            .with("name", "A B")
            .with("rowing", json!({ "races": 4, "min": "12:30", "boat": "Varsity 8" }));
        let config = StatsConfig::default();
        let specs = fields_for(EntityKind::Stats, Some("rowing"), &r, &r, &config);
        assert_eq!(
            specs,
            vec![
                FieldSpec::new("rowing.min", FieldKind::Clock),
                FieldSpec::new("rowing.races", FieldKind::Numeric),
            ]
        );
    }

    #[test]
    fn unlisted_category_is_still_compared() {
        let reference = Record::new(EntityKind::Stats)
            .with("batting", json!({ "ab": 40, "avg": ".300" }))
            .with("catching", json!({ "pb": 3, "sb_pct": ".250" }));
        let scraped = Record::new(EntityKind::Stats)
            .with("batting", json!({ "ab": 40, "avg": ".300" }))
            .with("catching", json!({ "pb": 9, "sb_pct": ".300" }));
        let specs = fields_for(
            EntityKind::Stats,
            Some("baseball"),
            &reference,
            &scraped,
            &StatsConfig::default(),
        );
        assert_eq!(paths(&specs), vec!["batting.ab", "catching.pb", "catching.sb_pct"]);
    }
}
