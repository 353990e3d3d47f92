use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::model::{MappingRule, MatchOutput, MatchedPair, Record, RulePayload, UnmatchedRecord};
use crate::normalize::{name_key, normalize_name, team_key};

// ---------------------------------------------------------------------------
// Name-keyed matching (roster, stats, boxscore)
// ---------------------------------------------------------------------------

/// Pair records 1:1 by normalized player name.
///
/// Names covered by an equivalence rule are replaced by the rule's primary
/// value first. One record per key per side: a later record with the same key
/// replaces the earlier one. Returns the rules whose substitution changed a key.
pub fn match_by_name<'a, 'r>(
    reference: &'a [Record],
    scraped: &'a [Record],
    name_rules: &'r [MappingRule],
) -> (MatchOutput<'a>, Vec<&'r MappingRule>) {
    let mut rules_used = Vec::new();
    let ref_map = index_by_name(reference, name_rules, &mut rules_used, "reference");
    let scraped_map = index_by_name(scraped, name_rules, &mut rules_used, "scraped");

    let mut matched = Vec::new();
    let mut missing_in_scraped = Vec::new();
    let mut missing_in_reference = Vec::new();

    for (key, ref_record) in &ref_map {
        if let Some(scraped_record) = scraped_map.get(key) {
            matched.push(MatchedPair {
                reference: ref_record,
                scraped: scraped_record,
                match_key: key.clone(),
            });
        } else {
            missing_in_scraped.push(UnmatchedRecord {
                key: key.clone(),
                record: ref_record,
            });
        }
    }

    for (key, scraped_record) in &scraped_map {
        if !ref_map.contains_key(key) {
            missing_in_reference.push(UnmatchedRecord {
                key: key.clone(),
                record: scraped_record,
            });
        }
    }

    (
        MatchOutput {
            matched,
            missing_in_scraped,
            missing_in_reference,
        },
        rules_used,
    )
}

fn index_by_name<'a, 'r>(
    records: &'a [Record],
    rules: &'r [MappingRule],
    rules_used: &mut Vec<&'r MappingRule>,
    side: &str,
) -> BTreeMap<String, &'a Record> {
    let mut map = BTreeMap::new();
    for record in records {
        let key = player_key(record, rules, rules_used);
        if map.insert(key.clone(), record).is_some() {
            log::debug!("{side}: duplicate player key '{key}', keeping the later record");
        }
    }
    map
}

/// Normalized name key after rule substitution.
pub fn player_key<'r>(
    record: &Record,
    rules: &'r [MappingRule],
    rules_used: &mut Vec<&'r MappingRule>,
) -> String {
    let name = record.name();
    let normalized = normalize_name(&name);
    let canonical = rules.iter().find_map(|rule| {
        rule.canonical_for(&name)
            .or_else(|| rule.canonical_for(&normalized))
            .map(|primary| (rule, primary))
    });
    match canonical {
        Some((rule, primary)) => {
            let key = name_key(primary);
            if key != name_key(&name) {
                rules_used.push(rule);
            }
            key
        }
        None => name_key(&name),
    }
}

/// First ignore rule naming this record's player, compared by name key.
pub fn ignored_name<'r>(record: &Record, rules: &'r [MappingRule]) -> Option<&'r MappingRule> {
    let key = name_key(&record.name());
    if key.is_empty() {
        return None;
    }
    rules.iter().find(|rule| match &rule.payload {
        RulePayload::Ignore { primary_value, .. } => name_key(primary_value) == key,
        _ => false,
    })
}

/// Drop unmatched records covered by a name ignore rule. Returns how many
/// were dropped; the rules that fired are appended to `rules_used`.
pub fn drop_ignored_names<'r>(
    unmatched: &mut Vec<UnmatchedRecord<'_>>,
    rules: &'r [MappingRule],
    rules_used: &mut Vec<&'r MappingRule>,
) -> usize {
    let before = unmatched.len();
    unmatched.retain(|u| match ignored_name(u.record, rules) {
        Some(rule) => {
            log::debug!("'{}' is ignored by rule {}", u.key, rule.id);
            rules_used.push(rule);
            false
        }
        None => true,
    });
    before - unmatched.len()
}

// ---------------------------------------------------------------------------
// Date-and-opponent matching (schedule)
// ---------------------------------------------------------------------------

/// Schedule record with its matching keys extracted once.
#[derive(Debug, Clone)]
pub struct ScheduleGame<'a> {
    pub record: &'a Record,
    pub date: Option<NaiveDate>,
    pub opponent: String,
    pub nickname: String,
    pub opponent_id: Option<String>,
    pub game_number: Option<u32>,
}

impl<'a> ScheduleGame<'a> {
    pub fn new<'r>(
        record: &'a Record,
        opponent_rules: &'r [MappingRule],
        rules_used: &mut Vec<&'r MappingRule>,
    ) -> Self {
        let raw = record.text("opponent");
        let opponent = match canonical_team(&raw, opponent_rules) {
            Some((rule, primary)) => {
                let key = team_key(primary);
                if key != team_key(&raw) {
                    rules_used.push(rule);
                }
                key
            }
            None => team_key(&raw),
        };
        let opponent_id = record.text("opponent_id");
        Self {
            record,
            date: game_date(record),
            opponent,
            nickname: team_key(&record.text("opponent_nickname")),
            opponent_id: (!opponent_id.is_empty()).then_some(opponent_id),
            game_number: record.text("game_number").parse().ok(),
        }
    }

    pub fn key(&self) -> String {
        let date = self
            .date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "undated".to_string());
        match self.game_number {
            Some(n) => format!("{date}|{}#{n}", self.opponent),
            None => format!("{date}|{}", self.opponent),
        }
    }
}

fn canonical_team<'r>(raw: &str, rules: &'r [MappingRule]) -> Option<(&'r MappingRule, &'r str)> {
    let key = team_key(raw);
    if key.is_empty() {
        return None;
    }
    rules.iter().find_map(|rule| match &rule.payload {
        RulePayload::Equivalence {
            primary_value,
            equivalents,
        } => std::iter::once(primary_value)
            .chain(equivalents)
            .any(|v| team_key(v) == key)
            .then_some((rule, primary_value.as_str())),
        _ => None,
    })
}

const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y", "%a, %b %d, %Y"];

/// Calendar date of a game, ignoring any time or offset.
pub fn game_date(record: &Record) -> Option<NaiveDate> {
    let raw = record.text("date");
    let raw = raw.trim();
    if let Some(d) = raw
        .get(..10)
        .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
    {
        return Some(d);
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// State of one calendar date while pairing.
#[derive(Debug, Clone, Copy)]
pub struct DateSlot {
    pub unmatched_scraped: usize,
}

/// Picks a reference game from the unused same-date candidates.
pub type OpponentStrategy =
    fn(&ScheduleGame<'_>, &[&ScheduleGame<'_>], &DateSlot) -> Option<usize>;

/// Tried in order; the first strategy to pick a candidate wins.
pub const OPPONENT_STRATEGIES: &[(&str, OpponentStrategy)] = &[
    ("opponent_name", by_opponent_name),
    ("opponent_nickname", by_nickname),
    ("opponent_id", by_opponent_id),
    ("singleton", singleton),
];

pub fn by_opponent_name(
    game: &ScheduleGame<'_>,
    candidates: &[&ScheduleGame<'_>],
    _slot: &DateSlot,
) -> Option<usize> {
    if game.opponent.is_empty() {
        return None;
    }
    let hits: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.opponent == game.opponent)
        .map(|(i, _)| i)
        .collect();
    pick_by_game_number(game, candidates, &hits)
}

/// Mascot-vs-city naming: any of one side's name/nickname equals any of the other's.
pub fn by_nickname(
    game: &ScheduleGame<'_>,
    candidates: &[&ScheduleGame<'_>],
    _slot: &DateSlot,
) -> Option<usize> {
    let ours = [game.opponent.as_str(), game.nickname.as_str()];
    let hits: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| {
            let theirs = [c.opponent.as_str(), c.nickname.as_str()];
            ours.iter()
                .any(|o| !o.is_empty() && theirs.iter().any(|t| t == o))
        })
        .map(|(i, _)| i)
        .collect();
    pick_by_game_number(game, candidates, &hits)
}

pub fn by_opponent_id(
    game: &ScheduleGame<'_>,
    candidates: &[&ScheduleGame<'_>],
    _slot: &DateSlot,
) -> Option<usize> {
    let id = game.opponent_id.as_deref()?;
    let hits: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.opponent_id.as_deref() == Some(id))
        .map(|(i, _)| i)
        .collect();
    pick_by_game_number(game, candidates, &hits)
}

/// Exactly one unmatched game left on each side of this date.
pub fn singleton(
    _game: &ScheduleGame<'_>,
    candidates: &[&ScheduleGame<'_>],
    slot: &DateSlot,
) -> Option<usize> {
    (candidates.len() == 1 && slot.unmatched_scraped == 1).then_some(0)
}

/// Several hits means a doubleheader: prefer the candidate with the same game number.
fn pick_by_game_number(
    game: &ScheduleGame<'_>,
    candidates: &[&ScheduleGame<'_>],
    hits: &[usize],
) -> Option<usize> {
    match hits {
        [] => None,
        [only] => Some(*only),
        _ => game
            .game_number
            .and_then(|n| hits.iter().copied().find(|&i| candidates[i].game_number == Some(n)))
            .or(Some(hits[0])),
    }
}

/// Pair schedule games by calendar date and opponent.
///
/// Each reference game is consumed at most once. Games without a readable
/// date are never paired. Scraped games left over after the first sweep get a
/// second one, so a date that drops to one game per side can still pair.
pub fn match_schedule<'a, 'r>(
    reference: &'a [Record],
    scraped: &'a [Record],
    opponent_rules: &'r [MappingRule],
) -> (MatchOutput<'a>, Vec<&'r MappingRule>) {
    let mut rules_used = Vec::new();
    let refs: Vec<ScheduleGame<'a>> = reference
        .iter()
        .map(|r| ScheduleGame::new(r, opponent_rules, &mut rules_used))
        .collect();
    let games: Vec<ScheduleGame<'a>> = scraped
        .iter()
        .map(|r| ScheduleGame::new(r, opponent_rules, &mut rules_used))
        .collect();

    let mut ref_used = vec![false; refs.len()];
    let mut game_matched = vec![false; games.len()];
    let mut unmatched_by_date: HashMap<NaiveDate, usize> = HashMap::new();
    for game in &games {
        match game.date {
            Some(date) => *unmatched_by_date.entry(date).or_insert(0) += 1,
            None => log::debug!("scraped game '{}' has no readable date", game.key()),
        }
    }

    let mut matched = Vec::new();
    for _sweep in 0..2 {
        for (gi, game) in games.iter().enumerate() {
            if game_matched[gi] {
                continue;
            }
            let Some(date) = game.date else { continue };

            let candidate_idx: Vec<usize> = refs
                .iter()
                .enumerate()
                .filter(|(ri, r)| !ref_used[*ri] && r.date == Some(date))
                .map(|(ri, _)| ri)
                .collect();
            if candidate_idx.is_empty() {
                continue;
            }
            let candidates: Vec<&ScheduleGame<'a>> =
                candidate_idx.iter().map(|&ri| &refs[ri]).collect();
            let slot = DateSlot {
                unmatched_scraped: unmatched_by_date.get(&date).copied().unwrap_or(0),
            };

            let picked = OPPONENT_STRATEGIES
                .iter()
                .find_map(|(name, strategy)| {
                    strategy(game, candidates.as_slice(), &slot).map(|ci| (*name, ci))
                });
            if let Some((strategy, ci)) = picked {
                let ri = candidate_idx[ci];
                ref_used[ri] = true;
                game_matched[gi] = true;
                if let Some(count) = unmatched_by_date.get_mut(&date) {
                    *count = count.saturating_sub(1);
                }
                log::debug!(
                    "paired scraped '{}' with reference '{}' by {strategy}",
                    game.key(),
                    refs[ri].key()
                );
                matched.push(MatchedPair {
                    reference: refs[ri].record,
                    scraped: game.record,
                    match_key: refs[ri].key(),
                });
            }
        }
    }

    let missing_in_scraped = refs
        .iter()
        .zip(&ref_used)
        .filter(|(_, used)| !**used)
        .map(|(g, _)| UnmatchedRecord {
            key: g.key(),
            record: g.record,
        })
        .collect();
    let missing_in_reference = games
        .iter()
        .zip(&game_matched)
        .filter(|(_, m)| !**m)
        .map(|(g, _)| UnmatchedRecord {
            key: g.key(),
            record: g.record,
        })
        .collect();

    (
        MatchOutput {
            matched,
            missing_in_scraped,
            missing_in_reference,
        },
        rules_used,
    )
}
