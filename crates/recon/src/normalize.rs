//! Value canonicalization. Every function here is pure and total: input it
//! cannot read comes back as `None`, never as an error.

use unicode_normalization::UnicodeNormalization;

const GENERATIONAL_SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv"];

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

/// Curly quotes, primes and backticks to their ASCII forms.
pub fn unify_quotes(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' | '`' | '\u{00B4}' => {
                '\''
            }
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' => '"',
            c => c,
        })
        .collect()
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop trailing generational suffixes (`Jr.`, `Sr`, `II`–`IV`), with or
/// without a preceding comma. A name that is nothing but a suffix is kept.
pub fn strip_suffix(name: &str) -> String {
    let mut tokens: Vec<&str> = name.split_whitespace().collect();
    while tokens.len() >= 2 {
        let last = tokens[tokens.len() - 1]
            .trim_matches(|c| c == '.' || c == ',')
            .to_lowercase();
        if !GENERATIONAL_SUFFIXES.contains(&last.as_str()) {
            break;
        }
        tokens.pop();
        if let Some(prev) = tokens.last_mut() {
            *prev = prev.trim_end_matches(',');
        }
        if tokens.last().is_some_and(|t| t.is_empty()) {
            tokens.pop();
        }
    }
    tokens.join(" ")
}

/// Display-preserving name cleanup: NFC, ASCII quotes, single spaces, no suffix.
pub fn normalize_name(raw: &str) -> String {
    let composed: String = raw.nfc().collect();
    strip_suffix(&collapse_whitespace(&unify_quotes(&composed)))
}

/// Lookup key for pairing players across sources. `"Doe, John"` and
/// `"john doe"` share a key.
pub fn name_key(raw: &str) -> String {
    let name = normalize_name(raw);
    let flipped = match name.split_once(',') {
        Some((last, first))
            if !first.contains(',') && !first.trim().is_empty() && !last.trim().is_empty() =>
        {
            strip_suffix(&format!("{} {}", first.trim(), last.trim()))
        }
        _ => name,
    };
    flipped.to_lowercase()
}

/// Lookup key for team names: lower case, no periods or apostrophes, no
/// `vs.`/`at`/`@` prefix, no poll ranking.
pub fn team_key(raw: &str) -> String {
    let composed: String = raw.nfc().collect();
    let cleaned: String = unify_quotes(&composed)
        .to_lowercase()
        .chars()
        .filter(|c| *c != '.' && *c != '\'')
        .collect();
    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();

    if let Some(&first) = tokens.first() {
        if let Some(rest) = first.strip_prefix('@') {
            if rest.is_empty() {
                tokens.remove(0);
            } else {
                tokens[0] = rest;
            }
        } else if matches!(first, "vs" | "at" | "v") && tokens.len() > 1 {
            tokens.remove(0);
        }
    }

    if let Some(&first) = tokens.first() {
        if let Some(rank) = first.strip_prefix('#') {
            if rank.chars().all(|c| c.is_ascii_digit()) {
                tokens.remove(0);
            }
        } else if first == "no"
            && tokens.len() > 2
            && tokens[1].chars().all(|c| c.is_ascii_digit())
        {
            tokens.drain(..2);
        }
    }

    tokens.join(" ")
}

// ---------------------------------------------------------------------------
// Physical units
// ---------------------------------------------------------------------------

/// Height in whole inches. Accepts `74`, `6'2"`, `6' 2"`, `6-2`, `6 ft 2 in`,
/// `188 cm`.
pub fn normalize_height(raw: &str) -> Option<u32> {
    let s = unify_quotes(raw).trim().to_lowercase();
    if s.is_empty() {
        return None;
    }
    if let Some(cm) = s.strip_suffix("cm") {
        let cm: f64 = cm.trim().parse().ok()?;
        if !cm.is_finite() || cm <= 0.0 {
            return None;
        }
        return Some((cm / 2.54).round() as u32);
    }
    if s.chars().all(|c| c.is_ascii_digit()) {
        return s.parse().ok().filter(|inches| *inches > 0);
    }

    let has_feet = s.contains('\'') || s.contains("ft") || s.contains("feet") || s.contains('-');
    if !has_feet {
        return None;
    }
    let nums = s
        .split(|c: char| !c.is_ascii_digit())
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    if nums.is_empty() || nums.len() > 2 {
        return None;
    }
    let feet = nums[0];
    let inches = nums.get(1).copied().unwrap_or(0);
    if feet == 0 || feet > 8 || inches >= 12 {
        return None;
    }
    Some(feet * 12 + inches)
}

/// Weight in whole pounds. Accepts `185`, `185 lbs`, `185lb`, `84 kg`.
pub fn normalize_weight(raw: &str) -> Option<u32> {
    let s = raw.trim().to_lowercase();
    let (number, factor) = if let Some(kg) = s.strip_suffix("kg") {
        (kg, 2.20462)
    } else {
        let lbs = s
            .trim_end_matches('.')
            .trim_end_matches("pounds")
            .trim_end_matches("lbs")
            .trim_end_matches("lb");
        (lbs, 1.0)
    };
    let value: f64 = number.trim().parse().ok()?;
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    Some((value * factor).round() as u32)
}

// ---------------------------------------------------------------------------
// Roster class
// ---------------------------------------------------------------------------

/// Canonical academic class: `fr`, `so`, `jr`, `sr`, `gr`, `5th`, with an
/// `r-` prefix for redshirts.
pub fn normalize_class_year(raw: &str) -> Option<String> {
    let s: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != '.')
        .collect();
    let s = collapse_whitespace(&s);

    let (redshirt, base) = if let Some(rest) = s.strip_prefix("redshirt") {
        (true, rest.trim())
    } else if let Some(rest) = s.strip_prefix("r-") {
        (true, rest.trim())
    } else if let Some(rest) = s.strip_prefix("rs") {
        (true, rest.trim_start_matches('-').trim())
    } else {
        (false, s.as_str())
    };

    let canonical = match base {
        "fr" | "freshman" | "fy" | "first year" => "fr",
        "so" | "soph" | "sophomore" => "so",
        "jr" | "junior" => "jr",
        "sr" | "senior" => "sr",
        "gr" | "gs" | "grad" | "graduate" | "graduate student" => "gr",
        "5th" | "fifth" | "5th year" | "fifth year" => "5th",
        _ => return None,
    };
    Some(if redshirt {
        format!("r-{canonical}")
    } else {
        canonical.to_string()
    })
}

// ---------------------------------------------------------------------------
// Clock + time of day
// ---------------------------------------------------------------------------

/// Played time in minutes: `32`, `32:15`, `32.5`.
pub fn clock_minutes(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    match s.split_once(':') {
        Some((min, sec)) => {
            let min: u32 = min.trim().parse().ok()?;
            let sec: u32 = sec.trim().parse().ok()?;
            if sec >= 60 {
                return None;
            }
            Some(min as f64 + sec as f64 / 60.0)
        }
        None => s.parse::<f64>().ok().filter(|m| m.is_finite() && *m >= 0.0),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    /// Minutes past midnight.
    At(u32),
    ToBeAnnounced,
}

const TIME_ZONES: &[&str] = &[
    "et", "ct", "mt", "pt", "est", "edt", "cst", "cdt", "mst", "mdt", "pst", "pdt", "local",
];

/// Start time: `7 PM`, `7:00 p.m.`, `19:00`, `7:00 PM ET`, `TBA`.
pub fn time_of_day(raw: &str) -> Option<TimeOfDay> {
    let s: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != '.')
        .collect();
    if s.contains("tba") || s.contains("tbd") {
        return Some(TimeOfDay::ToBeAnnounced);
    }
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    while tokens.last().is_some_and(|t| TIME_ZONES.contains(t)) {
        tokens.pop();
    }
    let compact = tokens.concat();

    let pm = compact.strip_suffix("pm").or_else(|| compact.strip_suffix('p'));
    let am = compact.strip_suffix("am").or_else(|| compact.strip_suffix('a'));
    let (clock, meridiem) = if let Some(c) = pm {
        (c, Some(true))
    } else if let Some(c) = am {
        (c, Some(false))
    } else {
        (compact.as_str(), None)
    };

    let (hour, minute) = match clock.split_once(':') {
        Some((h, m)) => (h.parse::<u32>().ok()?, m.parse::<u32>().ok()?),
        None => (clock.parse::<u32>().ok()?, 0),
    };
    if minute >= 60 {
        return None;
    }
    let hour = match meridiem {
        Some(pm) => {
            if hour == 0 || hour > 12 {
                return None;
            }
            match (hour, pm) {
                (12, false) => 0,
                (12, true) => 12,
                (h, true) => h + 12,
                (h, false) => h,
            }
        }
        None if hour < 24 => hour,
        None => return None,
    };
    Some(TimeOfDay::At(hour * 60 + minute))
}

// ---------------------------------------------------------------------------
// Schedule location
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Home,
    Away,
    Neutral,
}

pub fn normalize_location(raw: &str) -> Option<Location> {
    let s: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != '.')
        .collect();
    match s.as_str() {
        "h" | "home" | "vs" | "v" => Some(Location::Home),
        "a" | "away" | "at" | "@" => Some(Location::Away),
        "n" | "neutral" | "neutral site" => Some(Location::Neutral),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Numbers
// ---------------------------------------------------------------------------

/// Lenient float parse: trims, drops thousands separators and a trailing `%`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim().trim_end_matches('%').replace(',', "");
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn suffixes_are_stripped() {
        assert_eq!(normalize_name("John Doe III"), "John Doe");
        assert_eq!(normalize_name("John Doe, Jr."), "John Doe");
        assert_eq!(normalize_name("john  doe sr"), "john doe");
        assert_eq!(normalize_name("Jr."), "Jr.");
        // Leading nicknames are not suffixes.
        assert_eq!(normalize_name("Jr. Smith"), "Jr. Smith");
    }

    #[test]
    fn name_keys_fold_case_quotes_and_order() {
        assert_eq!(name_key("John Doe III"), name_key("john doe"));
        assert_eq!(name_key("D\u{2019}Angelo Russell"), name_key("D'Angelo Russell"));
        assert_eq!(name_key("Doe, John"), "john doe");
        assert_eq!(name_key("Doe, John, Jr."), "john doe");
    }

    #[test]
    fn nfc_composes_diacritics() {
        let decomposed = "Jose\u{0301} Ramirez";
        assert_eq!(name_key(decomposed), name_key("Jos\u{00E9} Ramirez"));
    }

    #[test]
    fn team_keys() {
        assert_eq!(team_key("vs. #5 Duke"), "duke");
        assert_eq!(team_key("at No. 12 St. John's"), "st johns");
        assert_eq!(team_key("@Virginia Tech"), "virginia tech");
        assert_eq!(team_key("St Johns"), "st johns");
        assert_eq!(team_key("Army"), "army");
    }

    #[test]
    fn heights() {
        assert_eq!(normalize_height("74"), Some(74));
        assert_eq!(normalize_height("6'2\""), Some(74));
        assert_eq!(normalize_height("6\u{2032} 2\u{2033}"), Some(74));
        assert_eq!(normalize_height("6-2"), Some(74));
        assert_eq!(normalize_height("6 ft 2 in"), Some(74));
        assert_eq!(normalize_height("6'"), Some(72));
        assert_eq!(normalize_height("188 cm"), Some(74));
        assert_eq!(normalize_height("6-13"), None);
        assert_eq!(normalize_height("tall"), None);
        assert_eq!(normalize_height(""), None);
    }

    #[test]
    fn weights() {
        assert_eq!(normalize_weight("185"), Some(185));
        assert_eq!(normalize_weight("185 lbs."), Some(185));
        assert_eq!(normalize_weight("84 kg"), Some(185));
        assert_eq!(normalize_weight("--"), None);
    }

    #[test]
    fn class_years() {
        assert_eq!(normalize_class_year("Fr."), Some("fr".into()));
        assert_eq!(normalize_class_year("Freshman"), Some("fr".into()));
        assert_eq!(normalize_class_year("R-So."), Some("r-so".into()));
        assert_eq!(normalize_class_year("Redshirt Junior"), Some("r-jr".into()));
        assert_eq!(normalize_class_year("Gr."), Some("gr".into()));
        assert_eq!(normalize_class_year("n/a"), None);
    }

    #[test]
    fn clocks() {
        assert_eq!(clock_minutes("32"), Some(32.0));
        assert_eq!(clock_minutes("32:30"), Some(32.5));
        assert_eq!(clock_minutes("32:75"), None);
        assert_eq!(clock_minutes("DNP"), None);
    }

    #[test]
    fn times() {
        assert_eq!(time_of_day("7 PM"), Some(TimeOfDay::At(19 * 60)));
        assert_eq!(time_of_day("7:00 p.m. ET"), Some(TimeOfDay::At(19 * 60)));
        assert_eq!(time_of_day("19:00"), Some(TimeOfDay::At(19 * 60)));
        assert_eq!(time_of_day("12:05 AM"), Some(TimeOfDay::At(5)));
        assert_eq!(time_of_day("TBA"), Some(TimeOfDay::ToBeAnnounced));
        assert_eq!(time_of_day("noonish"), None);
    }

    #[test]
    fn locations() {
        assert_eq!(normalize_location("vs."), Some(Location::Home));
        assert_eq!(normalize_location("@"), Some(Location::Away));
        assert_eq!(normalize_location("N"), Some(Location::Neutral));
        assert_eq!(normalize_location("?"), None);
    }

    proptest! {
        #[test]
        fn name_key_is_idempotent(s in "[A-Za-z ,.'-]{0,24}") {
            let once = name_key(&s);
            prop_assert_eq!(name_key(&once), once);
        }

        #[test]
        fn integer_heights_pass_through(inches in 1u32..120) {
            prop_assert_eq!(normalize_height(&inches.to_string()), Some(inches));
        }
    }
}
