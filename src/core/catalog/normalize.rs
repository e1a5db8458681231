//! Heuristics that turn free-form Archive.org metadata into catalog keys.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

use crate::core::data::models::SourceType;

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").unwrap());
static US_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").unwrap());
static SHORT_US_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2})$").unwrap());

pub const UNKNOWN_VENUE: &str = "unknown-venue";

const US_STATES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
    "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VT", "VA", "WA", "WV", "WI", "WY",
];

const CA_PROVINCES: &[&str] = &["AB", "BC", "MB", "NB", "NL", "NS", "ON", "PE", "QC", "SK"];

/// `st` is "street" after a house number or ordinal ("14th st") or at the
/// end of a name ("main st"); anywhere else it is "saint".
fn expand_st(prev: Option<&str>, next: Option<&str>) -> &'static str {
    let after_number = prev.is_some_and(|p| p.starts_with(|c: char| c.is_ascii_digit()));
    if after_number || (prev.is_some() && next.is_none()) {
        "street"
    } else {
        "saint"
    }
}

fn expand_token<'a>(token: &'a str, prev: Option<&str>, next: Option<&str>) -> &'a str {
    match token {
        "aud" | "audit" | "auditorium" => "auditorium",
        "ctr" | "cntr" | "cent" | "centre" | "center" => "center",
        "theatre" | "thtr" | "theater" => "theater",
        "amphitheatre" | "amph" | "amphitheater" => "amphitheater",
        "univ" | "university" => "university",
        "coll" | "college" => "college",
        "mem" | "meml" | "memorial" => "memorial",
        "intl" | "int'l" | "international" => "international",
        "colisseum" | "colosseum" | "coliseum" => "coliseum",
        "pav" | "pavillion" | "pavilion" => "pavilion",
        "fairgrnds" | "fgrounds" | "fairgrounds" => "fairgrounds",
        "mt" => "mount",
        "st" => expand_st(prev, next),
        "hs" => "high school",
        other => other,
    }
}

/// Canonical key for a venue name.
///
/// Folds case, diacritics, punctuation and common abbreviations. Distinct
/// words are never dropped, so "Winterland" and "Winterland Arena" remain
/// different keys.
pub fn normalize_venue(name: &str) -> String {
    let lowered = secular::lower_lay_string(name);
    let cleaned: String = lowered
        .replace('&', " and ")
        .chars()
        .filter(|c| !matches!(c, '\'' | '"' | '`' | '\u{2019}'))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    if tokens.len() > 1 && tokens[0] == "the" {
        tokens.remove(0);
    }

    let expanded: Vec<&str> = tokens
        .iter()
        .enumerate()
        .map(|(i, token)| {
            let prev = i.checked_sub(1).map(|p| tokens[p]);
            expand_token(token, prev, tokens.get(i + 1).copied())
        })
        .collect();

    collapse::collapse(&expanded.join(" "))
}

pub fn venue_slug(name: &str) -> String {
    let normalized = normalize_venue(name);
    if normalized.is_empty() {
        UNKNOWN_VENUE.to_string()
    } else {
        normalized.replace(' ', "-")
    }
}

pub fn show_id(date: &str, venue: &str) -> String {
    format!("{}-{}", date, venue_slug(venue))
}

/// Normalize the date formats seen on Archive.org to `YYYY-MM-DD`.
pub fn normalize_date(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Drop "T00:00:00Z" or " 00:00:00" time components
    let date_part = trimmed
        .split(|c: char| c == 'T' || c.is_whitespace())
        .next()
        .unwrap_or(trimmed);

    let (year, month, day) = if let Some(caps) = ISO_DATE.captures(date_part) {
        (caps[1].parse::<i32>().ok()?, caps[2].parse::<u32>().ok()?, caps[3].parse::<u32>().ok()?)
    } else if let Some(caps) = US_DATE.captures(date_part) {
        (caps[3].parse::<i32>().ok()?, caps[1].parse::<u32>().ok()?, caps[2].parse::<u32>().ok()?)
    } else if let Some(caps) = SHORT_US_DATE.captures(date_part) {
        (
            1900 + caps[3].parse::<i32>().ok()?,
            caps[1].parse::<u32>().ok()?,
            caps[2].parse::<u32>().ok()?,
        )
    } else {
        warn!("Unrecognized date format: {}", raw);
        return None;
    };

    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(date) => Some(date.format("%Y-%m-%d").to_string()),
        None => {
            warn!("Invalid calendar date: {}", raw);
            None
        }
    }
}

/// Year of a normalized `YYYY-MM-DD` date.
pub fn year_of(date: &str) -> Option<i32> {
    date.get(0..4)?.parse().ok()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Location {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

/// Split an Archive.org `coverage` string such as "Ithaca, NY".
pub fn parse_location(coverage: &str) -> Location {
    let parts: Vec<&str> = coverage
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let owned = |s: &str| Some(s.to_string());

    match parts.as_slice() {
        [] => Location::default(),
        [city] => Location { city: owned(city), ..Default::default() },
        [city, region] => {
            let code = region.to_ascii_uppercase();
            if US_STATES.contains(&code.as_str()) {
                Location { city: owned(city), state: Some(code), country: owned("USA") }
            } else if CA_PROVINCES.contains(&code.as_str()) {
                Location { city: owned(city), state: Some(code), country: owned("Canada") }
            } else {
                Location { city: owned(city), state: None, country: owned(region) }
            }
        }
        [city, state, country, ..] => Location {
            city: owned(city),
            state: Some(state.to_ascii_uppercase()),
            country: owned(country),
        },
    }
}

impl SourceType {
    /// Classify a recording from its identifier, title and description.
    ///
    /// Matching is done on whole tokens so that e.g. "sbeok" or "FMV"
    /// do not count as SBD or FM.
    pub fn detect(identifier: &str, title: &str, description: &str) -> SourceType {
        let text = format!("{} {} {}", identifier, title, description).to_ascii_uppercase();
        let tokens: Vec<&str> = text
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        let has = |names: &[&str]| tokens.iter().any(|t| names.contains(t));

        if has(&["SBD", "SOUNDBOARD"]) {
            SourceType::Sbd
        } else if has(&["MATRIX", "MTX"]) {
            SourceType::Matrix
        } else if has(&["AUD", "AUDIENCE"]) {
            SourceType::Aud
        } else if has(&["FM", "BROADCAST", "PREFM"]) {
            SourceType::Fm
        } else if has(&["REMASTER", "REMASTERED"]) {
            SourceType::Remaster
        } else {
            SourceType::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_variants_merge() {
        let key = normalize_venue("Barton Hall, Cornell Univ.");
        assert_eq!(key, "barton hall cornell university");
        assert_eq!(normalize_venue("BARTON HALL - CORNELL UNIVERSITY"), key);

        assert_eq!(normalize_venue("The Fillmore East"), normalize_venue("Fillmore East"));
        assert_eq!(
            normalize_venue("Nassau Veterans Mem. Coliseum"),
            normalize_venue("Nassau Veterans Memorial Colisseum")
        );
        assert_eq!(normalize_venue("Radio City Music Hall & Theatre"), "radio city music hall and theater");
        assert_eq!(normalize_venue("Théâtre de l'Olympia"), normalize_venue("Theatre de lOlympia"));
        assert_eq!(normalize_venue("St. Paul Civic Ctr"), "saint paul civic center");
        assert_eq!(normalize_venue("Kiel Auditorium, St. Louis"), "kiel auditorium saint louis");
        assert_eq!(normalize_venue("st louis"), "saint louis");
        assert_eq!(normalize_venue("14th St. Armory"), "14th street armory");
        assert_eq!(normalize_venue("Harpur College, Vestal St"), "harpur college vestal street");
    }

    #[test]
    fn test_distinct_venues_stay_distinct() {
        assert_ne!(normalize_venue("Winterland Arena"), normalize_venue("Winterland"));
        assert_ne!(normalize_venue("Fillmore East"), normalize_venue("Fillmore West"));
        assert_eq!(normalize_venue("The"), "the");
    }

    #[test]
    fn test_venue_slug() {
        assert_eq!(venue_slug("Winterland Arena"), "winterland-arena");
        assert_eq!(venue_slug(""), UNKNOWN_VENUE);
        assert_eq!(venue_slug("  ?! "), UNKNOWN_VENUE);
        assert_eq!(show_id("1977-05-08", "Barton Hall"), "1977-05-08-barton-hall");
    }

    #[test]
    fn test_normalize_date_formats() {
        assert_eq!(normalize_date("1977-05-08").as_deref(), Some("1977-05-08"));
        assert_eq!(normalize_date("1977-5-8").as_deref(), Some("1977-05-08"));
        assert_eq!(normalize_date("1977-05-08T00:00:00Z").as_deref(), Some("1977-05-08"));
        assert_eq!(normalize_date("1977-05-08 00:00:00").as_deref(), Some("1977-05-08"));
        assert_eq!(normalize_date("05/08/1977").as_deref(), Some("1977-05-08"));
        assert_eq!(normalize_date("5/8/77").as_deref(), Some("1977-05-08"));
    }

    #[test]
    fn test_normalize_date_rejects_garbage() {
        assert!(normalize_date("").is_none());
        assert!(normalize_date("May 8th, 1977").is_none());
        assert!(normalize_date("1977-02-30").is_none());
        assert!(normalize_date("1977-13-01").is_none());
        assert_eq!(year_of("1977-05-08"), Some(1977));
    }

    #[test]
    fn test_parse_location() {
        let loc = parse_location("Ithaca, NY");
        assert_eq!(loc.city.as_deref(), Some("Ithaca"));
        assert_eq!(loc.state.as_deref(), Some("NY"));
        assert_eq!(loc.country.as_deref(), Some("USA"));

        let loc = parse_location("London, England");
        assert_eq!(loc.state, None);
        assert_eq!(loc.country.as_deref(), Some("England"));

        let loc = parse_location("Toronto, ON");
        assert_eq!(loc.country.as_deref(), Some("Canada"));

        assert_eq!(parse_location("  "), Location::default());
        assert_eq!(parse_location("Paris").city.as_deref(), Some("Paris"));
    }

    #[test]
    fn test_source_detection() {
        assert_eq!(
            SourceType::detect("gd77-05-08.sbd.hicks.4982.sbeok.shnf", "", ""),
            SourceType::Sbd
        );
        assert_eq!(
            SourceType::detect("gd1977-05-08.aud.vernon.32515.flac16", "", ""),
            SourceType::Aud
        );
        assert_eq!(
            SourceType::detect("gd1977-05-08d1t01.matrix.flac16", "", ""),
            SourceType::Matrix
        );
        // SBD wins over AUD when both appear
        assert_eq!(
            SourceType::detect("gd72-08-27.sbd-aud.matrix", "", "Audience/Soundboard"),
            SourceType::Sbd
        );
        assert_eq!(SourceType::detect("gd73-06-10.fm.xyz", "", ""), SourceType::Fm);
        assert_eq!(
            SourceType::detect("gd89-07-04.unknown", "", "Remastered by John"),
            SourceType::Remaster
        );
        assert_eq!(SourceType::detect("gd70-02-13.shnf", "Fillmore", ""), SourceType::Unknown);
    }
}
