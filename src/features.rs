//! Match feature extraction.
//!
//! Turns two raw player payloads plus the match context into the fixed,
//! ordered feature vector every scorer and classifier consumes. Extraction is
//! pure: the only input besides the payloads is the reference date used for
//! ages and experience.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::snapshot::PlayerSnapshot;

/// Bumped whenever [`FEATURE_NAMES`] changes order or membership. Persisted
/// classifiers carry the version they were trained against.
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

pub const FEATURE_COUNT: usize = 27;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    // ranking
    "p1_ranking",
    "p2_ranking",
    "ranking_diff",
    "ranking_ratio",
    "p1_is_higher_ranked",
    // age & experience
    "p1_age",
    "p2_age",
    "age_diff",
    "p1_experience_years",
    "p2_experience_years",
    "experience_diff",
    // prize money
    "p1_prize_log",
    "p2_prize_log",
    "prize_diff_log",
    // physical
    "p1_height",
    "p2_height",
    "height_diff",
    "p1_weight",
    "p2_weight",
    // head-to-head
    "h2h_total_matches",
    "h2h_p1_wins",
    "h2h_p2_wins",
    "h2h_p1_win_rate",
    // surface
    "surface_hard",
    "surface_clay",
    "surface_grass",
    // tournament
    "is_grand_slam",
];

const DEFAULT_AGE: i32 = 25;

const GRAND_SLAM_NAMES: [&str; 5] = [
    "australian open",
    "french open",
    "wimbledon",
    "us open",
    "roland garros",
];

const NEUTRAL_H2H: [(&str, f64); 4] = [
    ("h2h_total_matches", 0.0),
    ("h2h_p1_wins", 0.0),
    ("h2h_p2_wins", 0.0),
    ("h2h_p1_win_rate", 0.5),
];

pub fn feature_names() -> &'static [&'static str] {
    &FEATURE_NAMES
}

fn feature_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|n| *n == name)
}

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("malformed player payload: {0}")]
    Malformed(String),
    #[error("unknown feature `{0}`")]
    UnknownFeature(String),
    #[error("feature `{0}` was never set")]
    MissingFeature(&'static str),
}

/// Named feature values, always holding exactly [`FEATURE_NAMES`] in
/// canonical order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMap {
    values: [f64; FEATURE_COUNT],
}

impl FeatureMap {
    /// Builds a map from `(name, value)` pairs. Every canonical name must be
    /// present and no other name is allowed.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, FeatureError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut values = [0.0; FEATURE_COUNT];
        let mut seen = [false; FEATURE_COUNT];
        for (name, value) in pairs {
            let idx = feature_index(name)
                .ok_or_else(|| FeatureError::UnknownFeature(name.to_string()))?;
            values[idx] = value;
            seen[idx] = true;
        }
        if let Some(idx) = seen.iter().position(|s| !s) {
            return Err(FeatureError::MissingFeature(FEATURE_NAMES[idx]));
        }
        Ok(Self { values })
    }

    /// Rebuilds a map from a vector laid out in canonical order.
    pub fn from_vector(vector: &[f64]) -> Option<Self> {
        let values: [f64; FEATURE_COUNT] = vector.try_into().ok()?;
        Some(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        feature_index(name).map(|idx| self.values[idx])
    }

    pub fn set(&mut self, name: &str, value: f64) -> Result<(), FeatureError> {
        let idx =
            feature_index(name).ok_or_else(|| FeatureError::UnknownFeature(name.to_string()))?;
        self.values[idx] = value;
        Ok(())
    }

    pub fn len(&self) -> usize {
        FEATURE_COUNT
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }

    pub fn to_hash_map(&self) -> HashMap<String, f64> {
        self.iter().map(|(k, v)| (k.to_string(), v)).collect()
    }
}

impl Serialize for FeatureMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FEATURE_COUNT))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

/// Surface and tournament text as given by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchContext {
    pub surface: String,
    pub tournament: String,
}

impl Default for MatchContext {
    fn default() -> Self {
        Self {
            surface: "hard".to_string(),
            tournament: String::new(),
        }
    }
}

/// Everything needed to score one match.
#[derive(Debug, Clone)]
pub struct MatchInput {
    pub player1: Value,
    pub player2: Value,
    pub head_to_head: Option<Value>,
    pub context: MatchContext,
}

impl MatchInput {
    pub fn new(player1: Value, player2: Value) -> Self {
        Self {
            player1,
            player2,
            head_to_head: None,
            context: MatchContext::default(),
        }
    }

    pub fn surface(mut self, surface: impl Into<String>) -> Self {
        self.context.surface = surface.into();
        self
    }

    pub fn tournament(mut self, tournament: impl Into<String>) -> Self {
        self.context.tournament = tournament.into();
        self
    }

    pub fn head_to_head(mut self, h2h: Option<Value>) -> Self {
        self.head_to_head = h2h;
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor {
    reference_date: Option<NaiveDate>,
}

impl FeatureExtractor {
    /// Extractor that computes ages and experience against today's UTC date.
    pub fn new() -> Self {
        Self::default()
    }

    /// Extractor pinned to a fixed "today".
    pub fn with_reference_date(date: NaiveDate) -> Self {
        Self {
            reference_date: Some(date),
        }
    }

    pub fn feature_names(&self) -> &'static [&'static str] {
        feature_names()
    }

    pub fn extract(&self, input: &MatchInput) -> Result<FeatureMap, FeatureError> {
        let p1 = PlayerSnapshot::from_payload(&input.player1)?;
        let p2 = PlayerSnapshot::from_payload(&input.player2)?;
        let today = self.today();

        let mut pairs: Vec<(&str, f64)> = Vec::with_capacity(FEATURE_COUNT);
        pairs.extend(ranking_block(&p1, &p2));
        pairs.extend(age_block(&p1, &p2, today));
        pairs.extend(prize_block(&p1, &p2));
        pairs.extend(physical_block(&p1, &p2));
        match input.head_to_head.as_ref() {
            Some(record) if !is_empty_record(record) => pairs.extend(h2h_block(record)),
            _ => pairs.extend(NEUTRAL_H2H),
        }
        pairs.extend(surface_block(&input.context.surface));
        pairs.push(("is_grand_slam", grand_slam_flag(&input.context.tournament)));

        FeatureMap::from_pairs(pairs)
    }

    fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Utc::now().date_naive())
    }
}

fn ranking_block(p1: &PlayerSnapshot, p2: &PlayerSnapshot) -> [(&'static str, f64); 5] {
    let ratio = if p2.ranking > 0.0 {
        p1.ranking / p2.ranking
    } else {
        1.0
    };
    [
        ("p1_ranking", p1.ranking),
        ("p2_ranking", p2.ranking),
        ("ranking_diff", p1.ranking - p2.ranking),
        ("ranking_ratio", ratio),
        (
            "p1_is_higher_ranked",
            if p1.ranking < p2.ranking { 1.0 } else { 0.0 },
        ),
    ]
}

fn age_block(
    p1: &PlayerSnapshot,
    p2: &PlayerSnapshot,
    today: NaiveDate,
) -> [(&'static str, f64); 6] {
    let p1_age = i64::from(age_on(p1.birth_timestamp, today));
    let p2_age = i64::from(age_on(p2.birth_timestamp, today));
    // Wide enough for any i32 year the payload carries.
    let year = i64::from(today.year());
    let p1_exp = year - p1.turned_pro.map_or(year, i64::from);
    let p2_exp = year - p2.turned_pro.map_or(year, i64::from);
    [
        ("p1_age", p1_age as f64),
        ("p2_age", p2_age as f64),
        ("age_diff", (p1_age - p2_age) as f64),
        ("p1_experience_years", p1_exp as f64),
        ("p2_experience_years", p2_exp as f64),
        ("experience_diff", (p1_exp - p2_exp) as f64),
    ]
}

fn prize_block(p1: &PlayerSnapshot, p2: &PlayerSnapshot) -> [(&'static str, f64); 3] {
    let p1_log = p1.prize_total.max(0.0).ln_1p();
    let p2_log = p2.prize_total.max(0.0).ln_1p();
    [
        ("p1_prize_log", p1_log),
        ("p2_prize_log", p2_log),
        ("prize_diff_log", p1_log - p2_log),
    ]
}

fn physical_block(p1: &PlayerSnapshot, p2: &PlayerSnapshot) -> [(&'static str, f64); 5] {
    [
        ("p1_height", p1.height),
        ("p2_height", p2.height),
        ("height_diff", p1.height - p2.height),
        ("p1_weight", p1.weight),
        ("p2_weight", p2.weight),
    ]
}

// Known gap: the head-to-head payload is accepted but not parsed yet, so a
// supplied record scores exactly like a missing one.
fn h2h_block(_record: &Value) -> [(&'static str, f64); 4] {
    NEUTRAL_H2H
}

fn is_empty_record(record: &Value) -> bool {
    match record {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

// Substring match, so "clay/hard" sets two flags and "carpet" sets none.
fn surface_block(surface: &str) -> [(&'static str, f64); 3] {
    let s = surface.to_lowercase();
    [
        ("surface_hard", flag(s.contains("hard"))),
        ("surface_clay", flag(s.contains("clay"))),
        ("surface_grass", flag(s.contains("grass"))),
    ]
}

fn grand_slam_flag(tournament: &str) -> f64 {
    let t = tournament.to_lowercase();
    flag(GRAND_SLAM_NAMES.iter().any(|gs| t.contains(gs)))
}

/// Whole years between the birth timestamp (epoch seconds, UTC) and `today`.
/// A zero or unrepresentable timestamp yields the default age of 25.
pub fn age_on(birth_timestamp: i64, today: NaiveDate) -> i32 {
    if birth_timestamp == 0 {
        return DEFAULT_AGE;
    }
    let Some(birth) = DateTime::from_timestamp(birth_timestamp, 0) else {
        return DEFAULT_AGE;
    };
    let birth = birth.date_naive();
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

fn flag(v: bool) -> f64 {
    if v { 1.0 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn age_counts_birthday_this_year() {
        // 2003-05-05T00:00:00Z
        let ts = 1_052_092_800;
        assert_eq!(age_on(ts, date(2026, 5, 4)), 22);
        assert_eq!(age_on(ts, date(2026, 5, 5)), 23);
        assert_eq!(age_on(0, date(2026, 5, 5)), 25);
    }

    #[test]
    fn surface_matching_is_substring_based() {
        assert_eq!(surface_block("Clay"), [
            ("surface_hard", 0.0),
            ("surface_clay", 1.0),
            ("surface_grass", 0.0),
        ]);
        let both = surface_block("clay / hard");
        assert_eq!(both[0].1, 1.0);
        assert_eq!(both[1].1, 1.0);
        assert!(surface_block("carpet").iter().all(|(_, v)| *v == 0.0));
    }

    #[test]
    fn grand_slam_list_is_case_insensitive() {
        assert_eq!(grand_slam_flag("ROLAND GARROS 2026"), 1.0);
        assert_eq!(grand_slam_flag("Wimbledon"), 1.0);
        assert_eq!(grand_slam_flag("Indian Wells"), 0.0);
    }

    #[test]
    fn from_pairs_rejects_unknown_and_missing_names() {
        let pairs = FEATURE_NAMES.iter().map(|n| (*n, 1.0));
        assert!(FeatureMap::from_pairs(pairs).is_ok());

        let short = FEATURE_NAMES.iter().skip(1).map(|n| (*n, 1.0));
        assert!(matches!(
            FeatureMap::from_pairs(short),
            Err(FeatureError::MissingFeature("p1_ranking"))
        ));

        let extra = FEATURE_NAMES
            .iter()
            .map(|n| (*n, 1.0))
            .chain(std::iter::once(("bogus", 2.0)));
        assert!(matches!(
            FeatureMap::from_pairs(extra),
            Err(FeatureError::UnknownFeature(_))
        ));
    }

    #[test]
    fn serialized_map_keeps_canonical_order() {
        let map = FeatureMap::from_vector(&[0.0; FEATURE_COUNT]).unwrap();
        let json = serde_json::to_string(&map).unwrap();
        let first = json.find("p1_ranking").unwrap();
        let last = json.find("is_grand_slam").unwrap();
        assert!(first < last);
    }
}
