use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competitor {
    pub name: String,
    pub sport: String,
    /// Ranking, age, seed, country and whatever else the caller wants kept.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Competitor {
    pub fn new(name: impl Into<String>, sport: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sport: sport.into(),
            metadata: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub sport: String,
    pub event_name: String,
    pub event_date: DateTime<Utc>,
    pub competitor1: Competitor,
    pub competitor2: Competitor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub id: Option<i64>,
    pub fixture: Match,
    pub predicted_winner: Competitor,
    pub confidence: f64,
    pub probability_c1: f64,
    pub probability_c2: f64,
    pub reasoning: String,
    pub factor_scores: HashMap<String, f64>,
    pub created_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Ground truth for a stored prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub id: Option<i64>,
    pub prediction_id: i64,
    pub actual_winner: String,
    pub score: String,
    pub fetched_from: String,
    pub fetched_at: DateTime<Utc>,
    pub is_correct: bool,
    pub notes: Option<String>,
}

impl MatchResult {
    /// Builds a result for `prediction`, deriving `is_correct` from the
    /// predicted winner's name.
    pub fn for_prediction(
        prediction: &Prediction,
        prediction_id: i64,
        actual_winner: impl Into<String>,
        score: impl Into<String>,
        fetched_from: impl Into<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let actual_winner = actual_winner.into();
        let is_correct = actual_winner
            .trim()
            .eq_ignore_ascii_case(prediction.predicted_winner.name.trim());
        Self {
            id: None,
            prediction_id,
            actual_winner,
            score: score.into(),
            fetched_from: fetched_from.into(),
            fetched_at,
            is_correct,
            notes: None,
        }
    }
}

/// A raw API payload kept for reuse until `expires_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct SportsData {
    pub id: Option<i64>,
    pub sport: String,
    pub data_type: String,
    pub entity_id: String,
    pub data: Value,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SportsData {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }
}
