//! SQLite persistence for predictions, results and cached API payloads.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;

use crate::models::{Competitor, Match, MatchResult, Prediction, SportsData};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create db dir {}", parent.display()))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        let db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        let db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    pub fn initialize_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS predictions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sport TEXT NOT NULL,
                event_name TEXT NOT NULL,
                event_date TEXT NOT NULL,
                competitor1 TEXT NOT NULL,
                competitor2 TEXT NOT NULL,
                predicted_winner TEXT NOT NULL,
                confidence REAL NOT NULL,
                probability_c1 REAL,
                probability_c2 REAL,
                reasoning TEXT,
                factor_scores TEXT,
                created_at TEXT NOT NULL,
                notes TEXT
            );

            CREATE TABLE IF NOT EXISTS results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                prediction_id INTEGER NOT NULL,
                actual_winner TEXT NOT NULL,
                score TEXT,
                fetched_from TEXT,
                fetched_at TEXT NOT NULL,
                is_correct INTEGER,
                notes TEXT,
                FOREIGN KEY (prediction_id) REFERENCES predictions (id)
            );

            CREATE TABLE IF NOT EXISTS sports_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sport TEXT NOT NULL,
                data_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                data TEXT NOT NULL,
                source TEXT,
                fetched_at TEXT NOT NULL,
                expires_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_sports_data_key
                ON sports_data (sport, data_type, entity_id);
            CREATE INDEX IF NOT EXISTS idx_results_prediction
                ON results (prediction_id);
            "#,
            )
            .context("initialize schema")
    }

    // Predictions

    pub fn save_prediction(&self, p: &Prediction) -> Result<i64> {
        self.conn
            .execute(
                r#"
                INSERT INTO predictions (
                    sport, event_name, event_date, competitor1, competitor2,
                    predicted_winner, confidence, probability_c1, probability_c2,
                    reasoning, factor_scores, created_at, notes
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#,
                params![
                    p.fixture.sport,
                    p.fixture.event_name,
                    p.fixture.event_date.to_rfc3339(),
                    competitor_json(&p.fixture.competitor1)?,
                    competitor_json(&p.fixture.competitor2)?,
                    competitor_json(&p.predicted_winner)?,
                    p.confidence,
                    p.probability_c1,
                    p.probability_c2,
                    p.reasoning,
                    serde_json::to_string(&p.factor_scores).context("serialize factor scores")?,
                    p.created_at.to_rfc3339(),
                    p.notes,
                ],
            )
            .context("insert prediction")?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_prediction(&self, id: i64) -> Result<Option<Prediction>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {PREDICTION_COLUMNS} FROM predictions WHERE id = ?1"),
                params![id],
                PredictionRow::from_row,
            )
            .optional()
            .context("query prediction")?;
        raw.map(PredictionRow::into_prediction).transpose()
    }

    /// Replaces every column of the stored row. False when `p.id` is unset or
    /// no row has that id.
    pub fn update_prediction(&self, p: &Prediction) -> Result<bool> {
        let Some(id) = p.id else {
            return Ok(false);
        };
        let changed = self
            .conn
            .execute(
                r#"
                UPDATE predictions SET
                    sport = ?1, event_name = ?2, event_date = ?3, competitor1 = ?4,
                    competitor2 = ?5, predicted_winner = ?6, confidence = ?7,
                    probability_c1 = ?8, probability_c2 = ?9, reasoning = ?10,
                    factor_scores = ?11, created_at = ?12, notes = ?13
                WHERE id = ?14
                "#,
                params![
                    p.fixture.sport,
                    p.fixture.event_name,
                    p.fixture.event_date.to_rfc3339(),
                    competitor_json(&p.fixture.competitor1)?,
                    competitor_json(&p.fixture.competitor2)?,
                    competitor_json(&p.predicted_winner)?,
                    p.confidence,
                    p.probability_c1,
                    p.probability_c2,
                    p.reasoning,
                    serde_json::to_string(&p.factor_scores).context("serialize factor scores")?,
                    p.created_at.to_rfc3339(),
                    p.notes,
                    id,
                ],
            )
            .context("update prediction")?;
        Ok(changed > 0)
    }

    pub fn delete_prediction(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM predictions WHERE id = ?1", params![id])
            .context("delete prediction")?;
        Ok(changed > 0)
    }

    // Results

    pub fn save_result(&self, r: &MatchResult) -> Result<i64> {
        self.conn
            .execute(
                r#"
                INSERT INTO results (
                    prediction_id, actual_winner, score, fetched_from,
                    fetched_at, is_correct, notes
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    r.prediction_id,
                    r.actual_winner,
                    r.score,
                    r.fetched_from,
                    r.fetched_at.to_rfc3339(),
                    r.is_correct,
                    r.notes,
                ],
            )
            .context("insert result")?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_result(&self, id: i64) -> Result<Option<MatchResult>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {RESULT_COLUMNS} FROM results WHERE id = ?1"),
                params![id],
                ResultRow::from_row,
            )
            .optional()
            .context("query result")?;
        raw.map(ResultRow::into_result).transpose()
    }

    pub fn update_result(&self, r: &MatchResult) -> Result<bool> {
        let Some(id) = r.id else {
            return Ok(false);
        };
        let changed = self
            .conn
            .execute(
                r#"
                UPDATE results SET
                    prediction_id = ?1, actual_winner = ?2, score = ?3, fetched_from = ?4,
                    fetched_at = ?5, is_correct = ?6, notes = ?7
                WHERE id = ?8
                "#,
                params![
                    r.prediction_id,
                    r.actual_winner,
                    r.score,
                    r.fetched_from,
                    r.fetched_at.to_rfc3339(),
                    r.is_correct,
                    r.notes,
                    id,
                ],
            )
            .context("update result")?;
        Ok(changed > 0)
    }

    pub fn delete_result(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM results WHERE id = ?1", params![id])
            .context("delete result")?;
        Ok(changed > 0)
    }

    // Sports data

    pub fn save_sports_data(&self, d: &SportsData) -> Result<i64> {
        self.conn
            .execute(
                r#"
                INSERT INTO sports_data (
                    sport, data_type, entity_id, data, source, fetched_at, expires_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    d.sport,
                    d.data_type,
                    d.entity_id,
                    serde_json::to_string(&d.data).context("serialize payload")?,
                    d.source,
                    d.fetched_at.to_rfc3339(),
                    d.expires_at.map(|t| t.to_rfc3339()),
                ],
            )
            .context("insert sports data")?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_sports_data(&self, id: i64) -> Result<Option<SportsData>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {SPORTS_DATA_COLUMNS} FROM sports_data WHERE id = ?1"),
                params![id],
                SportsDataRow::from_row,
            )
            .optional()
            .context("query sports data")?;
        raw.map(SportsDataRow::into_sports_data).transpose()
    }

    pub fn update_sports_data(&self, d: &SportsData) -> Result<bool> {
        let Some(id) = d.id else {
            return Ok(false);
        };
        let changed = self
            .conn
            .execute(
                r#"
                UPDATE sports_data SET
                    sport = ?1, data_type = ?2, entity_id = ?3, data = ?4, source = ?5,
                    fetched_at = ?6, expires_at = ?7
                WHERE id = ?8
                "#,
                params![
                    d.sport,
                    d.data_type,
                    d.entity_id,
                    serde_json::to_string(&d.data).context("serialize payload")?,
                    d.source,
                    d.fetched_at.to_rfc3339(),
                    d.expires_at.map(|t| t.to_rfc3339()),
                    id,
                ],
            )
            .context("update sports data")?;
        Ok(changed > 0)
    }

    pub fn delete_sports_data(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM sports_data WHERE id = ?1", params![id])
            .context("delete sports data")?;
        Ok(changed > 0)
    }

    /// Newest payload stored for the key, unless it expired before `now`.
    pub fn cached_payload(
        &self,
        sport: &str,
        data_type: &str,
        entity_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SportsData>> {
        let raw = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SPORTS_DATA_COLUMNS} FROM sports_data
                     WHERE sport = ?1 AND data_type = ?2 AND entity_id = ?3
                     ORDER BY fetched_at DESC, id DESC LIMIT 1"
                ),
                params![sport, data_type, entity_id],
                SportsDataRow::from_row,
            )
            .optional()
            .context("query cached payload")?;
        let Some(row) = raw.map(SportsDataRow::into_sports_data).transpose()? else {
            return Ok(None);
        };
        if row.is_expired(now) {
            tracing::debug!(data_type, entity_id, "cache entry expired");
            return Ok(None);
        }
        Ok(Some(row))
    }

    /// Stores `d` as the only row for its (sport, data_type, entity_id) key.
    pub fn store_cached_payload(&mut self, d: &SportsData) -> Result<i64> {
        let tx = self.conn.transaction().context("begin cache write")?;
        tx.execute(
            "DELETE FROM sports_data WHERE sport = ?1 AND data_type = ?2 AND entity_id = ?3",
            params![d.sport, d.data_type, d.entity_id],
        )
        .context("clear cached payload")?;
        tx.execute(
            r#"
            INSERT INTO sports_data (
                sport, data_type, entity_id, data, source, fetched_at, expires_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                d.sport,
                d.data_type,
                d.entity_id,
                serde_json::to_string(&d.data).context("serialize payload")?,
                d.source,
                d.fetched_at.to_rfc3339(),
                d.expires_at.map(|t| t.to_rfc3339()),
            ],
        )
        .context("insert cached payload")?;
        let id = tx.last_insert_rowid();
        tx.commit().context("commit cache write")?;
        Ok(id)
    }

    /// Every prediction paired with its earliest recorded result.
    pub fn scored_predictions(&self) -> Result<Vec<(Prediction, MatchResult)>> {
        let cols = PREDICTION_COLUMNS
            .split(", ")
            .map(|c| format!("p.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let result_cols = RESULT_COLUMNS
            .split(", ")
            .map(|c| format!("r.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {cols}, {result_cols}
             FROM predictions p
             JOIN results r ON r.id = (
                 SELECT MIN(id) FROM results WHERE prediction_id = p.id
             )
             ORDER BY p.id ASC"
        );
        let mut stmt = self.conn.prepare(&sql).context("prepare scored query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    PredictionRow::from_row(row)?,
                    ResultRow::from_row_at(row, PREDICTION_COLUMN_COUNT)?,
                ))
            })
            .context("query scored predictions")?;

        let mut out = Vec::new();
        for row in rows {
            let (p, r) = row.context("decode scored row")?;
            out.push((p.into_prediction()?, r.into_result()?));
        }
        Ok(out)
    }
}

const PREDICTION_COLUMNS: &str = "id, sport, event_name, event_date, competitor1, competitor2, \
     predicted_winner, confidence, probability_c1, probability_c2, reasoning, factor_scores, \
     created_at, notes";
const PREDICTION_COLUMN_COUNT: usize = 14;
const RESULT_COLUMNS: &str =
    "id, prediction_id, actual_winner, score, fetched_from, fetched_at, is_correct, notes";
const SPORTS_DATA_COLUMNS: &str =
    "id, sport, data_type, entity_id, data, source, fetched_at, expires_at";

struct PredictionRow {
    id: i64,
    sport: String,
    event_name: String,
    event_date: String,
    competitor1: String,
    competitor2: String,
    predicted_winner: String,
    confidence: f64,
    probability_c1: Option<f64>,
    probability_c2: Option<f64>,
    reasoning: Option<String>,
    factor_scores: Option<String>,
    created_at: String,
    notes: Option<String>,
}

impl PredictionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sport: row.get(1)?,
            event_name: row.get(2)?,
            event_date: row.get(3)?,
            competitor1: row.get(4)?,
            competitor2: row.get(5)?,
            predicted_winner: row.get(6)?,
            confidence: row.get(7)?,
            probability_c1: row.get(8)?,
            probability_c2: row.get(9)?,
            reasoning: row.get(10)?,
            factor_scores: row.get(11)?,
            created_at: row.get(12)?,
            notes: row.get(13)?,
        })
    }

    fn into_prediction(self) -> Result<Prediction> {
        let factor_scores: HashMap<String, f64> = match self.factor_scores.as_deref() {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw)
                .with_context(|| format!("decode factor scores of prediction {}", self.id))?,
            _ => HashMap::new(),
        };
        Ok(Prediction {
            id: Some(self.id),
            fixture: Match {
                sport: self.sport,
                event_name: self.event_name,
                event_date: parse_time(&self.event_date)?,
                competitor1: parse_competitor(&self.competitor1)?,
                competitor2: parse_competitor(&self.competitor2)?,
            },
            predicted_winner: parse_competitor(&self.predicted_winner)?,
            confidence: self.confidence,
            probability_c1: self.probability_c1.unwrap_or_default(),
            probability_c2: self.probability_c2.unwrap_or_default(),
            reasoning: self.reasoning.unwrap_or_default(),
            factor_scores,
            created_at: parse_time(&self.created_at)?,
            notes: self.notes,
        })
    }
}

struct ResultRow {
    id: i64,
    prediction_id: i64,
    actual_winner: String,
    score: Option<String>,
    fetched_from: Option<String>,
    fetched_at: String,
    is_correct: Option<bool>,
    notes: Option<String>,
}

impl ResultRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Self::from_row_at(row, 0)
    }

    fn from_row_at(row: &Row<'_>, base: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(base)?,
            prediction_id: row.get(base + 1)?,
            actual_winner: row.get(base + 2)?,
            score: row.get(base + 3)?,
            fetched_from: row.get(base + 4)?,
            fetched_at: row.get(base + 5)?,
            is_correct: row.get(base + 6)?,
            notes: row.get(base + 7)?,
        })
    }

    fn into_result(self) -> Result<MatchResult> {
        Ok(MatchResult {
            id: Some(self.id),
            prediction_id: self.prediction_id,
            actual_winner: self.actual_winner,
            score: self.score.unwrap_or_default(),
            fetched_from: self.fetched_from.unwrap_or_default(),
            fetched_at: parse_time(&self.fetched_at)?,
            is_correct: self.is_correct.unwrap_or(false),
            notes: self.notes,
        })
    }
}

struct SportsDataRow {
    id: i64,
    sport: String,
    data_type: String,
    entity_id: String,
    data: String,
    source: Option<String>,
    fetched_at: String,
    expires_at: Option<String>,
}

impl SportsDataRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sport: row.get(1)?,
            data_type: row.get(2)?,
            entity_id: row.get(3)?,
            data: row.get(4)?,
            source: row.get(5)?,
            fetched_at: row.get(6)?,
            expires_at: row.get(7)?,
        })
    }

    fn into_sports_data(self) -> Result<SportsData> {
        let data: Value = serde_json::from_str(&self.data)
            .with_context(|| format!("decode payload of sports_data {}", self.id))?;
        Ok(SportsData {
            id: Some(self.id),
            sport: self.sport,
            data_type: self.data_type,
            entity_id: self.entity_id,
            data,
            source: self.source.unwrap_or_default(),
            fetched_at: parse_time(&self.fetched_at)?,
            expires_at: self.expires_at.as_deref().map(parse_time).transpose()?,
        })
    }
}

fn competitor_json(c: &Competitor) -> Result<String> {
    serde_json::to_string(c).context("serialize competitor")
}

fn parse_competitor(raw: &str) -> Result<Competitor> {
    serde_json::from_str(raw).context("decode competitor")
}

/// RFC 3339, or a naive ISO timestamp taken as UTC.
fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    let naive = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .with_context(|| format!("invalid timestamp {raw}"))?;
    Ok(naive.and_utc())
}
