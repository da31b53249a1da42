use std::collections::HashMap;

use std::fs;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::json;

use courtside::assembler::assemble_prediction;
use courtside::calibration;
use courtside::database::Database;
use courtside::model_store::ClassifierSet;
use courtside::models::{Competitor, Match, MatchResult, Prediction, SportsData};
use courtside::{FeatureExtractor, MatchInput, MatchPredictor};

fn sample_prediction(c1: &str, c2: &str, p1: f64) -> Prediction {
    let mut alcaraz = Competitor::new(c1, "Tennis");
    alcaraz.metadata.insert("ranking".to_string(), json!(1));
    let fixture = Match {
        sport: "Tennis".to_string(),
        event_name: "Australian Open 2026 Final".to_string(),
        event_date: Utc.with_ymd_and_hms(2026, 2, 1, 8, 30, 0).unwrap(),
        competitor1: alcaraz,
        competitor2: Competitor::new(c2, "Tennis"),
    };
    let winner = if p1 > 0.5 {
        fixture.competitor1.clone()
    } else {
        fixture.competitor2.clone()
    };
    Prediction {
        id: None,
        fixture,
        predicted_winner: winner,
        confidence: p1.max(1.0 - p1),
        probability_c1: p1,
        probability_c2: 1.0 - p1,
        reasoning: "ranking edge".to_string(),
        factor_scores: HashMap::from([("p1_ranking".to_string(), 1.0)]),
        created_at: Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap(),
        notes: Some("method: heuristic".to_string()),
    }
}

#[test]
fn prediction_crud() {
    let db = Database::open_in_memory().unwrap();
    let mut p = sample_prediction("Carlos Alcaraz", "Novak Djokovic", 0.53);
    let id = db.save_prediction(&p).unwrap();

    let loaded = db.get_prediction(id).unwrap().unwrap();
    assert_eq!(loaded.id, Some(id));
    assert_eq!(loaded.fixture, p.fixture);
    assert_eq!(loaded.predicted_winner.name, "Carlos Alcaraz");
    assert_eq!(loaded.factor_scores.get("p1_ranking"), Some(&1.0));
    assert_eq!(loaded.created_at, p.created_at);

    assert!(!db.update_prediction(&p).unwrap(), "no id yet");
    p.id = Some(id);
    p.notes = Some("revised".to_string());
    assert!(db.update_prediction(&p).unwrap());
    assert_eq!(
        db.get_prediction(id).unwrap().unwrap().notes.as_deref(),
        Some("revised")
    );

    p.id = Some(id + 100);
    assert!(!db.update_prediction(&p).unwrap());

    assert!(db.delete_prediction(id).unwrap());
    assert!(!db.delete_prediction(id).unwrap());
    assert!(db.get_prediction(id).unwrap().is_none());
}

#[test]
fn result_crud_and_correctness() {
    let db = Database::open_in_memory().unwrap();
    let p = sample_prediction("Carlos Alcaraz", "Novak Djokovic", 0.53);
    let pid = db.save_prediction(&p).unwrap();

    let when = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
    let mut r = MatchResult::for_prediction(&p, pid, "carlos alcaraz", "6-4 6-4 6-4", "manual", when);
    assert!(r.is_correct);
    let rid = db.save_result(&r).unwrap();
    let loaded = db.get_result(rid).unwrap().unwrap();
    assert_eq!(loaded.prediction_id, pid);
    assert!(loaded.is_correct);
    assert_eq!(loaded.fetched_at, when);

    r.id = Some(rid);
    r.score = "6-4 6-4 7-6".to_string();
    assert!(db.update_result(&r).unwrap());
    assert_eq!(db.get_result(rid).unwrap().unwrap().score, "6-4 6-4 7-6");
    assert!(db.delete_result(rid).unwrap());
    assert!(db.get_result(rid).unwrap().is_none());
}

#[test]
fn sports_data_crud() {
    let db = Database::open_in_memory().unwrap();
    let now = Utc::now();
    let mut d = SportsData {
        id: None,
        sport: "tennis".to_string(),
        data_type: "player_stats".to_string(),
        entity_id: "275923".to_string(),
        data: json!({"team": {"name": "Carlos Alcaraz"}}),
        source: "rapidapi".to_string(),
        fetched_at: now,
        expires_at: None,
    };
    let id = db.save_sports_data(&d).unwrap();
    let loaded = db.get_sports_data(id).unwrap().unwrap();
    assert_eq!(loaded.data, d.data);
    assert_eq!(loaded.expires_at, None);

    d.id = Some(id);
    d.expires_at = Some(now + Duration::hours(1));
    assert!(db.update_sports_data(&d).unwrap());
    assert!(db.get_sports_data(id).unwrap().unwrap().expires_at.is_some());
    assert!(db.delete_sports_data(id).unwrap());
    assert!(!db.update_sports_data(&d).unwrap());
}

#[test]
fn cache_lookup_honors_expiry_and_replacement() {
    let mut db = Database::open_in_memory().unwrap();
    let t0 = Utc.with_ymd_and_hms(2026, 1, 30, 10, 0, 0).unwrap();
    let entry = |payload: serde_json::Value, fetched: DateTime<Utc>| SportsData {
        id: None,
        sport: "tennis".to_string(),
        data_type: "h2h".to_string(),
        entity_id: "14882-275923".to_string(),
        data: payload,
        source: "rapidapi".to_string(),
        fetched_at: fetched,
        expires_at: Some(fetched + Duration::hours(1)),
    };

    db.store_cached_payload(&entry(json!({"v": 1}), t0)).unwrap();
    let hit = db
        .cached_payload("tennis", "h2h", "14882-275923", t0 + Duration::minutes(30))
        .unwrap()
        .unwrap();
    assert_eq!(hit.data, json!({"v": 1}));
    assert!(
        db.cached_payload("tennis", "h2h", "14882-275923", t0 + Duration::hours(2))
            .unwrap()
            .is_none()
    );
    assert!(
        db.cached_payload("tennis", "player_stats", "14882-275923", t0)
            .unwrap()
            .is_none()
    );

    let t1 = t0 + Duration::hours(3);
    let id = db.store_cached_payload(&entry(json!({"v": 2}), t1)).unwrap();
    let hit = db
        .cached_payload("tennis", "h2h", "14882-275923", t1)
        .unwrap()
        .unwrap();
    assert_eq!(hit.id, Some(id));
    assert_eq!(hit.data, json!({"v": 2}));
    // The first row was replaced, not kept alongside.
    assert!(db.get_sports_data(id - 1).unwrap().is_none());
}

#[test]
fn review_scores_joined_results() {
    let db = Database::open_in_memory().unwrap();
    let now = Utc::now();

    let right = sample_prediction("Carlos Alcaraz", "Novak Djokovic", 0.8);
    let id = db.save_prediction(&right).unwrap();
    db.save_result(&MatchResult::for_prediction(&right, id, "Carlos Alcaraz", "3-0", "manual", now))
        .unwrap();

    let wrong = sample_prediction("Jannik Sinner", "Alexander Zverev", 0.8);
    let id = db.save_prediction(&wrong).unwrap();
    db.save_result(&MatchResult::for_prediction(&wrong, id, "Alexander Zverev", "3-2", "manual", now))
        .unwrap();

    let unscored = sample_prediction("Taylor Fritz", "Casper Ruud", 0.6);
    db.save_prediction(&unscored).unwrap();

    let stray = sample_prediction("Ben Shelton", "Tommy Paul", 0.6);
    let id = db.save_prediction(&stray).unwrap();
    db.save_result(&MatchResult::for_prediction(&stray, id, "Somebody Else", "w/o", "manual", now))
        .unwrap();

    assert_eq!(db.scored_predictions().unwrap().len(), 3);

    let (metrics, bins) = calibration::review(&db).unwrap();
    assert_eq!(metrics.samples, 2);
    assert!((metrics.accuracy - 0.5).abs() < 1e-12);
    // (0.2^2 * 2 + 0.8^2 * 2) / 2
    assert!((metrics.brier - 0.68).abs() < 1e-9);
    assert_eq!(bins[8].count, 2);
}

#[test]
fn open_creates_missing_parent_dirs() {
    let root = std::env::temp_dir().join(format!("courtside-db-{}", std::process::id()));
    let _ = fs::remove_dir_all(&root);
    let path = root.join("nested").join("predictions.db");

    let db = Database::open(&path).unwrap();
    db.save_prediction(&sample_prediction("Carlos Alcaraz", "Novak Djokovic", 0.6))
        .unwrap();
    assert!(path.exists());

    // A regular file where the parent directory should be.
    let blocked = root.join("plain-file");
    fs::write(&blocked, "x").unwrap();
    assert!(Database::open(&blocked.join("predictions.db")).is_err());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn prediction_from_junk_numeric_fields_loads_back() {
    let input = MatchInput::new(
        json!({"team": {"playerTeamInfo": {"currentRanking": "NaN", "prizeTotal": -5}}}),
        json!({"team": {"playerTeamInfo": {"height": "inf", "prizeTotal": -1}}}),
    );
    let extractor =
        FeatureExtractor::with_reference_date(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
    let predictor = MatchPredictor::new(ClassifierSet::new()).with_extractor(extractor);
    let fused = predictor.predict(&input, true).unwrap();

    let fixture = sample_prediction("Carlos Alcaraz", "Novak Djokovic", 0.5).fixture;
    let prediction = assemble_prediction(fixture, &fused, Utc::now());
    assert!(prediction.factor_scores.values().all(|v| v.is_finite()));

    let db = Database::open_in_memory().unwrap();
    let id = db.save_prediction(&prediction).unwrap();
    let loaded = db.get_prediction(id).unwrap().unwrap();
    assert_eq!(loaded.factor_scores, prediction.factor_scores);
}
