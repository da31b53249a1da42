use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use serde_json::{Map, Value};

use courtside::api_client::RapidApiClient;
use courtside::assembler::assemble_prediction;
use courtside::calibration;
use courtside::config::AppConfig;
use courtside::database::Database;
use courtside::fetcher::TennisFetcher;
use courtside::models::{Competitor, Match, MatchResult};
use courtside::{MatchInput, MatchPredictor};

const USAGE: &str = "usage:
  courtside predict <p1_id> <p2_id> [--surface S] [--tournament T] [--single] [--dry-run]
  courtside result <prediction_id> <winner> <score>
  courtside review";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    courtside::init_tracing();

    let cfg = AppConfig::from_env();
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    match args.first().map(String::as_str) {
        Some("predict") => run_predict(&cfg, &args[1..]),
        Some("result") => run_result(&cfg, &args[1..]),
        Some("review") => run_review(&cfg),
        _ => {
            eprintln!("{USAGE}");
            bail!("missing or unknown command")
        }
    }
}

struct PredictArgs {
    p1: u64,
    p2: u64,
    surface: String,
    tournament: String,
    use_ensemble: bool,
    dry_run: bool,
}

fn parse_predict_args(args: &[String]) -> Result<PredictArgs> {
    let mut ids = Vec::new();
    let mut surface = "hard".to_string();
    let mut tournament = String::new();
    let mut use_ensemble = true;
    let mut dry_run = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--surface" => surface = iter.next().context("--surface needs a value")?.clone(),
            "--tournament" => {
                tournament = iter.next().context("--tournament needs a value")?.clone()
            }
            "--single" => use_ensemble = false,
            "--dry-run" => dry_run = true,
            other => {
                if let Some(v) = other.strip_prefix("--surface=") {
                    surface = v.to_string();
                } else if let Some(v) = other.strip_prefix("--tournament=") {
                    tournament = v.to_string();
                } else {
                    let id = other
                        .parse::<u64>()
                        .with_context(|| format!("invalid player id {other}"))?;
                    ids.push(id);
                }
            }
        }
    }
    let [p1, p2] = ids.as_slice() else {
        return Err(anyhow!("expected exactly two player ids\n{USAGE}"));
    };
    Ok(PredictArgs {
        p1: *p1,
        p2: *p2,
        surface,
        tournament,
        use_ensemble,
        dry_run,
    })
}

fn run_predict(cfg: &AppConfig, args: &[String]) -> Result<()> {
    let args = parse_predict_args(args)?;
    let client = RapidApiClient::from_config(cfg)?;
    let db = Database::open(&cfg.db_path)?;
    let mut fetcher = TennisFetcher::new(client, db);

    let p1 = fetcher
        .fetch_player_stats(args.p1)
        .with_context(|| format!("fetch player {}", args.p1))?;
    let p2 = fetcher
        .fetch_player_stats(args.p2)
        .with_context(|| format!("fetch player {}", args.p2))?;
    let h2h = match fetcher.fetch_head_to_head(args.p1, args.p2) {
        Ok(v) => Some(v),
        Err(err) => {
            tracing::warn!(error = %err, "head-to-head unavailable");
            None
        }
    };

    let input = MatchInput::new(p1.clone(), p2.clone())
        .head_to_head(h2h)
        .surface(args.surface.clone())
        .tournament(args.tournament.clone());

    let predictor = MatchPredictor::from_model_dir(&cfg.model_dir);
    let fused = predictor.predict(&input, args.use_ensemble)?;

    let now = Utc::now();
    let fixture = Match {
        sport: "Tennis".to_string(),
        event_name: if args.tournament.is_empty() {
            "Tennis match".to_string()
        } else {
            args.tournament.clone()
        },
        event_date: now,
        competitor1: competitor_from_payload(&p1, args.p1),
        competitor2: competitor_from_payload(&p2, args.p2),
    };
    let prediction = assemble_prediction(fixture, &fused, now);
    println!("{}", prediction.reasoning);

    if args.dry_run {
        println!("\n(dry run, not saved)");
        return Ok(());
    }
    let id = fetcher.database().save_prediction(&prediction)?;
    println!("\nSaved prediction #{id}");
    Ok(())
}

fn competitor_from_payload(payload: &Value, id: u64) -> Competitor {
    let team = payload.get("team");
    let name = team
        .and_then(|t| t.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("player {id}"));
    let mut metadata = Map::new();
    metadata.insert("id".to_string(), Value::from(id));
    if let Some(info) = team.and_then(|t| t.get("playerTeamInfo")) {
        for key in ["currentRanking", "turnedPro", "height", "weight"] {
            if let Some(v) = info.get(key) {
                metadata.insert(key.to_string(), v.clone());
            }
        }
    }
    if let Some(country) = team
        .and_then(|t| t.get("country"))
        .and_then(|c| c.get("name"))
    {
        metadata.insert("country".to_string(), country.clone());
    }
    let mut c = Competitor::new(name, "Tennis");
    c.metadata = metadata;
    c
}

fn run_result(cfg: &AppConfig, args: &[String]) -> Result<()> {
    let [id, winner, score] = args else {
        return Err(anyhow!("expected <prediction_id> <winner> <score>\n{USAGE}"));
    };
    let id = id
        .parse::<i64>()
        .with_context(|| format!("invalid prediction id {id}"))?;
    let db = Database::open(&cfg.db_path)?;
    let prediction = db
        .get_prediction(id)?
        .with_context(|| format!("no prediction #{id}"))?;
    let result = MatchResult::for_prediction(&prediction, id, winner, score, "manual", Utc::now());
    let result_id = db.save_result(&result)?;
    println!(
        "Recorded result #{result_id} for prediction #{id}: predicted {}, actual {} ({})",
        prediction.predicted_winner.name,
        result.actual_winner,
        if result.is_correct { "correct" } else { "wrong" }
    );
    Ok(())
}

fn run_review(cfg: &AppConfig) -> Result<()> {
    let db = Database::open(&cfg.db_path)?;
    let (metrics, bins) = calibration::review(&db)?;
    if metrics.samples == 0 {
        println!("No scored predictions in {}", cfg.db_path.display());
        return Ok(());
    }
    println!("Scored predictions: {}", metrics.samples);
    println!("Accuracy: {:.1}%", metrics.accuracy * 100.0);
    println!("Brier: {:.4}", metrics.brier);
    println!("Log loss: {:.4}", metrics.log_loss);
    println!("\nCalibration (player 1 probability):");
    for bin in bins.iter().filter(|b| b.count > 0) {
        println!(
            "  {:.1}-{:.1}: n={} pred={:.3} actual={:.3}",
            bin.bucket_start, bin.bucket_end, bin.count, bin.avg_pred, bin.actual_rate
        );
    }
    Ok(())
}
