use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use courtside::config::AppConfig;
use courtside::heuristic::HeuristicScorer;
use courtside::{FeatureExtractor, MatchInput, MatchPredictor};

#[derive(Debug, Deserialize)]
struct BacktestCase {
    #[serde(default)]
    id: Option<String>,
    player1: Value,
    player2: Value,
    #[serde(default)]
    head_to_head: Option<Value>,
    #[serde(default = "default_surface")]
    surface: String,
    #[serde(default)]
    tournament: String,
    /// `YYYY-MM-DD`; pins "today" so ages and experience are reproducible.
    #[serde(default)]
    reference_date: Option<String>,
    #[serde(default)]
    single: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CaseFile {
    Many(Vec<BacktestCase>),
    One(BacktestCase),
}

fn default_surface() -> String {
    "hard".to_string()
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    courtside::init_tracing();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tests/fixtures/backtest_case.json"));

    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cases = match serde_json::from_str::<CaseFile>(&raw).context("parse backtest case")? {
        CaseFile::Many(cases) => cases,
        CaseFile::One(case) => vec![case],
    };

    // No network: only classifiers already on disk are consulted.
    let cfg = AppConfig::from_env();
    let base = MatchPredictor::from_model_dir(&cfg.model_dir);

    for (idx, case) in cases.into_iter().enumerate() {
        let label = case.id.clone().unwrap_or_else(|| format!("case {}", idx + 1));
        let extractor = match case.reference_date.as_deref() {
            Some(raw) => {
                let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .with_context(|| format!("{label}: invalid reference_date {raw}"))?;
                FeatureExtractor::with_reference_date(date)
            }
            None => FeatureExtractor::new(),
        };
        let predictor = base.clone().with_extractor(extractor);
        let input = MatchInput::new(case.player1, case.player2)
            .head_to_head(case.head_to_head)
            .surface(case.surface)
            .tournament(case.tournament);

        let fused = predictor
            .predict(&input, !case.single)
            .with_context(|| format!("score {label}"))?;

        println!("== {label}");
        println!(
            "method={} p1={:.4} p2={:.4}",
            fused.metadata.method.as_str(),
            fused.p1(),
            fused.p2()
        );
        if !fused.metadata.models_used.is_empty() {
            let names: Vec<&str> = fused.metadata.models_used.iter().map(|s| s.as_str()).collect();
            println!("models={}", names.join(","));
        }
        let b = HeuristicScorer.score_breakdown(&fused.metadata.feature_values);
        println!(
            "heuristic: ranking={:.2} experience={:.2} prize={:.2} physical={:.2} grand_slam={:.2}",
            b.ranking, b.experience, b.prize, b.physical, b.grand_slam
        );
        println!(
            "{}",
            serde_json::to_string_pretty(&fused.metadata.feature_values)
                .context("serialize features")?
        );
    }
    Ok(())
}
