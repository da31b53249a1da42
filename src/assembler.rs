use chrono::{DateTime, Utc};

use crate::ensemble::FusedPrediction;
use crate::features::FeatureMap;
use crate::heuristic::HeuristicScorer;
use crate::models::{Match, Prediction};

/// Turns a fused estimate into a storable prediction record.
///
/// Competitor 1 is predicted only when strictly more likely; an even split
/// goes to competitor 2.
pub fn assemble_prediction(
    fixture: Match,
    fused: &FusedPrediction,
    created_at: DateTime<Utc>,
) -> Prediction {
    let probs = fused.probs;
    let predicted_winner = if probs.p1 > probs.p2 {
        fixture.competitor1.clone()
    } else {
        fixture.competitor2.clone()
    };
    let reasoning = reasoning_text(&fixture, fused, &predicted_winner.name);
    Prediction {
        id: None,
        predicted_winner,
        confidence: probs.confidence(),
        probability_c1: probs.p1,
        probability_c2: probs.p2,
        reasoning,
        factor_scores: fused.metadata.feature_values.to_hash_map(),
        created_at,
        notes: Some(format!("method: {}", fused.metadata.method.as_str())),
        fixture,
    }
}

fn reasoning_text(fixture: &Match, fused: &FusedPrediction, winner: &str) -> String {
    let meta = &fused.metadata;
    let c1 = &fixture.competitor1.name;
    let c2 = &fixture.competitor2.name;

    let mut lines = vec![
        format!("Prediction: {winner} to win"),
        format!("Confidence: {:.1}%", fused.probs.confidence() * 100.0),
        format!("Method: {}", meta.method.as_str()),
    ];
    if !meta.models_used.is_empty() {
        let names: Vec<&str> = meta.models_used.iter().map(|s| s.as_str()).collect();
        lines.push(format!("Models: {}", names.join(", ")));
    }
    lines.push(String::new());
    lines.push("Probabilities:".to_string());
    lines.push(format!("- {c1}: {:.1}%", fused.p1() * 100.0));
    lines.push(format!("- {c2}: {:.1}%", fused.p2() * 100.0));

    if meta.method.is_heuristic() {
        let b = HeuristicScorer.score_breakdown(&meta.feature_values);
        lines.push(String::new());
        lines.push(format!("Heuristic edges for {c1}:"));
        lines.push(format!("- ranking {:.2}", b.ranking));
        lines.push(format!("- experience {:.2}", b.experience));
        lines.push(format!("- prize money {:.2}", b.prize));
        lines.push(format!("- physical {:.2}", b.physical));
        lines.push(format!("- grand slam {:.2}", b.grand_slam));
    }

    lines.push(String::new());
    lines.push("Key features:".to_string());
    lines.extend(feature_summary(&meta.feature_values));
    lines.join("\n")
}

fn feature_summary(f: &FeatureMap) -> Vec<String> {
    let v = |name: &str| f.get(name).unwrap_or_default();
    let surface = [
        ("hard", v("surface_hard")),
        ("clay", v("surface_clay")),
        ("grass", v("surface_grass")),
    ]
    .iter()
    .filter(|(_, on)| *on != 0.0)
    .map(|(name, _)| *name)
    .collect::<Vec<_>>();
    let surface = if surface.is_empty() {
        "unknown".to_string()
    } else {
        surface.join("/")
    };
    let grand_slam = if v("is_grand_slam") != 0.0 { "yes" } else { "no" };

    vec![
        format!(
            "- ranking: #{:.0} vs #{:.0}",
            v("p1_ranking"),
            v("p2_ranking")
        ),
        format!(
            "- age: {:.0} vs {:.0} (experience diff {:+.0} years)",
            v("p1_age"),
            v("p2_age"),
            v("experience_diff")
        ),
        format!("- prize money (log diff): {:+.2}", v("prize_diff_log")),
        format!("- surface: {surface}"),
        format!("- grand slam: {grand_slam}"),
    ]
}
