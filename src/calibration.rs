use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::database::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOutcome {
    Player1,
    Player2,
}

/// Win probabilities for player 1 and player 2.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbPair {
    pub p1: f64,
    pub p2: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

impl ProbPair {
    pub fn even() -> Self {
        Self { p1: 0.5, p2: 0.5 }
    }

    pub fn from_p1(p1: f64) -> Self {
        Self { p1, p2: 1.0 - p1 }
    }

    /// Rescales a raw pair so it sums to one. Rejects negative, non-finite
    /// or all-zero input.
    pub fn normalized(p1: f64, p2: f64) -> Option<Self> {
        if !p1.is_finite() || !p2.is_finite() || p1 < 0.0 || p2 < 0.0 {
            return None;
        }
        let sum = p1 + p2;
        if sum <= 0.0 {
            return None;
        }
        let p1 = p1 / sum;
        Some(Self::from_p1(p1))
    }

    /// Element-wise mean of the pairs.
    pub fn mean(pairs: &[ProbPair]) -> Option<Self> {
        if pairs.is_empty() {
            return None;
        }
        let n = pairs.len() as f64;
        let p1 = pairs.iter().map(|p| p.p1).sum::<f64>() / n;
        let p2 = pairs.iter().map(|p| p.p2).sum::<f64>() / n;
        Some(Self { p1, p2 })
    }

    pub fn confidence(&self) -> f64 {
        self.p1.max(self.p2)
    }

    pub fn favorite(&self) -> BinaryOutcome {
        if self.p1 > self.p2 {
            BinaryOutcome::Player1
        } else {
            BinaryOutcome::Player2
        }
    }
}

pub fn evaluate_probs(predictions: &[ProbPair], outcomes: &[BinaryOutcome]) -> Metrics {
    if predictions.is_empty() || outcomes.is_empty() || predictions.len() != outcomes.len() {
        return Metrics {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
            accuracy: 0.0,
        };
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let y = one_hot(*outcome);
        brier_sum += (p.p1 - y.p1).powi(2) + (p.p2 - y.p2).powi(2);

        let actual_prob = match outcome {
            BinaryOutcome::Player1 => p.p1,
            BinaryOutcome::Player2 => p.p2,
        }
        .clamp(1e-12, 1.0);
        log_loss_sum += -actual_prob.ln();

        if p.favorite() == *outcome {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

/// Reliability table for player 1's probability.
pub fn calibration_bins(
    predictions: &[ProbPair],
    outcomes: &[BinaryOutcome],
    bins: usize,
) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let prob = p.p1.clamp(0.0, 1.0);
        let idx = ((prob * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += prob;
        if *outcome == BinaryOutcome::Player1 {
            actual_sum[idx] += 1.0;
        }
    }

    let mut out = Vec::with_capacity(bins);
    for i in 0..bins {
        let count = counts[i];
        let (avg_pred, actual_rate) = if count > 0 {
            (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
        } else {
            (0.0, 0.0)
        };
        out.push(CalibrationBin {
            bucket_start: i as f64 / bins as f64,
            bucket_end: (i + 1) as f64 / bins as f64,
            count,
            avg_pred,
            actual_rate,
        });
    }
    out
}

/// Scores every stored prediction that has a recorded result.
pub fn review(db: &Database) -> Result<(Metrics, Vec<CalibrationBin>)> {
    let scored = db.scored_predictions()?;
    let mut preds = Vec::with_capacity(scored.len());
    let mut outcomes = Vec::with_capacity(scored.len());
    for (prediction, result) in &scored {
        let winner = result.actual_winner.trim();
        let outcome = if winner.eq_ignore_ascii_case(prediction.fixture.competitor1.name.trim()) {
            BinaryOutcome::Player1
        } else if winner.eq_ignore_ascii_case(prediction.fixture.competitor2.name.trim()) {
            BinaryOutcome::Player2
        } else {
            tracing::warn!(
                prediction_id = ?prediction.id,
                winner,
                "result winner matches neither competitor; skipped"
            );
            continue;
        };
        preds.push(ProbPair {
            p1: prediction.probability_c1,
            p2: prediction.probability_c2,
        });
        outcomes.push(outcome);
    }
    let metrics = evaluate_probs(&preds, &outcomes);
    let bins = calibration_bins(&preds, &outcomes, 10);
    Ok((metrics, bins))
}

fn one_hot(outcome: BinaryOutcome) -> ProbPair {
    match outcome {
        BinaryOutcome::Player1 => ProbPair { p1: 1.0, p2: 0.0 },
        BinaryOutcome::Player2 => ProbPair { p1: 0.0, p2: 1.0 },
    }
}
