use crate::calibration::ProbPair;
use crate::features::FeatureMap;

const RANKING_WEIGHT: f64 = 0.20;
const EXPERIENCE_WEIGHT: f64 = 0.20;
const PRIZE_WEIGHT: f64 = 0.25;
const PHYSICAL_WEIGHT: f64 = 0.10;
const GRAND_SLAM_WEIGHT: f64 = 0.25;

const HEIGHT_EDGE_PER_UNIT: f64 = 0.05;

/// Per-dimension edge for player 1, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicBreakdown {
    pub ranking: f64,
    pub experience: f64,
    pub prize: f64,
    pub physical: f64,
    pub grand_slam: f64,
}

impl HeuristicBreakdown {
    pub fn weighted_sum(&self) -> f64 {
        self.ranking * RANKING_WEIGHT
            + self.experience * EXPERIENCE_WEIGHT
            + self.prize * PRIZE_WEIGHT
            + self.physical * PHYSICAL_WEIGHT
            + self.grand_slam * GRAND_SLAM_WEIGHT
    }
}

/// Fixed-weight scorer used when no trained classifier can answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer;

impl HeuristicScorer {
    pub fn score(&self, features: &FeatureMap) -> ProbPair {
        ProbPair::from_p1(self.score_breakdown(features).weighted_sum())
    }

    pub fn score_breakdown(&self, features: &FeatureMap) -> HeuristicBreakdown {
        let f = |name: &str| features.get(name).unwrap_or_default();

        let ranking = if f("p1_ranking") < f("p2_ranking") {
            0.65
        } else {
            0.35
        };

        // The more experienced player is slightly discounted.
        let exp_diff = f("experience_diff");
        let experience = if exp_diff > 10.0 {
            0.45
        } else if exp_diff < -10.0 {
            0.55
        } else {
            0.50
        };

        let prize_diff = f("prize_diff_log");
        let prize = if prize_diff > 1.0 {
            0.60
        } else if prize_diff < -1.0 {
            0.40
        } else {
            0.50
        };

        let physical = (0.50 + f("height_diff") * HEIGHT_EDGE_PER_UNIT).clamp(0.40, 0.60);

        let grand_slam = if f("is_grand_slam") != 0.0 {
            if exp_diff > 5.0 { 0.40 } else { 0.55 }
        } else {
            0.50
        };

        HeuristicBreakdown {
            ranking,
            experience,
            prize,
            physical,
            grand_slam,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FEATURE_COUNT, FeatureMap};

    fn neutral() -> FeatureMap {
        let mut f = FeatureMap::from_vector(&[0.0; FEATURE_COUNT]).unwrap();
        f.set("p1_ranking", 10.0).unwrap();
        f.set("p2_ranking", 10.0).unwrap();
        f
    }

    #[test]
    fn weights_sum_to_one() {
        let total = RANKING_WEIGHT
            + EXPERIENCE_WEIGHT
            + PRIZE_WEIGHT
            + PHYSICAL_WEIGHT
            + GRAND_SLAM_WEIGHT;
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn tied_ranking_counts_against_player_one() {
        let b = HeuristicScorer.score_breakdown(&neutral());
        assert_eq!(b.ranking, 0.35);
        assert_eq!(b.experience, 0.50);
        assert_eq!(b.prize, 0.50);
        assert_eq!(b.physical, 0.50);
        assert_eq!(b.grand_slam, 0.50);
        // 0.35*0.2 + 0.5*0.8
        assert!((HeuristicScorer.score(&neutral()).p1 - 0.47).abs() < 1e-12);
    }

    #[test]
    fn physical_edge_is_clamped() {
        let mut f = neutral();
        f.set("height_diff", 10.0).unwrap();
        assert_eq!(HeuristicScorer.score_breakdown(&f).physical, 0.60);
        f.set("height_diff", -10.0).unwrap();
        assert_eq!(HeuristicScorer.score_breakdown(&f).physical, 0.40);
    }

    #[test]
    fn grand_slam_favors_less_experienced_player_one() {
        let mut f = neutral();
        f.set("is_grand_slam", 1.0).unwrap();
        f.set("experience_diff", 6.0).unwrap();
        assert_eq!(HeuristicScorer.score_breakdown(&f).grand_slam, 0.40);
        f.set("experience_diff", 5.0).unwrap();
        assert_eq!(HeuristicScorer.score_breakdown(&f).grand_slam, 0.55);
    }

    #[test]
    fn score_is_deterministic_and_normalized() {
        let mut f = neutral();
        f.set("p1_ranking", 1.0).unwrap();
        f.set("prize_diff_log", -1.16).unwrap();
        f.set("experience_diff", -15.0).unwrap();
        let a = HeuristicScorer.score(&f);
        let b = HeuristicScorer.score(&f);
        assert_eq!(a, b);
        assert!((a.p1 + a.p2 - 1.0).abs() < 1e-9);
    }
}
