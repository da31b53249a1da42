//! Fuses heuristic and trained-classifier estimates into one probability pair.

use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;

use crate::calibration::ProbPair;
use crate::classifier::{ClassifierError, SharedClassifier};
use crate::features::{FeatureError, FeatureExtractor, FeatureMap, MatchInput};
use crate::heuristic::HeuristicScorer;
use crate::model_store::{self, ClassifierSet, ModelSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionMethod {
    Heuristic,
    HeuristicFallback,
    Ensemble,
    SingleModel,
}

impl PredictionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PredictionMethod::Heuristic => "heuristic",
            PredictionMethod::HeuristicFallback => "heuristic_fallback",
            PredictionMethod::Ensemble => "ensemble",
            PredictionMethod::SingleModel => "single_model",
        }
    }

    pub fn is_heuristic(self) -> bool {
        matches!(
            self,
            PredictionMethod::Heuristic | PredictionMethod::HeuristicFallback
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionMetadata {
    pub method: PredictionMethod,
    /// Slots that actually contributed to the estimate.
    pub models_used: Vec<ModelSlot>,
    pub model_used: Option<ModelSlot>,
    pub features_used: usize,
    pub feature_values: FeatureMap,
}

#[derive(Debug, Clone, Serialize)]
pub struct FusedPrediction {
    pub probs: ProbPair,
    pub metadata: PredictionMetadata,
}

impl FusedPrediction {
    pub fn p1(&self) -> f64 {
        self.probs.p1
    }

    pub fn p2(&self) -> f64 {
        self.probs.p2
    }
}

/// Holds the loaded classifiers and scores matches. Immutable once built, so
/// one instance can be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct MatchPredictor {
    classifiers: ClassifierSet,
    extractor: FeatureExtractor,
    heuristic: HeuristicScorer,
}

impl MatchPredictor {
    pub fn new(classifiers: ClassifierSet) -> Self {
        Self {
            classifiers,
            ..Self::default()
        }
    }

    pub fn from_model_dir(dir: &Path) -> Self {
        let classifiers = model_store::load_dir(dir);
        tracing::info!(
            loaded = classifiers.len(),
            dir = %dir.display(),
            "predictor ready"
        );
        Self::new(classifiers)
    }

    pub fn with_extractor(mut self, extractor: FeatureExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn classifiers(&self) -> &ClassifierSet {
        &self.classifiers
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn predict(
        &self,
        input: &MatchInput,
        use_ensemble: bool,
    ) -> Result<FusedPrediction, FeatureError> {
        let features = self.extractor.extract(input)?;
        Ok(self.predict_features(features, use_ensemble))
    }

    /// Scores a batch on the rayon pool. Results keep the input order.
    pub fn predict_many(
        &self,
        inputs: &[MatchInput],
        use_ensemble: bool,
    ) -> Vec<Result<FusedPrediction, FeatureError>> {
        inputs
            .par_iter()
            .map(|input| self.predict(input, use_ensemble))
            .collect()
    }

    pub fn predict_features(&self, features: FeatureMap, use_ensemble: bool) -> FusedPrediction {
        if self.classifiers.is_empty() {
            return self.heuristic_result(features, PredictionMethod::Heuristic);
        }
        if use_ensemble && self.classifiers.len() > 1 {
            self.ensemble(features)
        } else {
            self.single(features)
        }
    }

    fn ensemble(&self, features: FeatureMap) -> FusedPrediction {
        let mut pairs = Vec::with_capacity(self.classifiers.len());
        let mut used = Vec::with_capacity(self.classifiers.len());
        for (slot, classifier) in self.classifiers.iter() {
            match query(classifier, &features) {
                Ok(pair) => {
                    pairs.push(pair);
                    used.push(slot);
                }
                Err(err) => {
                    tracing::warn!(slot = slot.as_str(), error = %err, "classifier abstained");
                }
            }
        }
        let Some(mean) = ProbPair::mean(&pairs) else {
            tracing::warn!("every classifier failed; using heuristic");
            return self.heuristic_result(features, PredictionMethod::HeuristicFallback);
        };
        // Averages of normalized pairs only drift by rounding.
        let probs = ProbPair::normalized(mean.p1, mean.p2).unwrap_or(mean);
        FusedPrediction {
            probs,
            metadata: PredictionMetadata {
                method: PredictionMethod::Ensemble,
                models_used: used,
                model_used: None,
                features_used: features.len(),
                feature_values: features,
            },
        }
    }

    fn single(&self, features: FeatureMap) -> FusedPrediction {
        let chosen = ModelSlot::PRIORITY
            .into_iter()
            .find_map(|slot| self.classifiers.get(slot).map(|c| (slot, c)));
        let Some((slot, classifier)) = chosen else {
            return self.heuristic_result(features, PredictionMethod::HeuristicFallback);
        };
        match query(classifier, &features) {
            Ok(probs) => FusedPrediction {
                probs,
                metadata: PredictionMetadata {
                    method: PredictionMethod::SingleModel,
                    models_used: vec![slot],
                    model_used: Some(slot),
                    features_used: features.len(),
                    feature_values: features,
                },
            },
            Err(err) => {
                tracing::warn!(slot = slot.as_str(), error = %err, "classifier failed; using heuristic");
                self.heuristic_result(features, PredictionMethod::HeuristicFallback)
            }
        }
    }

    fn heuristic_result(&self, features: FeatureMap, method: PredictionMethod) -> FusedPrediction {
        FusedPrediction {
            probs: self.heuristic.score(&features),
            metadata: PredictionMetadata {
                method,
                models_used: Vec::new(),
                model_used: None,
                features_used: features.len(),
                feature_values: features,
            },
        }
    }
}

fn query(classifier: &SharedClassifier, features: &FeatureMap) -> Result<ProbPair, ClassifierError> {
    let raw = classifier.predict_probability(features.as_slice())?;
    ProbPair::normalized(raw.p1, raw.p2).ok_or(ClassifierError::InvalidOutput {
        p1: raw.p1,
        p2: raw.p2,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::classifier::ProbabilityClassifier;
    use crate::features::FEATURE_COUNT;

    struct Raw(f64, f64);

    impl ProbabilityClassifier for Raw {
        fn predict_probability(&self, _: &[f64]) -> Result<ProbPair, ClassifierError> {
            Ok(ProbPair {
                p1: self.0,
                p2: self.1,
            })
        }
    }

    fn features() -> FeatureMap {
        FeatureMap::from_vector(&[1.0; FEATURE_COUNT]).unwrap()
    }

    #[test]
    fn unnormalized_output_is_rescaled() {
        let set = ClassifierSet::new().with(ModelSlot::Xgboost, Arc::new(Raw(3.0, 1.0)));
        let out = MatchPredictor::new(set).predict_features(features(), false);
        assert_eq!(out.metadata.method, PredictionMethod::SingleModel);
        assert!((out.p1() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn garbage_output_counts_as_failure() {
        let set = ClassifierSet::new().with(ModelSlot::Xgboost, Arc::new(Raw(f64::NAN, 0.5)));
        let out = MatchPredictor::new(set).predict_features(features(), false);
        assert_eq!(out.metadata.method, PredictionMethod::HeuristicFallback);
        assert!(out.metadata.models_used.is_empty());
    }

    #[test]
    fn one_classifier_with_ensemble_flag_runs_single() {
        let set = ClassifierSet::new().with(ModelSlot::LogisticRegression, Arc::new(Raw(0.3, 0.7)));
        let out = MatchPredictor::new(set).predict_features(features(), true);
        assert_eq!(out.metadata.method, PredictionMethod::SingleModel);
        assert_eq!(out.metadata.model_used, Some(ModelSlot::LogisticRegression));
    }

    #[test]
    fn method_names_are_stable() {
        assert_eq!(PredictionMethod::HeuristicFallback.as_str(), "heuristic_fallback");
        let json = serde_json::to_string(&PredictionMethod::SingleModel).unwrap();
        assert_eq!(json, "\"single_model\"");
    }
}
