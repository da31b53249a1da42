use chrono::NaiveDate;
use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::Value;
use std::hint::black_box;

use courtside::classifier::{
    DecisionTree, LogisticRegressionModel, PersistedModel, RandomForestModel, TreeNode,
};
use courtside::features::FEATURE_COUNT;
use courtside::model_store::{ClassifierSet, ModelSlot};
use courtside::{FeatureExtractor, MatchInput, MatchPredictor};

const PLAYER1_JSON: &str = include_str!("../tests/fixtures/player_alcaraz.json");
const PLAYER2_JSON: &str = include_str!("../tests/fixtures/player_djokovic.json");

fn sample_input() -> MatchInput {
    let p1: Value = serde_json::from_str(PLAYER1_JSON).unwrap();
    let p2: Value = serde_json::from_str(PLAYER2_JSON).unwrap();
    MatchInput::new(p1, p2)
        .surface("hard")
        .tournament("Australian Open")
}

fn extractor() -> FeatureExtractor {
    FeatureExtractor::with_reference_date(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap())
}

fn deep_tree(depth: usize) -> DecisionTree {
    // Complete binary tree in breadth-first layout.
    let internal = (1usize << depth) - 1;
    let mut nodes = Vec::with_capacity(internal * 2 + 1);
    for i in 0..internal {
        nodes.push(TreeNode::Split {
            feature: i % FEATURE_COUNT,
            threshold: 0.5 * i as f64,
            left: 2 * i + 1,
            right: 2 * i + 2,
        });
    }
    for i in 0..=internal {
        nodes.push(TreeNode::Leaf {
            value: (i % 10) as f64 / 10.0,
        });
    }
    DecisionTree { nodes }
}

fn loaded_set() -> ClassifierSet {
    let forest = PersistedModel::RandomForest(RandomForestModel {
        n_features: FEATURE_COUNT,
        trees: (0..100).map(|_| deep_tree(8)).collect(),
    });
    let logistic = PersistedModel::LogisticRegression(LogisticRegressionModel {
        coefficients: vec![0.01; FEATURE_COUNT],
        intercept: -0.1,
        scaler: None,
    });
    forest.validate(FEATURE_COUNT).unwrap();
    ClassifierSet::new()
        .with(ModelSlot::RandomForest, forest.into_shared())
        .with(ModelSlot::LogisticRegression, logistic.into_shared())
}

fn bench_extract(c: &mut Criterion) {
    let input = sample_input();
    let ex = extractor();
    c.bench_function("feature_extract", |b| {
        b.iter(|| {
            let f = ex.extract(black_box(&input)).unwrap();
            black_box(f.len());
        })
    });
}

fn bench_predict_heuristic(c: &mut Criterion) {
    let input = sample_input();
    let predictor = MatchPredictor::new(ClassifierSet::new()).with_extractor(extractor());
    c.bench_function("predict_heuristic", |b| {
        b.iter(|| {
            let out = predictor.predict(black_box(&input), true).unwrap();
            black_box(out.p1());
        })
    });
}

fn bench_predict_ensemble(c: &mut Criterion) {
    let input = sample_input();
    let predictor = MatchPredictor::new(loaded_set()).with_extractor(extractor());
    c.bench_function("predict_ensemble", |b| {
        b.iter(|| {
            let out = predictor.predict(black_box(&input), true).unwrap();
            black_box(out.p1());
        })
    });
}

fn bench_predict_many(c: &mut Criterion) {
    let inputs = vec![sample_input(); 256];
    let predictor = MatchPredictor::new(loaded_set()).with_extractor(extractor());
    c.bench_function("predict_many_256", |b| {
        b.iter(|| {
            let out = predictor.predict_many(black_box(&inputs), true);
            black_box(out.len());
        })
    });
}

criterion_group!(
    benches,
    bench_extract,
    bench_predict_heuristic,
    bench_predict_ensemble,
    bench_predict_many
);
criterion_main!(benches);
