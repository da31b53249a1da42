pub mod api_client;
pub mod assembler;
pub mod calibration;
pub mod classifier;
pub mod config;
pub mod database;
pub mod ensemble;
pub mod features;
pub mod fetcher;
pub mod heuristic;
pub mod model_store;
pub mod models;
pub mod snapshot;

pub use ensemble::{FusedPrediction, MatchPredictor, PredictionMethod};
pub use features::{FeatureExtractor, FeatureMap, MatchInput, feature_names};

/// Installs the fmt subscriber used by the binaries. `RUST_LOG` overrides the
/// default `info` level.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
