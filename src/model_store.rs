//! Persisted classifier slots.
//!
//! Each slot lives at `<model_dir>/<slot>.json` inside an envelope that
//! records the feature schema it was trained against. Loading is keyed by the
//! fixed slot names; a file that is missing, unreadable or trained against a
//! different schema is skipped with a warning.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::classifier::{PersistedModel, SharedClassifier};
use crate::features::{FEATURE_COUNT, FEATURE_NAMES, FEATURE_SCHEMA_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSlot {
    RandomForest,
    Xgboost,
    LogisticRegression,
}

impl ModelSlot {
    /// Single-model preference order.
    pub const PRIORITY: [ModelSlot; 3] = [
        ModelSlot::RandomForest,
        ModelSlot::Xgboost,
        ModelSlot::LogisticRegression,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelSlot::RandomForest => "random_forest",
            ModelSlot::Xgboost => "xgboost",
            ModelSlot::LogisticRegression => "logistic_regression",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.json", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaStamp {
    pub version: u32,
    pub feature_names: Vec<String>,
}

impl SchemaStamp {
    pub fn current() -> Self {
        Self {
            version: FEATURE_SCHEMA_VERSION,
            feature_names: FEATURE_NAMES.iter().map(|n| n.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEnvelope {
    pub slot: ModelSlot,
    pub schema: SchemaStamp,
    pub model: PersistedModel,
}

impl ModelEnvelope {
    pub fn new(slot: ModelSlot, model: PersistedModel) -> Self {
        Self {
            slot,
            schema: SchemaStamp::current(),
            model,
        }
    }

    /// Checks the envelope against the running feature schema and the slot
    /// it was found under.
    pub fn check(&self, expected_slot: ModelSlot) -> Result<()> {
        if self.slot != expected_slot {
            bail!(
                "envelope is for slot {}, found under {}",
                self.slot.as_str(),
                expected_slot.as_str()
            );
        }
        if self.schema != SchemaStamp::current() {
            bail!(
                "trained against feature schema v{} ({} features), running v{} ({} features)",
                self.schema.version,
                self.schema.feature_names.len(),
                FEATURE_SCHEMA_VERSION,
                FEATURE_COUNT
            );
        }
        self.model.validate(FEATURE_COUNT)?;
        Ok(())
    }
}

/// Loaded classifiers, keyed and iterated in slot priority order.
#[derive(Clone, Default)]
pub struct ClassifierSet {
    slots: Vec<(ModelSlot, SharedClassifier)>,
}

impl ClassifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the classifier for `slot`.
    pub fn insert(&mut self, slot: ModelSlot, classifier: SharedClassifier) {
        match self.slots.iter_mut().find(|(s, _)| *s == slot) {
            Some(entry) => entry.1 = classifier,
            None => {
                self.slots.push((slot, classifier));
                self.slots.sort_by_key(|(s, _)| *s);
            }
        }
    }

    pub fn with(mut self, slot: ModelSlot, classifier: SharedClassifier) -> Self {
        self.insert(slot, classifier);
        self
    }

    pub fn get(&self, slot: ModelSlot) -> Option<&SharedClassifier> {
        self.slots.iter().find(|(s, _)| *s == slot).map(|(_, c)| c)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModelSlot, &SharedClassifier)> + '_ {
        self.slots.iter().map(|(s, c)| (*s, c))
    }

    pub fn slots(&self) -> Vec<ModelSlot> {
        self.slots.iter().map(|(s, _)| *s).collect()
    }
}

impl std::fmt::Debug for ClassifierSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierSet")
            .field("slots", &self.slots())
            .finish()
    }
}

pub fn slot_path(dir: &Path, slot: ModelSlot) -> PathBuf {
    dir.join(slot.file_name())
}

/// Reads one slot. `Ok(None)` means the file simply is not there.
pub fn load_slot(dir: &Path, slot: ModelSlot) -> Result<Option<SharedClassifier>> {
    let path = slot_path(dir, slot);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("read model file {}", path.display()))?;
    let envelope: ModelEnvelope = serde_json::from_str(&raw)
        .with_context(|| format!("parse model file {}", path.display()))?;
    envelope
        .check(slot)
        .with_context(|| format!("reject model file {}", path.display()))?;
    Ok(Some(envelope.model.into_shared()))
}

/// Loads every known slot from `dir`. Never fails: problems are logged and the
/// slot is left empty.
pub fn load_dir(dir: &Path) -> ClassifierSet {
    let mut set = ClassifierSet::new();
    for slot in ModelSlot::PRIORITY {
        match load_slot(dir, slot) {
            Ok(Some(classifier)) => {
                tracing::info!(slot = slot.as_str(), "loaded classifier");
                set.insert(slot, classifier);
            }
            Ok(None) => {
                tracing::debug!(slot = slot.as_str(), dir = %dir.display(), "no model file");
            }
            Err(err) => {
                tracing::warn!(slot = slot.as_str(), error = %format!("{err:#}"), "skipping classifier");
            }
        }
    }
    set
}

/// Writes an envelope for `slot`, replacing any previous file atomically.
pub fn save_slot(dir: &Path, slot: ModelSlot, model: &PersistedModel) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create model dir {}", dir.display()))?;
    let envelope = ModelEnvelope::new(slot, model.clone());
    let path = slot_path(dir, slot);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(&envelope).context("serialize model envelope")?;
    fs::write(&tmp, json).context("write model envelope")?;
    fs::rename(&tmp, &path).context("swap model envelope")?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::calibration::ProbPair;
    use crate::classifier::{ClassifierError, ProbabilityClassifier};

    struct Fixed(f64);

    impl ProbabilityClassifier for Fixed {
        fn predict_probability(&self, _: &[f64]) -> Result<ProbPair, ClassifierError> {
            Ok(ProbPair::from_p1(self.0))
        }
    }

    #[test]
    fn set_iterates_in_priority_order() {
        let set = ClassifierSet::new()
            .with(ModelSlot::LogisticRegression, Arc::new(Fixed(0.1)))
            .with(ModelSlot::RandomForest, Arc::new(Fixed(0.2)))
            .with(ModelSlot::Xgboost, Arc::new(Fixed(0.3)));
        assert_eq!(set.slots(), ModelSlot::PRIORITY.to_vec());
    }

    #[test]
    fn insert_replaces_existing_slot() {
        let mut set = ClassifierSet::new();
        set.insert(ModelSlot::Xgboost, Arc::new(Fixed(0.1)));
        set.insert(ModelSlot::Xgboost, Arc::new(Fixed(0.9)));
        assert_eq!(set.len(), 1);
        let p = set
            .get(ModelSlot::Xgboost)
            .unwrap()
            .predict_probability(&[])
            .unwrap();
        assert_eq!(p.p1, 0.9);
    }

    #[test]
    fn slot_names_are_fixed() {
        assert_eq!(ModelSlot::Xgboost.file_name(), "xgboost.json");
        let json = serde_json::to_string(&ModelSlot::LogisticRegression).unwrap();
        assert_eq!(json, "\"logistic_regression\"");
    }
}
