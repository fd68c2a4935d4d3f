use anyhow::Result;
use futures::future::BoxFuture;
use std::sync::Arc;

use crate::config::GateConfig;
use crate::decoder::DecodedImage;

/// Single labelled probability returned by a classifier
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub probability: f32,
}

impl Prediction {
    pub fn new(label: impl Into<String>, probability: f32) -> Self {
        Self {
            label: label.into(),
            probability,
        }
    }
}

/// Predictions ordered from most to least probable
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassificationResult {
    predictions: Vec<Prediction>,
}

impl ClassificationResult {
    pub fn new(mut predictions: Vec<Prediction>) -> Self {
        predictions.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        Self { predictions }
    }

    pub fn predictions(&self) -> &[Prediction] {
        &self.predictions
    }

    pub fn top(&self) -> Option<&Prediction> {
        self.predictions.first()
    }

    /// Blocked as soon as any blocked label is strictly above the threshold.
    pub fn verdict(&self, rules: &ScreeningRules) -> Verdict {
        self.predictions
            .iter()
            .find(|p| rules.blocks(p))
            .map(|p| Verdict::Blocked {
                label: p.label.clone(),
                probability: p.probability,
            })
            .unwrap_or(Verdict::Safe)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Safe,
    Blocked { label: String, probability: f32 },
}

/// Label set and threshold that turn predictions into a verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreeningRules {
    pub blocked_labels: Vec<String>,
    pub threshold: f32,
}

impl ScreeningRules {
    fn blocks(&self, prediction: &Prediction) -> bool {
        prediction.probability > self.threshold
            && self.blocked_labels.iter().any(|l| *l == prediction.label)
    }
}

impl From<&GateConfig> for ScreeningRules {
    fn from(config: &GateConfig) -> Self {
        Self {
            blocked_labels: config.blocked_labels.clone(),
            threshold: config.block_threshold,
        }
    }
}

/// Loaded image classifier, shared read-only by every screening call
pub trait Classifier: Send + Sync {
    fn classify<'a>(&'a self, image: &'a DecodedImage) -> BoxFuture<'a, Result<ClassificationResult>>;
}

/// Where a classifier comes from. Loading may fail.
pub trait ModelSource: Send + Sync {
    fn load(&self) -> BoxFuture<'_, Result<Arc<dyn Classifier>>>;
}

mod loader;
mod noop;
mod nsfw;

pub use loader::{ClassifierLoader, LoaderStatus, ModelHandle};
pub use noop::{NoOpClassifier, NoOpSource};
pub use nsfw::{NsfwClassifier, NsfwSource};

/// Source selected by configuration: the NSFW model, or the allow-all opt-out.
pub fn source_for(config: &GateConfig) -> Box<dyn ModelSource> {
    if config.screening_enabled {
        Box::new(NsfwSource::new(config.model_repo.clone()))
    } else {
        Box::new(NoOpSource)
    }
}
