use anyhow::Result;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;

use super::{ClassificationResult, Classifier, ModelSource, Prediction};
use crate::decoder::DecodedImage;

/// No-op classifier that always returns safe - for opt-out
pub struct NoOpClassifier;

impl Classifier for NoOpClassifier {
    fn classify<'a>(&'a self, _image: &'a DecodedImage) -> BoxFuture<'a, Result<ClassificationResult>> {
        async { Ok(ClassificationResult::new(vec![Prediction::new("Neutral", 1.0)])) }.boxed()
    }
}

/// Source that never fails and yields [`NoOpClassifier`]
pub struct NoOpSource;

impl ModelSource for NoOpSource {
    fn load(&self) -> BoxFuture<'_, Result<Arc<dyn Classifier>>> {
        async { Ok(Arc::new(NoOpClassifier) as Arc<dyn Classifier>) }.boxed()
    }
}
