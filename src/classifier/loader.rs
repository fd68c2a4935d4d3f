use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use log::{info, warn};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use super::{ClassificationResult, Classifier, ModelSource};
use crate::decoder::DecodedImage;
use crate::error::GateError;

/// Shared read-only reference to a loaded classifier
#[derive(Clone)]
pub struct ModelHandle(Arc<dyn Classifier>);

impl ModelHandle {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self(classifier)
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ModelHandle(..)")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoaderStatus {
    NotLoaded,
    Ready,
    Unavailable(String),
}

type SharedLoad = Shared<BoxFuture<'static, Option<ModelHandle>>>;

/// Loads the classifier at most once and shares it.
///
/// The load runs in its own task, so callers that stop waiting do not cancel
/// it, and every [`acquire`](ClassifierLoader::acquire) joins the same load. A
/// failed load is remembered; the handle then stays unset for the lifetime of
/// the loader and callers apply their failure policy.
pub struct ClassifierLoader {
    source: Arc<dyn ModelSource>,
    load: Mutex<Option<SharedLoad>>,
    outcome: Arc<OnceLock<Option<ModelHandle>>>,
    failure: Arc<Mutex<Option<String>>>,
    inference_timeout: Duration,
}

impl ClassifierLoader {
    pub fn new(source: Box<dyn ModelSource>, inference_timeout: Duration) -> Self {
        Self {
            source: Arc::from(source),
            load: Mutex::new(None),
            outcome: Arc::new(OnceLock::new()),
            failure: Arc::new(Mutex::new(None)),
            inference_timeout,
        }
    }

    pub async fn acquire(&self) -> Option<ModelHandle> {
        if let Some(handle) = self.outcome.get() {
            return handle.clone();
        }
        self.shared_load().await
    }

    /// [`acquire`](ClassifierLoader::acquire) bounded by the inference timeout.
    /// A load still running when the timeout expires keeps running for later
    /// attempts; this attempt gets [`GateError::InferenceUnavailable`].
    pub async fn acquire_bounded(&self) -> Result<Option<ModelHandle>, GateError> {
        tokio::time::timeout(self.inference_timeout, self.acquire())
            .await
            .map_err(|_| {
                GateError::InferenceUnavailable(format!(
                    "model still loading after {}s",
                    self.inference_timeout.as_secs()
                ))
            })
    }

    fn shared_load(&self) -> SharedLoad {
        let mut slot = self.load.lock().unwrap_or_else(PoisonError::into_inner);
        slot.get_or_insert_with(|| {
            let source = Arc::clone(&self.source);
            let outcome = Arc::clone(&self.outcome);
            let failure = Arc::clone(&self.failure);
            let task = tokio::spawn(async move {
                let handle = match source.load().await {
                    Ok(classifier) => {
                        info!("Classifier loaded");
                        Some(ModelHandle::new(classifier))
                    }
                    Err(e) => {
                        warn!("Classifier unavailable ({}), screening falls back to policy", e);
                        *failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(e.to_string());
                        None
                    }
                };
                let _ = outcome.set(handle.clone());
                handle
            });

            let failure = Arc::clone(&self.failure);
            async move {
                task.await.unwrap_or_else(|e| {
                    warn!("Classifier load task failed: {}", e);
                    *failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(e.to_string());
                    None
                })
            }
            .boxed()
            .shared()
        })
        .clone()
    }

    /// Reason the load failed, if it did.
    pub fn load_failure(&self) -> Option<String> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> LoaderStatus {
        match self.outcome.get() {
            None => LoaderStatus::NotLoaded,
            Some(Some(_)) => LoaderStatus::Ready,
            Some(None) => LoaderStatus::Unavailable(self.load_failure().unwrap_or_default()),
        }
    }

    /// Runs one bounded classification. An unset handle is
    /// [`GateError::InferenceUnavailable`]; classifier errors and timeouts are
    /// [`GateError::TechnicalClassification`].
    pub async fn classify(
        &self,
        handle: Option<&ModelHandle>,
        image: &DecodedImage,
    ) -> Result<ClassificationResult, GateError> {
        let Some(ModelHandle(classifier)) = handle else {
            return Err(GateError::InferenceUnavailable(
                self.load_failure().unwrap_or_else(|| "model not loaded".into()),
            ));
        };

        match tokio::time::timeout(self.inference_timeout, classifier.classify(image)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(GateError::TechnicalClassification(e.to_string())),
            Err(_) => Err(GateError::TechnicalClassification(format!(
                "inference timed out after {}s",
                self.inference_timeout.as_secs()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Prediction, ScreeningRules};
    use crate::config::GateConfig;
    use crate::testing::{ScriptedClassifier, ScriptedSource, surface};
    use std::sync::atomic::Ordering;

    fn loader(source: ScriptedSource) -> ClassifierLoader {
        ClassifierLoader::new(Box::new(source), Duration::from_secs(10))
    }

    #[tokio::test]
    async fn concurrent_acquires_share_one_load() {
        let source = ScriptedSource::ready(ScriptedClassifier::new());
        let loads = source.load_counter();
        let loader = loader(source);

        let (a, b, c) = tokio::join!(loader.acquire(), loader.acquire(), loader.acquire());

        assert!(a.is_some() && b.is_some() && c.is_some());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(loader.status(), LoaderStatus::Ready);
    }

    #[tokio::test]
    async fn failed_load_is_recorded_and_not_retried() {
        let source = ScriptedSource::offline();
        let loads = source.load_counter();
        let loader = loader(source);

        assert!(loader.acquire().await.is_none());
        assert!(loader.acquire().await.is_none());

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(matches!(loader.status(), LoaderStatus::Unavailable(msg) if msg.contains("network")));
    }

    #[tokio::test]
    async fn unset_handle_is_inference_unavailable() {
        let loader = loader(ScriptedSource::offline());
        let handle = loader.acquire().await;
        let err = loader.classify(handle.as_ref(), &surface(1)).await.unwrap_err();
        assert!(matches!(err, GateError::InferenceUnavailable(msg) if msg.contains("network")));
    }

    #[tokio::test]
    async fn same_image_same_handle_same_verdict() {
        let classifier = ScriptedClassifier::new();
        classifier.respond(7, vec![Prediction::new("Hentai", 0.81), Prediction::new("Drawing", 0.19)]);
        let loader = loader(ScriptedSource::ready(classifier.clone()));
        let rules = ScreeningRules::from(&GateConfig::default());

        let handle = loader.acquire().await;
        let image = surface(7);
        let first = loader.classify(handle.as_ref(), &image).await.expect("classify");
        let second = loader.classify(handle.as_ref(), &image).await.expect("classify");

        assert_eq!(first.verdict(&rules), second.verdict(&rules));
        assert_eq!(classifier.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_inference_times_out() {
        let classifier = ScriptedClassifier::new();
        classifier.hang(3);
        let loader = ClassifierLoader::new(
            Box::new(ScriptedSource::ready(classifier)),
            Duration::from_secs(2),
        );

        let handle = loader.acquire().await;
        let err = loader.classify(handle.as_ref(), &surface(3)).await.unwrap_err();
        assert_eq!(
            err,
            GateError::TechnicalClassification("inference timed out after 2s".into())
        );
    }

    #[tokio::test]
    async fn classifier_errors_are_technical() {
        let classifier = ScriptedClassifier::new();
        classifier.fail(9, "tensor shape mismatch");
        let loader = loader(ScriptedSource::ready(classifier));

        let handle = loader.acquire().await;
        let err = loader.classify(handle.as_ref(), &surface(9)).await.unwrap_err();
        assert!(err.is_technical());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_load_is_bounded_and_keeps_running() {
        let source = ScriptedSource::hanging();
        let loads = source.load_counter();
        let loader = ClassifierLoader::new(Box::new(source), Duration::from_secs(2));

        let first = loader.acquire_bounded().await.unwrap_err();
        assert!(matches!(first, GateError::InferenceUnavailable(msg) if msg.contains("still loading")));
        assert!(loader.acquire_bounded().await.is_err());

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(loader.status(), LoaderStatus::NotLoaded);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_load_finishes_after_an_abandoned_attempt() {
        let source = ScriptedSource::delayed(ScriptedClassifier::new(), Duration::from_secs(5));
        let loads = source.load_counter();
        let loader = ClassifierLoader::new(Box::new(source), Duration::from_secs(2));

        assert!(loader.acquire_bounded().await.is_err());
        tokio::time::sleep(Duration::from_secs(4)).await;

        assert!(matches!(loader.acquire_bounded().await, Ok(Some(_))));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(loader.status(), LoaderStatus::Ready);
    }
}
