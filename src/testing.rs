//! Fakes shared by the unit tests.

use anyhow::{Result, anyhow};
use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use crate::classifier::{ClassificationResult, Classifier, ClassifierLoader, ModelSource, Prediction};
use crate::config::GateConfig;
use crate::decoder::{DecodedImage, Decoder, RemoteImage};
use crate::error::GateError;
use crate::gate::{GateParts, ImageGate};
use crate::janitor::MemoryPreviews;
use crate::publisher::{HostForm, LocalFile};

/// 1x1 surface whose colour channels carry `tone`; the scripted classifier keys on it.
pub fn surface(tone: u8) -> DecodedImage {
    DecodedImage {
        rgba: vec![tone, tone, tone, 255],
        width: 1,
        height: 1,
    }
}

/// File whose first byte is the tone its decoded surface will carry.
pub fn file(name: &str, tone: u8) -> LocalFile {
    LocalFile::new(name, Some("image/jpeg".into()), Bytes::from(vec![tone, 0xd8, 0xff]))
}

pub fn corrupt_file(name: &str) -> LocalFile {
    LocalFile::new(name, Some("image/png".into()), Bytes::from_static(b"corrupt"))
}

#[derive(Clone)]
enum Script {
    Predict(Vec<Prediction>),
    Fail(String),
    Hang,
    Held(Vec<Prediction>, Arc<Notify>),
}

/// Classifier answering per surface tone. Unscripted tones come back Neutral.
#[derive(Default)]
pub struct ScriptedClassifier {
    scripts: Mutex<HashMap<u8, Script>>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, tone: u8, predictions: Vec<Prediction>) {
        self.script(tone, Script::Predict(predictions));
    }

    pub fn fail(&self, tone: u8, reason: &str) {
        self.script(tone, Script::Fail(reason.to_string()));
    }

    pub fn hang(&self, tone: u8) {
        self.script(tone, Script::Hang);
    }

    /// Answers with `predictions` only once the returned notify fires.
    pub fn hold(&self, tone: u8, predictions: Vec<Prediction>) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        self.script(tone, Script::Held(predictions, release.clone()));
        release
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn script(&self, tone: u8, script: Script) {
        self.scripts.lock().unwrap().insert(tone, script);
    }
}

impl Classifier for ScriptedClassifier {
    fn classify<'a>(&'a self, image: &'a DecodedImage) -> BoxFuture<'a, Result<ClassificationResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tone = image.rgba.first().copied().unwrap_or_default();
        let script = self.scripts.lock().unwrap().get(&tone).cloned();
        async move {
            match script {
                None => Ok(ClassificationResult::new(vec![
                    Prediction::new("Neutral", 0.95),
                    Prediction::new("Drawing", 0.03),
                ])),
                Some(Script::Predict(p)) => Ok(ClassificationResult::new(p)),
                Some(Script::Fail(reason)) => Err(anyhow!(reason)),
                Some(Script::Hang) => futures::future::pending().await,
                Some(Script::Held(p, release)) => {
                    release.notified().await;
                    Ok(ClassificationResult::new(p))
                }
            }
        }
        .boxed()
    }
}

/// Model source that counts loads and either yields the scripted classifier
/// or fails like an offline download.
#[derive(Clone, Copy)]
enum LoadPace {
    Prompt,
    After(Duration),
    Never,
}

pub struct ScriptedSource {
    classifier: Option<Arc<ScriptedClassifier>>,
    pace: LoadPace,
    loads: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn ready(classifier: Arc<ScriptedClassifier>) -> Self {
        Self {
            classifier: Some(classifier),
            pace: LoadPace::Prompt,
            loads: Arc::default(),
        }
    }

    pub fn offline() -> Self {
        Self {
            classifier: None,
            pace: LoadPace::Prompt,
            loads: Arc::default(),
        }
    }

    /// Succeeds once `delay` has passed.
    pub fn delayed(classifier: Arc<ScriptedClassifier>, delay: Duration) -> Self {
        Self {
            pace: LoadPace::After(delay),
            ..Self::ready(classifier)
        }
    }

    /// Never finishes loading.
    pub fn hanging() -> Self {
        Self {
            pace: LoadPace::Never,
            ..Self::offline()
        }
    }

    pub fn load_counter(&self) -> Arc<AtomicUsize> {
        self.loads.clone()
    }
}

impl ModelSource for ScriptedSource {
    fn load(&self) -> BoxFuture<'_, Result<Arc<dyn Classifier>>> {
        async move {
            self.loads.fetch_add(1, Ordering::SeqCst);
            match self.pace {
                LoadPace::Prompt => tokio::task::yield_now().await,
                LoadPace::After(delay) => tokio::time::sleep(delay).await,
                LoadPace::Never => futures::future::pending::<()>().await,
            }
            match &self.classifier {
                Some(c) => Ok(c.clone() as Arc<dyn Classifier>),
                None => Err(anyhow!("network error fetching model")),
            }
        }
        .boxed()
    }
}

#[derive(Clone)]
enum UrlScript {
    Tone(u8),
    Broken,
    Opaque,
}

/// Decoder without I/O. Blobs starting with `corrupt` fail; URLs are scripted.
#[derive(Default)]
pub struct FakeDecoder {
    urls: Mutex<HashMap<String, UrlScript>>,
}

impl FakeDecoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn url_tone(&self, url: &str, tone: u8) {
        self.urls.lock().unwrap().insert(url.into(), UrlScript::Tone(tone));
    }

    pub fn url_broken(&self, url: &str) {
        self.urls.lock().unwrap().insert(url.into(), UrlScript::Broken);
    }

    pub fn url_opaque(&self, url: &str) {
        self.urls.lock().unwrap().insert(url.into(), UrlScript::Opaque);
    }
}

impl Decoder for FakeDecoder {
    fn decode<'a>(&'a self, bytes: &'a [u8]) -> BoxFuture<'a, Result<DecodedImage, GateError>> {
        async move {
            match bytes.first() {
                Some(_) if bytes.starts_with(b"corrupt") => {
                    Err(GateError::SourceLoad("unrecognised image format".into()))
                }
                Some(tone) => Ok(surface(*tone)),
                None => Err(GateError::SourceLoad("empty file".into())),
            }
        }
        .boxed()
    }

    fn load_url<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<RemoteImage, GateError>> {
        let script = self.urls.lock().unwrap().get(url).cloned();
        async move {
            match script.unwrap_or(UrlScript::Tone(0)) {
                UrlScript::Tone(tone) => Ok(RemoteImage::Readable(surface(tone))),
                UrlScript::Broken => Err(GateError::SourceLoad("404 Not Found".into())),
                UrlScript::Opaque => Ok(RemoteImage::Opaque("pixels not readable".into())),
            }
        }
        .boxed()
    }
}

#[derive(Default)]
pub struct FormFields {
    pub url: String,
    pub pending: Option<LocalFile>,
    pub writes: usize,
}

/// Host form that records every write into shared fields.
pub struct RecordingForm(Arc<Mutex<FormFields>>);

impl HostForm for RecordingForm {
    fn set_url_field(&mut self, value: &str) {
        let mut fields = self.0.lock().unwrap();
        fields.url = value.to_string();
        fields.writes += 1;
    }

    fn set_pending_upload(&mut self, file: Option<LocalFile>) {
        let mut fields = self.0.lock().unwrap();
        fields.pending = file;
        fields.writes += 1;
    }
}

#[derive(Clone)]
pub struct FormProbe(Arc<Mutex<FormFields>>);

impl FormProbe {
    pub fn url(&self) -> String {
        self.0.lock().unwrap().url.clone()
    }

    pub fn pending_name(&self) -> Option<String> {
        self.0.lock().unwrap().pending.as_ref().map(|f| f.name.clone())
    }

    pub fn writes(&self) -> usize {
        self.0.lock().unwrap().writes
    }

    /// At most one of the two host fields is filled.
    pub fn assert_exclusive(&self) {
        let fields = self.0.lock().unwrap();
        assert!(
            fields.url.is_empty() || fields.pending.is_none(),
            "both channels set: url={:?} pending={:?}",
            fields.url,
            fields.pending.as_ref().map(|f| &f.name)
        );
    }
}

pub fn recording_form() -> (RecordingForm, FormProbe) {
    let fields = Arc::new(Mutex::new(FormFields::default()));
    (RecordingForm(fields.clone()), FormProbe(fields))
}

pub struct Harness {
    pub gate: ImageGate,
    pub form: FormProbe,
    pub previews: Arc<MemoryPreviews>,
    pub decoder: Arc<FakeDecoder>,
}

pub fn harness(config: GateConfig, source: ScriptedSource) -> Harness {
    let (form, probe) = recording_form();
    let previews = Arc::new(MemoryPreviews::new());
    let decoder = FakeDecoder::new();
    let loader = Arc::new(ClassifierLoader::new(Box::new(source), config.inference_timeout()));
    let gate = ImageGate::new(
        config,
        GateParts {
            loader,
            decoder: decoder.clone(),
            previews: previews.clone(),
            form: Box::new(form),
        },
    );
    Harness {
        gate,
        form: probe,
        previews,
        decoder,
    }
}
