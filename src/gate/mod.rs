//! Screening gate in front of the host form's image field.
//!
//! Every acquisition (file pick, URL edit, mode switch, clear) advances a
//! generation counter. A pipeline remembers the generation it started under and
//! applies its result only if that is still current, so a late classification
//! for a superseded source is dropped instead of overwriting newer state.

use log::{debug, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::classifier::{self, ClassifierLoader, ScreeningRules, Verdict};
use crate::config::{FailurePolicy, GateConfig};
use crate::decoder::{DecodedImage, Decoder, HttpDecoder};
use crate::error::{GateError, Rejection};
use crate::janitor::{PreviewStore, ResourceJanitor, TempDirPreviews};
use crate::mode::{Mode, ModeSelector};
use crate::publisher::{HostForm, Preview, PublishedImage, Publisher, ValidationState};

mod remote;
mod upload;

/// How an acquisition ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// The result was applied and left the gate in this state.
    Applied(ValidationState),
    /// A newer acquisition started first; the result was discarded.
    Superseded,
    /// The gate was torn down.
    Closed,
}

/// Collaborators a gate is assembled from
pub struct GateParts {
    pub loader: Arc<ClassifierLoader>,
    pub decoder: Arc<dyn Decoder>,
    pub previews: Arc<dyn PreviewStore>,
    pub form: Box<dyn HostForm>,
}

enum Decision {
    Accept,
    Reject(GateError),
}

struct GateState {
    selector: ModeSelector,
    generation: u64,
    publisher: Publisher,
    closed: bool,
}

impl GateState {
    fn advance(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn enter(&mut self, mode: Mode) {
        let Some(left) = self.selector.switch(mode) else {
            return;
        };
        self.advance();
        if left == Mode::Url {
            self.publisher.withdraw_unconfirmed_url();
        }
        self.publisher.abandon_loading();
        if left == Mode::Upload {
            self.publisher.discard_pending_file();
        }
        if mode == Mode::Url {
            self.publisher.preview_published_url();
        }
    }
}

pub struct ImageGate {
    failure_policy: FailurePolicy,
    max_image_bytes: Option<usize>,
    rules: ScreeningRules,
    loader: Arc<ClassifierLoader>,
    decoder: Arc<dyn Decoder>,
    state: Mutex<GateState>,
}

impl ImageGate {
    pub fn new(config: GateConfig, parts: GateParts) -> Self {
        let janitor = ResourceJanitor::new(parts.previews);
        Self {
            failure_policy: config.failure_policy,
            max_image_bytes: config.max_image_bytes,
            rules: ScreeningRules::from(&config),
            loader: parts.loader,
            decoder: parts.decoder,
            state: Mutex::new(GateState {
                selector: ModeSelector::default(),
                generation: 0,
                publisher: Publisher::new(parts.form, janitor),
                closed: false,
            }),
        }
    }

    /// Gate with the production collaborators: the configured model source,
    /// the HTTP decoder and temp-dir previews.
    pub fn from_config(config: GateConfig, form: Box<dyn HostForm>) -> Result<Self, GateError> {
        let loader = Arc::new(ClassifierLoader::new(
            classifier::source_for(&config),
            config.inference_timeout(),
        ));
        let decoder = Arc::new(HttpDecoder::new(config.fetch_timeout())?);
        Ok(Self::new(
            config,
            GateParts {
                loader,
                decoder,
                previews: Arc::new(TempDirPreviews::new()),
                form,
            },
        ))
    }

    /// Adopts the value the host form already holds (editing an existing
    /// recipe). An `http(s)` URL puts the gate in URL mode with that URL
    /// published; nothing is written back to the form. Whatever the gate held
    /// before is dropped and in-flight results are discarded.
    pub fn seed(&self, existing: &str) {
        let existing = existing.trim();
        if !(existing.starts_with("http://") || existing.starts_with("https://")) {
            return;
        }
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.enter(Mode::Url);
        state.advance();
        state.publisher.abandon_loading();
        state.publisher.seed_url(existing);
    }

    pub fn switch_mode(&self, mode: Mode) {
        let mut state = self.lock();
        if !state.closed {
            state.enter(mode);
        }
    }

    /// Removes the image entirely.
    pub fn clear(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.advance();
        state.publisher.clear();
    }

    /// Revokes outstanding resources. Every later call is a no-op and in-flight
    /// acquisitions settle as [`Settled::Closed`].
    pub fn teardown(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.advance();
        state.closed = true;
        state.publisher.teardown();
    }

    pub fn mode(&self) -> Mode {
        self.lock().selector.active()
    }

    pub fn state(&self) -> ValidationState {
        self.lock().publisher.state()
    }

    pub fn published(&self) -> PublishedImage {
        self.lock().publisher.published().clone()
    }

    pub fn preview(&self) -> Preview {
        self.lock().publisher.preview()
    }

    pub fn rejection(&self) -> Option<Rejection> {
        self.lock().publisher.rejection().cloned()
    }

    pub fn loader(&self) -> &ClassifierLoader {
        &self.loader
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn screen(&self, image: &DecodedImage) -> Result<Verdict, GateError> {
        let handle = self.loader.acquire_bounded().await?;
        let result = self.loader.classify(handle.as_ref(), image).await?;
        Ok(result.verdict(&self.rules))
    }

    fn decide(&self, screened: Result<Verdict, GateError>, source: &str) -> Decision {
        match screened {
            Ok(Verdict::Safe) => Decision::Accept,
            Ok(Verdict::Blocked { label, probability }) => {
                warn!("BLOCKED: {} ({} at {:.1}%)", source, label, probability * 100.0);
                Decision::Reject(GateError::ContentBlocked { label, probability })
            }
            Err(err) => match self.failure_policy {
                FailurePolicy::FailOpen => {
                    warn!("Could not screen {} ({}), allowing it", source, err);
                    Decision::Accept
                }
                FailurePolicy::FailClosed => {
                    warn!("Could not screen {} ({}), rejecting it", source, err);
                    Decision::Reject(err)
                }
            },
        }
    }

    /// Applies `apply` only if `ticket` is still the current generation.
    fn settle(&self, ticket: u64, apply: impl FnOnce(&mut Publisher)) -> Settled {
        let mut state = self.lock();
        if state.closed {
            return Settled::Closed;
        }
        if state.generation != ticket {
            debug!(
                "Discarding result of acquisition #{} (current #{})",
                ticket, state.generation
            );
            return Settled::Superseded;
        }
        apply(&mut state.publisher);
        Settled::Applied(state.publisher.state())
    }
}
