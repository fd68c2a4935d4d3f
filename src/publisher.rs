//! The only place that writes the approved image back to the host form.

use bytes::Bytes;
use std::fmt;

use crate::error::{GateError, Rejection};
use crate::janitor::{PreviewRef, ResourceJanitor};

/// Locally picked image blob
#[derive(Clone, PartialEq)]
pub struct LocalFile {
    pub name: String,
    pub mime: Option<String>,
    pub bytes: Bytes,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, mime: Option<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime,
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for LocalFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalFile")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Output side of the host form
pub trait HostForm: Send {
    /// Sets the validated image URL; an empty string clears it.
    fn set_url_field(&mut self, value: &str);

    /// Sets the file to upload at submission time, or clears it.
    fn set_pending_upload(&mut self, file: Option<LocalFile>);
}

#[derive(Debug, Clone, PartialEq, Eq, Copy, Default)]
pub enum ValidationState {
    #[default]
    Idle,
    Loading,
    Safe,
    Blocked,
    LoadError,
}

/// Value currently exposed to the host form
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PublishedImage {
    #[default]
    Empty,
    PendingFile(LocalFile),
    Url(String),
}

/// What the host has to do with the image when the recipe is submitted.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Upload the file to the image host and store the returned URL.
    Upload(LocalFile),
    /// Store the URL as-is.
    Url(String),
    None,
}

impl PublishedImage {
    pub fn submission(&self) -> Submission {
        match self {
            PublishedImage::Empty => Submission::None,
            PublishedImage::PendingFile(file) => Submission::Upload(file.clone()),
            PublishedImage::Url(url) => Submission::Url(url.clone()),
        }
    }
}

/// What the host should render next to the input
#[derive(Debug, Clone, PartialEq)]
pub enum Preview {
    Empty,
    Local(PreviewRef),
    Remote(String),
}

pub struct Publisher {
    form: Box<dyn HostForm>,
    published: PublishedImage,
    remote_preview: Option<String>,
    janitor: ResourceJanitor,
    state: ValidationState,
    rejection: Option<Rejection>,
}

impl Publisher {
    pub fn new(form: Box<dyn HostForm>, janitor: ResourceJanitor) -> Self {
        Self {
            form,
            published: PublishedImage::Empty,
            remote_preview: None,
            janitor,
            state: ValidationState::Idle,
            rejection: None,
        }
    }

    pub fn published(&self) -> &PublishedImage {
        &self.published
    }

    pub fn state(&self) -> ValidationState {
        self.state
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        self.rejection.as_ref()
    }

    pub fn preview(&self) -> Preview {
        if let Some(local) = self.janitor.current() {
            Preview::Local(local.clone())
        } else if let Some(url) = &self.remote_preview {
            Preview::Remote(url.clone())
        } else {
            Preview::Empty
        }
    }

    /// Writes `value` to the host. Both fields are written every time, so
    /// setting one channel always clears the other.
    pub fn publish(&mut self, value: PublishedImage) {
        match &value {
            PublishedImage::Empty => {
                self.form.set_pending_upload(None);
                self.form.set_url_field("");
            }
            PublishedImage::PendingFile(file) => {
                self.form.set_url_field("");
                self.form.set_pending_upload(Some(file.clone()));
            }
            PublishedImage::Url(url) => {
                self.form.set_pending_upload(None);
                self.form.set_url_field(url);
            }
        }
        self.published = value;
    }

    /// Adopts a URL the host form already holds, without writing it back.
    pub fn seed_url(&mut self, url: &str) {
        self.janitor.revoke();
        self.published = PublishedImage::Url(url.to_string());
        self.remote_preview = Some(url.to_string());
    }

    /// Shows the already published URL as preview, without any form write.
    pub fn preview_published_url(&mut self) {
        if let PublishedImage::Url(url) = &self.published {
            self.janitor.revoke();
            self.remote_preview = Some(url.clone());
        }
    }

    pub fn show_local(&mut self, bytes: &[u8]) -> Result<(), GateError> {
        self.remote_preview = None;
        self.janitor
            .replace(bytes)
            .map(|_| ())
            .map_err(|e| GateError::SourceLoad(format!("preview: {e}")))
    }

    pub fn show_remote(&mut self, url: &str) {
        self.janitor.revoke();
        self.remote_preview = Some(url.to_string());
    }

    /// Drops a pending file and its local preview. A published URL is kept.
    pub fn discard_pending_file(&mut self) {
        if matches!(self.published, PublishedImage::PendingFile(_)) {
            self.form.set_pending_upload(None);
            self.published = PublishedImage::Empty;
        }
        self.janitor.revoke();
    }

    pub fn begin_loading(&mut self) {
        self.state = ValidationState::Loading;
        self.rejection = None;
    }

    /// Takes back a URL published while its check was still in flight.
    pub fn withdraw_unconfirmed_url(&mut self) {
        if self.state == ValidationState::Loading && matches!(self.published, PublishedImage::Url(_)) {
            self.publish(PublishedImage::Empty);
            self.remote_preview = None;
        }
    }

    /// Abandons an in-flight attempt whose result will be discarded.
    pub fn abandon_loading(&mut self) {
        if self.state == ValidationState::Loading {
            self.state = ValidationState::Idle;
        }
    }

    /// Publishes `value` as the approved image.
    pub fn accept(&mut self, value: PublishedImage) {
        self.publish(value);
        self.confirm();
    }

    /// Marks the already published value as approved.
    pub fn confirm(&mut self) {
        self.state = ValidationState::Safe;
        self.rejection = None;
    }

    /// Clears everything and records why.
    pub fn reject(&mut self, state: ValidationState, error: GateError) {
        self.clear();
        self.state = state;
        self.rejection = Some(error.into());
    }

    pub fn clear(&mut self) {
        self.publish(PublishedImage::Empty);
        self.remote_preview = None;
        self.janitor.revoke();
        self.state = ValidationState::Idle;
        self.rejection = None;
    }

    /// Releases the preview without touching the host form.
    pub fn teardown(&mut self) {
        self.janitor.revoke();
        self.remote_preview = None;
    }
}
