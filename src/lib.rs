//! Screens dish photos for explicit content before a reference to them is
//! handed to the recipe form.
//!
//! An [`ImageGate`] sits between the image input and the form. The user either
//! picks a local file ([`ImageGate::select_file`]) or types a URL
//! ([`ImageGate::enter_url`]); the gate decodes the image, runs the classifier
//! and only then publishes the file (as pending upload) or the URL to the
//! [`HostForm`]. At most one of the two is ever set.

pub mod classifier;
pub mod config;
pub mod decoder;
pub mod error;
pub mod gate;
pub mod janitor;
pub mod logging;
pub mod mode;
pub mod publisher;

#[cfg(test)]
mod testing;

pub use classifier::{ClassificationResult, Classifier, ClassifierLoader, ModelHandle, ModelSource, Prediction, Verdict};
pub use config::{FailurePolicy, GateConfig};
pub use decoder::{DecodedImage, Decoder, HttpDecoder, RemoteImage};
pub use error::{GateError, Rejection};
pub use gate::{GateParts, ImageGate, Settled};
pub use janitor::{MemoryPreviews, PreviewRef, PreviewStore, TempDirPreviews};
pub use mode::Mode;
pub use publisher::{HostForm, LocalFile, Preview, PublishedImage, Submission, ValidationState};
