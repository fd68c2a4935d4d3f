//! Error taxonomy for the screening gate.
//!
//! None of these ever reach the host form as a failure: every kind is settled
//! inside the gate, and the host only sees the two form fields plus an optional
//! [`Rejection`] message.

use std::fmt;

/// Errors that can occur while acquiring or screening an image.
#[derive(Debug, Clone, PartialEq)]
pub enum GateError {
    /// The classifier model could not be loaded.
    InferenceUnavailable(String),
    /// The classifier detected explicit content above the block threshold.
    ContentBlocked { label: String, probability: f32 },
    /// The chosen file or URL could not be decoded or fetched.
    SourceLoad(String),
    /// The image loaded but classification failed (unreadable pixels, model
    /// error, timeout).
    TechnicalClassification(String),
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::InferenceUnavailable(msg) => write!(f, "classifier unavailable: {msg}"),
            GateError::ContentBlocked { label, probability } => {
                write!(f, "content blocked: {label} at {:.1}%", probability * 100.0)
            }
            GateError::SourceLoad(msg) => write!(f, "source did not load: {msg}"),
            GateError::TechnicalClassification(msg) => {
                write!(f, "classification failed: {msg}")
            }
        }
    }
}

impl std::error::Error for GateError {}

impl GateError {
    /// True for failures of the screening machinery itself, as opposed to a
    /// verdict about the image. These are subject to the failure policy.
    pub fn is_technical(&self) -> bool {
        matches!(
            self,
            GateError::InferenceUnavailable(_) | GateError::TechnicalClassification(_)
        )
    }

    /// Human-readable text shown next to the image input.
    pub fn user_message(&self) -> &'static str {
        match self {
            GateError::ContentBlocked { .. } => "Image blocked: inappropriate content.",
            GateError::SourceLoad(_) => "The image did not load. Check the file or URL.",
            GateError::InferenceUnavailable(_) | GateError::TechnicalClassification(_) => {
                "The image could not be verified. Please choose another one."
            }
        }
    }
}

/// Transient rejection surfaced to the user after a failed acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub error: GateError,
    pub message: &'static str,
}

impl From<GateError> for Rejection {
    fn from(error: GateError) -> Self {
        let message = error.user_message();
        Self { error, message }
    }
}
