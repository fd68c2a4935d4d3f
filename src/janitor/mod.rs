//! Single-slot ownership of the temporary preview resource.
//!
//! A preview is a short-lived local reference to the picked blob, handed to the
//! host only so it can render it before upload. The janitor keeps at most one
//! alive: every new preview revokes the previous one first, and dropping the
//! janitor revokes the last one.

use anyhow::Result;
use std::fmt;
use std::sync::Arc;

/// Reference to a temporary preview resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewRef(String);

impl PreviewRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PreviewRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backing store for preview resources
pub trait PreviewStore: Send + Sync {
    fn create(&self, bytes: &[u8]) -> Result<PreviewRef>;

    /// Revoking an unknown or already revoked reference is a no-op.
    fn revoke(&self, preview: &PreviewRef);
}

pub struct ResourceJanitor {
    store: Arc<dyn PreviewStore>,
    slot: Option<PreviewRef>,
}

impl ResourceJanitor {
    pub fn new(store: Arc<dyn PreviewStore>) -> Self {
        Self { store, slot: None }
    }

    pub fn current(&self) -> Option<&PreviewRef> {
        self.slot.as_ref()
    }

    /// Revokes the held preview, then creates one for `bytes`. On failure the
    /// slot is left empty.
    pub fn replace(&mut self, bytes: &[u8]) -> Result<PreviewRef> {
        self.revoke();
        let preview = self.store.create(bytes)?;
        self.slot = Some(preview.clone());
        Ok(preview)
    }

    pub fn revoke(&mut self) {
        if let Some(preview) = self.slot.take() {
            log::debug!("Revoking preview {}", preview);
            self.store.revoke(&preview);
        }
    }
}

impl Drop for ResourceJanitor {
    fn drop(&mut self) {
        self.revoke();
    }
}

mod memory;
mod temp_dir;

pub use memory::MemoryPreviews;
pub use temp_dir::TempDirPreviews;
