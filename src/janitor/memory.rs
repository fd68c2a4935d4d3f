use anyhow::Result;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{PreviewRef, PreviewStore};

const PREFIX: &str = "preview:";

/// In-process blob registry handing out `preview:N` references
#[derive(Default)]
pub struct MemoryPreviews {
    next_id: AtomicU64,
    blobs: Mutex<HashMap<u64, Bytes>>,
}

impl MemoryPreviews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of previews not yet revoked
    pub fn live(&self) -> usize {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Bytes behind a live reference, for rendering.
    pub fn get(&self, preview: &PreviewRef) -> Option<Bytes> {
        let id = parse_id(preview)?;
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }
}

fn parse_id(preview: &PreviewRef) -> Option<u64> {
    preview.as_str().strip_prefix(PREFIX)?.parse().ok()
}

impl PreviewStore for MemoryPreviews {
    fn create(&self, bytes: &[u8]) -> Result<PreviewRef> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Bytes::copy_from_slice(bytes));
        Ok(PreviewRef::new(format!("{PREFIX}{id}")))
    }

    fn revoke(&self, preview: &PreviewRef) {
        if let Some(id) = parse_id(preview) {
            self.blobs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
        }
    }
}
