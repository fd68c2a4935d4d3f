use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{PreviewRef, PreviewStore};

/// Previews written as files under a temp directory; revoking deletes the file.
pub struct TempDirPreviews {
    dir: PathBuf,
    next_id: AtomicU64,
}

impl Default for TempDirPreviews {
    fn default() -> Self {
        Self::new()
    }
}

impl TempDirPreviews {
    pub fn new() -> Self {
        Self::with_dir(std::env::temp_dir().join("dish-photo-previews"))
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl PreviewStore for TempDirPreviews {
    fn create(&self, bytes: &[u8]) -> Result<PreviewRef> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating preview dir {}", self.dir.display()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let path = self
            .dir
            .join(format!("preview_{}_{:04}", std::process::id(), id));
        fs::write(&path, bytes).with_context(|| format!("writing preview {}", path.display()))?;

        Ok(PreviewRef::new(path.to_string_lossy()))
    }

    fn revoke(&self, preview: &PreviewRef) {
        let path = Path::new(preview.as_str());
        // Only ever delete files we created.
        if path.parent() != Some(self.dir.as_path()) {
            log::warn!("Refusing to revoke foreign preview {}", preview);
            return;
        }
        if let Err(e) = fs::remove_file(path) {
            log::debug!("Preview {} already gone: {}", preview, e);
        }
    }
}
