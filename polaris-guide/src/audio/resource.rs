//! Transient audio resources
//!
//! Each synthesized clip is materialized into a resource that must be
//! released explicitly. [`AudioResource`] is neither `Clone` nor `Copy` and
//! [`ResourceStore::release`] consumes it, so a resource can be released at
//! most once.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Backing resource of one playable clip
#[derive(Debug)]
pub struct AudioResource {
    id: Uuid,
    path: PathBuf,
    len: usize,
}

impl AudioResource {
    pub fn new(id: Uuid, path: PathBuf, len: usize) -> Self {
        Self { id, path, len }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Locator handed to the output backend
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub trait ResourceStore: Send + Sync {
    /// Acquire a resource holding `bytes`
    fn materialize(&self, bytes: &[u8], content_type: &str) -> Result<AudioResource>;

    /// Give the resource back
    fn release(&self, resource: AudioResource);
}

/// File extension the decoder can use as a format hint
pub fn extension_for(content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" | "audio/opus" => "ogg",
        "audio/flac" => "flac",
        _ => "bin",
    }
}

/// Spool directory holding one file per live clip
pub struct SpoolDir {
    dir: PathBuf,
    live: AtomicUsize,
}

impl SpoolDir {
    /// Create the directory, deleting files left behind by an earlier run
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut purged = 0;
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() {
                std::fs::remove_file(&path)?;
                purged += 1;
            }
        }
        if purged > 0 {
            info!("Purged {} stale audio files from {}", purged, dir.display());
        }

        Ok(Self {
            dir,
            live: AtomicUsize::new(0),
        })
    }

    /// Number of materialized, not yet released resources
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ResourceStore for SpoolDir {
    fn materialize(&self, bytes: &[u8], content_type: &str) -> Result<AudioResource> {
        let id = Uuid::new_v4();
        let path = self
            .dir
            .join(format!("{}.{}", id, extension_for(content_type)));

        std::fs::write(&path, bytes)
            .map_err(|e| Error::Audio(format!("Failed to spool clip: {}", e)))?;
        self.live.fetch_add(1, Ordering::SeqCst);

        debug!(%id, bytes = bytes.len(), "Materialized audio resource");
        Ok(AudioResource::new(id, path, bytes.len()))
    }

    fn release(&self, resource: AudioResource) {
        if let Err(e) = std::fs::remove_file(&resource.path) {
            warn!(id = %resource.id, "Failed to remove spooled clip: {}", e);
        }
        self.live.fetch_sub(1, Ordering::SeqCst);
        debug!(id = %resource.id, "Released audio resource");
    }
}
