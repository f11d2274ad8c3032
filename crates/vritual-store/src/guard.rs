//! MemoryGuard — validate, snapshot, and diff the persisted document.
//!
//! Reports problems; never rewrites the document itself.

use std::path::{Path, PathBuf};

use tracing::info;
use vritual_core::{Error, MemoryDocument, Result};

use crate::store::{load_document, write_atomic};

pub struct MemoryGuard {
    document: PathBuf,
    snapshot: PathBuf,
}

impl MemoryGuard {
    pub fn new(document: impl Into<PathBuf>, snapshot: impl Into<PathBuf>) -> Self {
        Self {
            document: document.into(),
            snapshot: snapshot.into(),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot
    }

    /// Parse the document. Missing is valid (the skeleton applies).
    pub async fn validate(&self) -> Result<()> {
        load_document(&self.document).await.map(|_| ())
    }

    /// Copy the document to the snapshot path. Returns false if there is no
    /// document yet. A corrupt document is not snapshotted.
    pub async fn save_snapshot(&self) -> Result<bool> {
        let bytes = match tokio::fs::read(&self.document).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice::<MemoryDocument>(&bytes)
            .map_err(|e| Error::corrupt_state(&self.document, e.to_string()))?;
        write_atomic(&self.snapshot, &bytes).await?;
        info!("Memory snapshot saved to {}", self.snapshot.display());
        Ok(true)
    }

    /// Top-level sections that differ between the snapshot and the document.
    pub async fn drift(&self) -> Result<Vec<&'static str>> {
        let current = load_document(&self.document).await?;
        let snapshot = load_document(&self.snapshot).await?;
        Ok(diff_sections(&snapshot, &current))
    }
}

pub fn diff_sections(before: &MemoryDocument, after: &MemoryDocument) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if before.rituals != after.rituals {
        changed.push("rituals");
    }
    if before.loops != after.loops {
        changed.push("loops");
    }
    if before.reactions != after.reactions {
        changed.push("reactions");
    }
    if before.system_state != after.system_state {
        changed.push("system_state");
    }
    if before.extra != after.extra {
        changed.push("extra");
    }
    changed
}
