//! Bounded rolling logs — one JSON array file per monitor, capped at last N.
//!
//! Logs are derived output. They are never read back for control decisions,
//! but a log file that no longer parses is reported rather than overwritten.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use vritual_core::{Error, Result};

use crate::store::write_atomic;

pub struct RollingLog<T> {
    path: PathBuf,
    cap: usize,
    lock: Arc<Mutex<()>>,
    _entry: PhantomData<fn() -> T>,
}

impl<T> Clone for RollingLog<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            cap: self.cap,
            lock: self.lock.clone(),
            _entry: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> RollingLog<T> {
    pub fn new(path: impl Into<PathBuf>, cap: usize) -> Self {
        Self {
            path: path.into(),
            cap: cap.max(1),
            lock: Arc::new(Mutex::new(())),
            _entry: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Append one entry, keeping only the newest `cap`.
    pub async fn append(&self, entry: &T) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_raw().await?;
        entries.push(serde_json::to_value(entry)?);
        if entries.len() > self.cap {
            let excess = entries.len() - self.cap;
            entries.drain(..excess);
        }
        let json = serde_json::to_vec_pretty(&entries)?;
        write_atomic(&self.path, &json).await
    }

    /// All retained entries, oldest first.
    pub async fn entries(&self) -> Result<Vec<T>> {
        let _guard = self.lock.lock().await;
        self.read_raw()
            .await?
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(Error::from))
            .collect()
    }

    async fn read_raw(&self) -> Result<Vec<serde_json::Value>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| Error::corrupt_state(&self.path, e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}
