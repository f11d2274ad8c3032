//! Identity presets — named bundles of rituals and emotion bias.
//!
//! A preset lives at `<presets_dir>/<name>.json`:
//!
//! ```json
//! { "rituals": [ { "name": "dawn", "trigger": {"hour": 6}, "effect": "greet" } ],
//!   "emotion_bias": ["calm"] }
//! ```

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use vritual_core::{Error, MemoryDocument, Result, RitualRecord, Timestamp};
use vritual_store::StateStore;

use crate::events::{EngineEvent, EventBus};
use crate::rituals;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preset {
    pub rituals: Vec<RitualRecord>,
    pub emotion_bias: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Swap the whole ritual list.
    Replace,
    /// Add rituals whose name is not present; never overwrite.
    Merge,
}

/// Apply a preset. Returns how many rituals were added.
pub fn apply(
    doc: &mut MemoryDocument,
    name: &str,
    preset: Preset,
    mode: LoadMode,
    now: Timestamp,
) -> usize {
    if mode == LoadMode::Replace {
        doc.rituals.clear();
    }
    let added = preset
        .rituals
        .into_iter()
        .filter(|r| rituals::insert(doc, r.clone()))
        .count();

    let state = &mut doc.system_state;
    state.emotion_bias = preset.emotion_bias;
    state.last_loaded_identity = Some(name.to_string());
    state.identity_loaded_at = Some(now);
    added
}

#[derive(Clone)]
pub struct PresetLoader {
    dir: PathBuf,
    store: StateStore,
    events: EventBus,
}

impl PresetLoader {
    pub fn new(dir: impl Into<PathBuf>, store: StateStore, events: EventBus) -> Self {
        Self { dir: dir.into(), store, events }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Preset names, sorted. A missing directory has none.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn read(&self, name: &str) -> Result<Preset> {
        let path = self.path_for(name)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::PresetNotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    pub async fn load(&self, name: &str, mode: LoadMode) -> Result<usize> {
        let preset = self.read(name).await?;
        let owned = name.to_string();
        let now = Utc::now();
        let added = self
            .store
            .transact(move |doc| apply(doc, &owned, preset, mode, now))
            .await?;

        info!("Preset {} loaded ({:?}, {} rituals added)", name, mode, added);
        self.events.emit(EngineEvent::PresetLoaded {
            name: name.to_string(),
            rituals_added: added,
        });
        Ok(added)
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(Error::PresetNotFound(name.to_string()));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }
}
