//! Vritual configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vritual_core::{Error, Result};
use vritual_store::StoreConfig;

/// Env var that overrides `notify.webhook_url`.
pub const WEBHOOK_ENV: &str = "VRITUAL_911_WEBHOOK";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VritualConfig {
    /// Where the document, snapshot, presets and logs live.
    pub paths: PathConfig,
    /// Arbiter timeouts.
    pub store: StoreSection,
    /// Per-monitor tick intervals.
    pub schedule: ScheduleConfig,
    /// Emergency notification sink.
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub data_dir: PathBuf,
    pub memory_file: String,
    pub snapshot_file: String,
    pub presets_dir: String,
    pub energy_log: String,
    pub attention_log: String,
    pub heartbeat_log: String,
    pub mission_log: String,
    pub emergency_log: String,
    pub environment_log: String,
    pub timekeeper_log: String,
    pub fusions_file: String,
    /// JSONL export target.
    pub export_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Max wait for the process lock, and for a transaction to be accepted and started.
    pub acquire_timeout_ms: u64,
    /// Persists slower than this are logged as warnings.
    pub io_timeout_ms: u64,
    /// Pending transactions before callers start waiting.
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub attention_secs: u64,
    pub timekeeper_secs: u64,
    pub heartbeat_secs: u64,
    pub mood_decay_secs: u64,
    pub energy_secs: u64,
    pub emergency_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Webhook receiving emergency reports. Unset means log-only.
    pub webhook_url: Option<String>,
    pub timeout_ms: u64,
}

// ============================================================
// Defaults
// ============================================================

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            memory_file: "loopmemory.json".into(),
            snapshot_file: "loopmemory_snapshot.json".into(),
            presets_dir: "presets".into(),
            energy_log: "loop_energy_log.json".into(),
            attention_log: "attention_log.json".into(),
            heartbeat_log: "heartbeat_log.json".into(),
            mission_log: "mission_log.json".into(),
            emergency_log: "emergency_log.json".into(),
            environment_log: "environment_log.json".into(),
            timekeeper_log: "timekeeper_log.json".into(),
            fusions_file: "symbol_fusions.json".into(),
            export_dir: "compressed_memory".into(),
        }
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        Self { acquire_timeout_ms: 2_000, io_timeout_ms: 5_000, queue_depth: 64 }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            attention_secs: 60,
            timekeeper_secs: 60,
            heartbeat_secs: 180,
            mood_decay_secs: 300,
            energy_secs: 300,
            emergency_secs: 300,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { webhook_url: None, timeout_ms: 10_000 }
    }
}

// ============================================================
// Loading
// ============================================================

impl VritualConfig {
    /// Load config from a TOML file. A missing file yields defaults; a file
    /// that exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config: Self = toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
                tracing::info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config at {} — using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Apply environment overrides.
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var(WEBHOOK_ENV) {
            if !url.trim().is_empty() {
                self.notify.webhook_url = Some(url);
            }
        }
        self
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            path: self.paths.memory_path(),
            acquire_timeout: Duration::from_millis(self.store.acquire_timeout_ms),
            io_timeout: Duration::from_millis(self.store.io_timeout_ms),
            queue_depth: self.store.queue_depth,
        }
    }
}

impl PathConfig {
    pub fn resolve(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    pub fn memory_path(&self) -> PathBuf {
        self.resolve(&self.memory_file)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.resolve(&self.snapshot_file)
    }

    pub fn presets_path(&self) -> PathBuf {
        self.resolve(&self.presets_dir)
    }

    pub fn fusions_path(&self) -> PathBuf {
        self.resolve(&self.fusions_file)
    }

    pub fn export_path(&self) -> PathBuf {
        self.resolve(&self.export_dir)
    }
}

impl ScheduleConfig {
    pub fn attention(&self) -> Duration {
        Duration::from_secs(self.attention_secs)
    }

    pub fn timekeeper(&self) -> Duration {
        Duration::from_secs(self.timekeeper_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn mood_decay(&self) -> Duration {
        Duration::from_secs(self.mood_decay_secs)
    }

    pub fn energy(&self) -> Duration {
        Duration::from_secs(self.energy_secs)
    }

    pub fn emergency(&self) -> Duration {
        Duration::from_secs(self.emergency_secs)
    }
}
