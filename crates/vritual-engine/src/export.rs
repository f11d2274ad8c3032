//! Memory export — the document flattened into JSONL input/output pairs.
//!
//! One file per section under the export directory: `loops`, `rituals`,
//! `emotions` (last 20 reactions), `mood` and `attention`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use vritual_core::{MemoryDocument, Result};
use vritual_store::write_atomic;

pub const RECENT_EMOTIONS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub input: String,
    pub output: String,
    #[serde(flatten)]
    pub detail: BTreeMap<String, Value>,
}

impl ExportRecord {
    fn new(input: String, output: String) -> Self {
        Self { input, output, detail: BTreeMap::new() }
    }

    fn with(mut self, key: &str, value: Value) -> Self {
        self.detail.insert(key.to_string(), value);
        self
    }
}

pub fn loops(doc: &MemoryDocument) -> Vec<ExportRecord> {
    doc.loops
        .iter()
        .map(|(phrase, r)| {
            ExportRecord::new(
                format!("Loop phrase: {phrase}"),
                format!("Emotion: Loop of {phrase} repeated {} times", r.count),
            )
            .with("emotion", json!("unknown"))
            .with("count", json!(r.count))
            .with("energy", json!(r.loop_energy))
            .with("ritualized", json!(r.ritualized))
        })
        .collect()
}

pub fn rituals(doc: &MemoryDocument) -> Vec<ExportRecord> {
    doc.rituals
        .iter()
        .map(|r| {
            ExportRecord::new(
                format!("Trigger: {}", r.trigger),
                format!("Invoke ritual: {} (type: {})", r.name, r.importance),
            )
        })
        .collect()
}

pub fn emotions(doc: &MemoryDocument) -> Vec<ExportRecord> {
    doc.recent_reactions(RECENT_EMOTIONS)
        .iter()
        .map(|r| {
            let output = match &r.emoji {
                Some(emoji) => format!("Emotion: {} ({emoji})", r.emotion),
                None => format!("Emotion: {}", r.emotion),
            };
            ExportRecord::new(format!("Triggered by: {}", r.source), output)
        })
        .collect()
}

pub fn mood(doc: &MemoryDocument) -> Vec<ExportRecord> {
    vec![ExportRecord::new(
        "Emotions over time".to_string(),
        format!("Mood stack: {}", json!(doc.system_state.mood_score)),
    )]
}

/// Empty when attention has never been evaluated.
pub fn attention(doc: &MemoryDocument) -> Vec<ExportRecord> {
    let Some(snap) = &doc.system_state.attention else {
        return Vec::new();
    };
    let silent = snap.seconds_since_last_phrase.unwrap_or(0.0) as i64;
    vec![ExportRecord::new(
        format!("Last phrase: {}", snap.last_phrase.as_deref().unwrap_or("none")),
        format!("Attention state: {} after {silent}s", snap.attention_state),
    )]
}

/// Every section in file order.
pub fn sections(doc: &MemoryDocument) -> Vec<(&'static str, Vec<ExportRecord>)> {
    vec![
        ("loops", loops(doc)),
        ("rituals", rituals(doc)),
        ("emotions", emotions(doc)),
        ("mood", mood(doc)),
        ("attention", attention(doc)),
    ]
}

#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub path: PathBuf,
    pub records: usize,
}

/// Write `<dir>/<section>.jsonl` for every section, replacing earlier exports.
pub async fn write_all(doc: &MemoryDocument, dir: &Path) -> Result<Vec<ExportedFile>> {
    let mut written = Vec::new();
    for (name, records) in sections(doc) {
        let mut body = String::new();
        for record in &records {
            body.push_str(&serde_json::to_string(record)?);
            body.push('\n');
        }
        let path = dir.join(format!("{name}.jsonl"));
        write_atomic(&path, body.as_bytes()).await?;
        info!("Exported {} {} records to {}", records.len(), name, path.display());
        written.push(ExportedFile { path, records: records.len() });
    }
    Ok(written)
}
