//! Symbol fusion — pairs of rituals similar enough to merge into one.
//!
//! Scoring is pure over the document and never edits the ritual list. The
//! candidates are written to a side file for someone to act on.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use vritual_core::{MemoryDocument, Result, RitualRecord, RitualTrigger, Timestamp};
use vritual_store::{write_atomic, StateStore};

pub const FUSION_THRESHOLD: f64 = 0.6;
const TRIGGER_WEIGHT: f64 = 0.4;
const NAME_WEIGHT: f64 = 0.2;
const USAGE_WEIGHT: f64 = 0.2;
/// Usage similarity lost per use of difference.
const USAGE_STEP: f64 = 0.02;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionCandidate {
    pub fusion_name: String,
    pub components: [String; 2],
    pub score: f64,
    pub last_triggered: Option<Timestamp>,
}

/// Contents of the fusions file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionReport {
    pub timestamp: Timestamp,
    pub fusions: Vec<FusionCandidate>,
}

/// Some word of `a`'s phrase occurs inside `b`'s. Hour triggers never overlap.
fn triggers_overlap(a: &RitualTrigger, b: &RitualTrigger) -> bool {
    match (a, b) {
        (RitualTrigger::Phrase(a), RitualTrigger::Phrase(b)) => {
            a.split_whitespace().any(|word| b.contains(word))
        }
        _ => false,
    }
}

fn names_overlap(a: &str, b: &str) -> bool {
    a.split('_')
        .filter(|part| !part.is_empty())
        .any(|part| b.contains(part))
}

/// Directional: trigger and name overlap are checked from `a` into `b`.
pub fn fusion_score(a: &RitualRecord, b: &RitualRecord) -> f64 {
    let mut score = 0.0;
    if triggers_overlap(&a.trigger, &b.trigger) {
        score += TRIGGER_WEIGHT;
    }
    if names_overlap(&a.name, &b.name) {
        score += NAME_WEIGHT;
    }
    let usage_gap = a.usage_count.abs_diff(b.usage_count) as f64;
    score + (USAGE_WEIGHT - usage_gap * USAGE_STEP).max(0.0)
}

/// Every ordered pair (earlier ritual first) scoring at least the threshold,
/// highest score first. Equal scores keep list order.
pub fn fusion_candidates(doc: &MemoryDocument) -> Vec<FusionCandidate> {
    let rituals = &doc.rituals;
    let mut candidates = Vec::new();
    for (i, a) in rituals.iter().enumerate() {
        for b in &rituals[i + 1..] {
            let score = fusion_score(a, b);
            // 0.4 + 0.2 lands a hair either side of 0.6 in floating point.
            if score + 1e-9 < FUSION_THRESHOLD {
                continue;
            }
            candidates.push(FusionCandidate {
                fusion_name: format!("{}_{}_fused", a.name, b.name),
                components: [a.name.clone(), b.name.clone()],
                score: crate::round2(score),
                last_triggered: a.last_triggered.max(b.last_triggered),
            });
        }
    }
    candidates.sort_by(|x, y| y.score.total_cmp(&x.score));
    candidates
}

/// Overwrite the fusions file with `fusions`.
pub async fn save(path: &Path, fusions: &[FusionCandidate]) -> Result<()> {
    let report = FusionReport { timestamp: Utc::now(), fusions: fusions.to_vec() };
    write_atomic(path, &serde_json::to_vec_pretty(&report)?).await?;
    info!("{} fusion candidates written to {}", fusions.len(), path.display());
    Ok(())
}

#[derive(Clone)]
pub struct SymbolFuser {
    store: StateStore,
    path: PathBuf,
}

impl SymbolFuser {
    pub fn new(store: StateStore, path: impl Into<PathBuf>) -> Self {
        Self { store, path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn detect(&self) -> Vec<FusionCandidate> {
        self.store.read(fusion_candidates)
    }

    pub async fn detect_and_save(&self) -> Result<Vec<FusionCandidate>> {
        let candidates = self.detect();
        save(&self.path, &candidates).await?;
        Ok(candidates)
    }
}
