//! Loop tracker — phrase repetition, loop energy, and ritual promotion.
//!
//! `loop_energy` gains `min(1.0, count * 0.2)` on every registration. The
//! increment is capped, the sum is not: a phrase repeated often enough keeps
//! building pressure for the energy meter's overload detector.

use chrono::Utc;
use tracing::info;
use vritual_core::{
    EffectKind, MemoryDocument, Result, RitualImportance, RitualRecord, RitualTrigger, Timestamp,
};
use vritual_store::StateStore;

use crate::events::{EngineEvent, EventBus};
use crate::rituals;

/// Registrations after which a phrase becomes a ritual.
pub const RITUAL_THRESHOLD: u32 = 3;
pub const RITUAL_PREFIX: &str = "looped_";
/// Max chars of the phrase kept in a promoted ritual's name.
pub const RITUAL_NAME_PHRASE_CHARS: usize = 20;

const ENERGY_STEP: f64 = 0.2;

// Candidate prediction
const PREDICT_THRESHOLD: f64 = 2.5;
const FREQUENCY_WEIGHT: f64 = 1.5;
const RECENCY_WEIGHT: f64 = 1.0;
const RECENCY_WINDOW_SECS: i64 = 3_600;

/// Trim; an empty phrase is not an observation.
pub fn normalize(phrase: &str) -> Option<&str> {
    let trimmed = phrase.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

pub fn energy_increment(count: u32) -> f64 {
    (count as f64 * ENERGY_STEP).min(1.0)
}

/// `looped_` + lower-cased phrase, spaces → underscores, truncated.
pub fn ritual_name_for(phrase: &str) -> String {
    let slug: String = phrase
        .to_lowercase()
        .replace(' ', "_")
        .chars()
        .take(RITUAL_NAME_PHRASE_CHARS)
        .collect();
    format!("{RITUAL_PREFIX}{slug}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Promotion {
    pub ritual_name: String,
    /// False when a ritual of that name already existed.
    pub ritual_created: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub phrase: String,
    pub count: u32,
    pub loop_energy: f64,
    pub promotion: Option<Promotion>,
}

/// Apply one observation of an already-normalized phrase.
pub fn register(doc: &mut MemoryDocument, phrase: &str, now: Timestamp) -> Registration {
    let record = doc.loops.entry(phrase.to_string()).or_default();
    record.count = record.count.saturating_add(1);
    record.last_used = Some(now);
    record.loop_energy += energy_increment(record.count);

    let crossed = !record.ritualized && record.count >= RITUAL_THRESHOLD;
    if crossed {
        record.ritualized = true;
    }
    let (count, loop_energy) = (record.count, record.loop_energy);

    let promotion = crossed.then(|| {
        let name = ritual_name_for(phrase);
        let ritual = RitualRecord::new(
            name.clone(),
            RitualTrigger::Phrase(phrase.to_string()),
            EffectKind::label(format!("auto_effect:respond_to_{name}")),
            RitualImportance::Emergent,
        );
        Promotion {
            ritual_created: rituals::insert(doc, ritual),
            ritual_name: name,
        }
    });

    Registration {
        phrase: phrase.to_string(),
        count,
        loop_energy,
        promotion,
    }
}

/// A loop that looks ready to become a ritual before reaching the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub phrase: String,
    pub score: f64,
    pub count: u32,
    pub loop_energy: f64,
}

/// Score non-ritualized loops by energy and recency, best first.
pub fn predict_candidates(doc: &MemoryDocument, now: Timestamp) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = doc
        .loops
        .iter()
        .filter(|(_, r)| !r.ritualized)
        .filter_map(|(phrase, r)| {
            let mut score = r.loop_energy * FREQUENCY_WEIGHT;
            let recent = r
                .last_used
                .is_some_and(|t| (now - t).num_seconds() < RECENCY_WINDOW_SECS);
            if recent {
                score += RECENCY_WEIGHT;
            }
            (score >= PREDICT_THRESHOLD).then(|| Candidate {
                phrase: phrase.clone(),
                score: crate::round2(score),
                count: r.count,
                loop_energy: r.loop_energy,
            })
        })
        .collect();
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.phrase.cmp(&b.phrase)));
    candidates
}

#[derive(Clone)]
pub struct LoopTracker {
    store: StateStore,
    events: EventBus,
}

impl LoopTracker {
    pub fn new(store: StateStore, events: EventBus) -> Self {
        Self { store, events }
    }

    /// Record one observation. `None` for an empty phrase (no-op).
    pub async fn register_phrase(&self, phrase: &str) -> Result<Option<Registration>> {
        let Some(phrase) = normalize(phrase) else {
            return Ok(None);
        };
        let owned = phrase.to_string();
        let now = Utc::now();
        let reg = self
            .store
            .transact(move |doc| register(doc, &owned, now))
            .await?;

        self.events.emit(EngineEvent::PhraseRegistered {
            phrase: reg.phrase.clone(),
            count: reg.count,
            loop_energy: reg.loop_energy,
        });

        if let Some(promotion) = &reg.promotion {
            info!("Ritual candidate detected: '{}' has looped {} times", reg.phrase, reg.count);
            self.events.emit(EngineEvent::RitualCandidate {
                phrase: reg.phrase.clone(),
                count: reg.count,
            });
            if promotion.ritual_created {
                info!("Ritual formed: '{}' promoted to '{}'", reg.phrase, promotion.ritual_name);
                self.events.emit(EngineEvent::RitualFormed {
                    name: promotion.ritual_name.clone(),
                    phrase: reg.phrase.clone(),
                });
            }
        }

        Ok(Some(reg))
    }

    pub fn predict_candidates(&self) -> Vec<Candidate> {
        let now = Utc::now();
        self.store.read(|doc| predict_candidates(doc, now))
    }

    /// Loops sorted by count, highest first.
    pub fn top_loops(&self, n: usize) -> Vec<(String, vritual_core::LoopRecord)> {
        self.store.read(|doc| {
            let mut loops: Vec<_> = doc.loops.iter().map(|(p, r)| (p.clone(), r.clone())).collect();
            loops.sort_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(&b.0)));
            loops.truncate(n);
            loops
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn energy_increment_caps_per_event() {
        assert!((energy_increment(1) - 0.2).abs() < 1e-9);
        assert!((energy_increment(4) - 0.8).abs() < 1e-9);
        assert_eq!(energy_increment(5), 1.0);
        assert_eq!(energy_increment(40), 1.0);
    }

    #[test]
    fn ritual_name_is_deterministic_and_bounded() {
        assert_eq!(ritual_name_for("Good Morning"), "looped_good_morning");
        let long = ritual_name_for("tell me a story about the sea");
        assert_eq!(long, "looped_tell_me_a_story_abou");
        assert_eq!(long.chars().count(), RITUAL_PREFIX.len() + RITUAL_NAME_PHRASE_CHARS);
    }

    #[test]
    fn ritual_name_truncates_on_char_boundaries() {
        let name = ritual_name_for("ñññññññññññññññññññññññ");
        assert_eq!(name.chars().count(), RITUAL_PREFIX.len() + RITUAL_NAME_PHRASE_CHARS);
    }

    #[test]
    fn normalize_trims_and_rejects_empty() {
        assert_eq!(normalize("  hi there \n"), Some("hi there"));
        assert_eq!(normalize("   "), None);
    }

    #[test]
    fn third_registration_promotes_once() {
        let mut doc = MemoryDocument::default();
        let now = Utc::now();
        assert!(register(&mut doc, "hello", now).promotion.is_none());
        assert!(register(&mut doc, "hello", now).promotion.is_none());
        assert!(!doc.loops["hello"].ritualized);

        let third = register(&mut doc, "hello", now);
        let promotion = third.promotion.unwrap();
        assert_eq!(promotion.ritual_name, "looped_hello");
        assert!(promotion.ritual_created);
        assert!(doc.loops["hello"].ritualized);

        let ritual = doc.ritual("looped_hello").unwrap();
        assert_eq!(ritual.importance, RitualImportance::Emergent);
        assert_eq!(ritual.trigger, RitualTrigger::Phrase("hello".into()));

        assert!(register(&mut doc, "hello", now).promotion.is_none());
        assert_eq!(doc.rituals.len(), 1);
    }

    #[test]
    fn promotion_keeps_existing_ritual_of_same_name() {
        let mut doc = MemoryDocument::default();
        rituals::insert(
            &mut doc,
            RitualRecord::new(
                "looped_hello",
                RitualTrigger::Phrase("custom".into()),
                EffectKind::label("keep me"),
                RitualImportance::Sacred,
            ),
        );
        let now = Utc::now();
        for _ in 0..2 {
            register(&mut doc, "hello", now);
        }
        let promotion = register(&mut doc, "hello", now).promotion.unwrap();
        assert!(!promotion.ritual_created);
        assert!(doc.loops["hello"].ritualized);
        assert_eq!(doc.rituals.len(), 1);
        assert_eq!(doc.rituals[0].effect, EffectKind::label("keep me"));
    }

    #[test]
    fn loop_energy_is_sum_of_capped_increments() {
        let mut doc = MemoryDocument::default();
        let now = Utc::now();
        for _ in 0..5 {
            register(&mut doc, "again", now);
        }
        assert!((doc.loops["again"].loop_energy - 3.0).abs() < 1e-9);
        for _ in 0..3 {
            register(&mut doc, "again", now);
        }
        assert!((doc.loops["again"].loop_energy - 6.0).abs() < 1e-9);
    }

    #[test]
    fn predict_skips_ritualized_and_weak_loops() {
        let mut doc = MemoryDocument::default();
        let now = Utc::now();
        register(&mut doc, "once", now);
        for _ in 0..2 {
            register(&mut doc, "twice", now);
        }
        for _ in 0..3 {
            register(&mut doc, "thrice", now);
        }
        // twice: 0.6 * 1.5 + 1.0 = 1.9 → below threshold
        assert!(predict_candidates(&doc, now).is_empty());

        // A legacy loop with energy but never promoted.
        doc.loops.insert(
            "legacy".into(),
            vritual_core::LoopRecord {
                count: 2,
                loop_energy: 2.0,
                last_used: Some(now - Duration::hours(3)),
                ..Default::default()
            },
        );
        let candidates = predict_candidates(&doc, now);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].phrase, "legacy");
        assert!((candidates[0].score - 3.0).abs() < 1e-9);
    }
}
