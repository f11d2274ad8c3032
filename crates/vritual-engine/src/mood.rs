//! Mood accumulator — a leaky bucket per emotion.
//!
//! Stacking clamps at `MAX_MOOD`. Decay runs on its own schedule and removes
//! an emotion once its intensity reaches zero.

use tracing::{debug, info};
use vritual_core::{MoodScore, Result};
use vritual_store::StateStore;

use crate::events::{EngineEvent, EventBus};

pub const MAX_MOOD: f64 = 10.0;
pub const DECAY_RATE: f64 = 0.1;
pub const DEFAULT_MOOD: &str = "calm";

/// Intensities at or below this count as zero (float drift from repeated 0.1 steps).
const EPSILON: f64 = 1e-9;

/// Add `weight` to `emotion`, clamped. Returns the new intensity.
pub fn stack(mood: &mut MoodScore, emotion: &str, weight: f64) -> f64 {
    let entry = mood.entry(emotion.to_string()).or_insert(0.0);
    *entry = (*entry + weight).min(MAX_MOOD);
    *entry
}

/// One decay step. Returns whether anything changed.
pub fn decay(mood: &mut MoodScore) -> bool {
    if mood.is_empty() {
        return false;
    }
    for value in mood.values_mut() {
        *value -= DECAY_RATE;
    }
    mood.retain(|_, v| *v > EPSILON);
    true
}

/// Highest intensity wins; on a tie, the lexically smallest emotion.
pub fn top_mood(mood: &MoodScore) -> String {
    let mut best: Option<(&String, f64)> = None;
    for (emotion, &value) in mood {
        match best {
            Some((_, b)) if b >= value => {}
            _ => best = Some((emotion, value)),
        }
    }
    best.map(|(e, _)| e.clone())
        .unwrap_or_else(|| DEFAULT_MOOD.to_string())
}

#[derive(Clone)]
pub struct MoodAccumulator {
    store: StateStore,
    events: EventBus,
}

impl MoodAccumulator {
    pub fn new(store: StateStore, events: EventBus) -> Self {
        Self { store, events }
    }

    pub async fn stack(&self, emotion: &str, weight: f64) -> Result<f64> {
        let key = emotion.to_string();
        let intensity = self
            .store
            .transact(move |doc| stack(&mut doc.system_state.mood_score, &key, weight))
            .await?;
        debug!("Mood stacked: {} → {:.2}", emotion, intensity);
        self.events.emit(EngineEvent::MoodStacked {
            emotion: emotion.to_string(),
            intensity,
        });
        Ok(intensity)
    }

    /// Returns whether a decay step was applied. An empty mood is not written.
    pub async fn decay(&self) -> Result<bool> {
        let (changed, remaining) = self
            .store
            .transact(|doc| {
                let mood = &mut doc.system_state.mood_score;
                (decay(mood), mood.len())
            })
            .await?;
        if changed {
            info!("Mood decayed ({} emotions remain)", remaining);
            self.events.emit(EngineEvent::MoodDecayed { remaining });
        }
        Ok(changed)
    }

    pub fn top_mood(&self) -> String {
        self.store.read(|doc| top_mood(&doc.system_state.mood_score))
    }

    pub fn snapshot(&self) -> MoodScore {
        self.store.read(|doc| doc.system_state.mood_score.clone())
    }
}
