//! Engine events — notifications for observability collaborators.
//!
//! Published on a broadcast channel. Nobody listening is not an error.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use vritual_core::{AttentionState, EmergencyReason, HeartbeatAlert};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    PhraseRegistered {
        phrase: String,
        count: u32,
        loop_energy: f64,
    },
    /// A phrase reached the ritual threshold.
    RitualCandidate { phrase: String, count: u32 },
    RitualFormed { name: String, phrase: String },
    RitualRejected { name: String },
    RitualTriggered { name: String, usage_count: u64 },
    /// A label effect fired; downstream reaction logic consumes it.
    RitualEffect { ritual: String, label: String },
    Reaction { emotion: String, source: String },
    MoodStacked { emotion: String, intensity: f64 },
    MoodDecayed { remaining: usize },
    AttentionEvaluated {
        state: AttentionState,
        seconds_silent: Option<f64>,
    },
    EnergyAnalyzed { total_loop_energy: f64 },
    Heartbeat { alive: bool, alert: HeartbeatAlert },
    HourChanged { hour: u32 },
    EnvironmentRecorded {
        light_level: String,
        sound_level: String,
        temperature: String,
    },
    MissionAssigned { title: String },
    MissionCompleted { title: String },
    PresetLoaded { name: String, rituals_added: usize },
    EmergencyRaised {
        reasons: Vec<EmergencyReason>,
        delivered: bool,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: EngineEvent) {
        debug!(?event, "engine event");
        let _ = self.tx.send(event);
    }
}
