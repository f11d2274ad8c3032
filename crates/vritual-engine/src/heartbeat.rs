//! Heartbeat — vital signs of the shared state.

use chrono::Utc;
use tracing::{info, warn};
use vritual_core::{HeartbeatAlert, HeartbeatStatus, MemoryDocument, Result, Timestamp};
use vritual_store::{RollingLog, StateStore};

use crate::events::{EngineEvent, EventBus};
use crate::mood;

/// Hourly loop pressure above which the heartbeat flags an overload.
pub const LOOP_PRESSURE_LIMIT: f64 = 20.0;
pub const LOG_CAP: usize = 100;

pub fn check(doc: &MemoryDocument, now: Timestamp) -> HeartbeatStatus {
    let state = &doc.system_state;
    let alive = !state.mood_score.is_empty() || state.attention.is_some() || state.environment.is_some();
    let loop_pressure = crate::round2(state.loop_energy_by_hour.total());

    let alert = if !alive {
        HeartbeatAlert::InactiveStateDetected
    } else if loop_pressure > LOOP_PRESSURE_LIMIT {
        HeartbeatAlert::LoopOverload
    } else {
        HeartbeatAlert::Normal
    };

    HeartbeatStatus {
        time: now,
        alive,
        attention_state: state
            .attention
            .as_ref()
            .map(|a| a.attention_state.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        top_mood: mood::top_mood(&state.mood_score),
        loop_pressure,
        alert,
    }
}

#[derive(Clone)]
pub struct Heartbeat {
    store: StateStore,
    log: RollingLog<HeartbeatStatus>,
    events: EventBus,
}

impl Heartbeat {
    pub fn new(store: StateStore, log: RollingLog<HeartbeatStatus>, events: EventBus) -> Self {
        Self { store, log, events }
    }

    /// Logged, not actioned.
    pub async fn check_vitals(&self) -> Result<HeartbeatStatus> {
        let now = Utc::now();
        let status = self.store.read(|doc| check(doc, now));
        match status.alert {
            HeartbeatAlert::Normal => info!(
                "Heartbeat: alive (attention {}, mood {}, pressure {:.2})",
                status.attention_state, status.top_mood, status.loop_pressure
            ),
            alert => warn!("Heartbeat alert: {} (pressure {:.2})", alert, status.loop_pressure),
        }
        if let Err(e) = self.log.append(&status).await {
            warn!("Heartbeat log append failed: {}", e);
        }
        self.events.emit(EngineEvent::Heartbeat {
            alive: status.alive,
            alert: status.alert,
        });
        Ok(status)
    }
}
