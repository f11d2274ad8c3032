//! Timekeeper — hour-of-day energy rhythm and hour-triggered rituals.

use chrono::{Local, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use vritual_core::{EnergyByHour, Result, SystemState, Timestamp};
use vritual_store::{RollingLog, StateStore};

use crate::events::{EngineEvent, EventBus};
use crate::rituals::{Firing, RitualRegistry, TriggerContext};

pub const HOUR_DECAY: f64 = 0.1;
pub const HOUR_BOOST: f64 = 0.2;
pub const LOG_CAP: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourEntry {
    pub time: Timestamp,
    pub hour: u32,
    pub loop_energy_snapshot: EnergyByHour,
}

/// Move the rhythm to `hour`. Returns false (untouched) if already there.
pub fn advance_hour(state: &mut SystemState, hour: u32) -> bool {
    if state.last_known_hour == Some(hour) {
        return false;
    }
    state.last_known_hour = Some(hour);

    let slots = &mut state.loop_energy_by_hour;
    slots.fill_slots();
    for h in 0..24u32 {
        let slot = slots.slot_mut(h);
        if h == hour {
            *slot = crate::round2(*slot + HOUR_BOOST);
        } else {
            *slot = crate::round2((*slot - HOUR_DECAY).max(0.0));
        }
    }
    true
}

#[derive(Clone)]
pub struct Timekeeper {
    store: StateStore,
    rituals: RitualRegistry,
    log: RollingLog<HourEntry>,
    events: EventBus,
}

impl Timekeeper {
    pub fn new(
        store: StateStore,
        rituals: RitualRegistry,
        log: RollingLog<HourEntry>,
        events: EventBus,
    ) -> Self {
        Self { store, rituals, log, events }
    }

    pub async fn tick(&self) -> Result<Option<(HourEntry, Vec<Firing>)>> {
        self.tick_at(Utc::now(), Local::now().hour()).await
    }

    /// No hour change means no write and no ritual scan.
    pub async fn tick_at(
        &self,
        now: Timestamp,
        hour: u32,
    ) -> Result<Option<(HourEntry, Vec<Firing>)>> {
        let snapshot = self
            .store
            .transact(move |doc| {
                let state = &mut doc.system_state;
                advance_hour(state, hour).then(|| state.loop_energy_by_hour.clone())
            })
            .await?;
        let Some(loop_energy_snapshot) = snapshot else {
            return Ok(None);
        };

        info!("Hour changed to {:02}:00", hour);
        self.events.emit(EngineEvent::HourChanged { hour });

        let fired = self
            .rituals
            .scan_and_trigger_at(TriggerContext::clock(), now, hour)
            .await?;

        let entry = HourEntry { time: now, hour, loop_energy_snapshot };
        if let Err(e) = self.log.append(&entry).await {
            warn!("Timekeeper log append failed: {}", e);
        }
        Ok(Some((entry, fired)))
    }
}
