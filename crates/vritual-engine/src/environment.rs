//! Environment intake. Sensing happens outside; this records what was sensed.

use chrono::Utc;
use tracing::{info, warn};
use vritual_core::{EnvironmentSnapshot, Result};
use vritual_store::{RollingLog, StateStore};

use crate::events::{EngineEvent, EventBus};

pub const LOG_CAP: usize = 100;

/// Raw ambient light reading → level.
pub fn classify_light(raw: u32) -> &'static str {
    match raw {
        r if r > 50_000 => "bright",
        r if r > 20_000 => "dim",
        _ => "dark",
    }
}

/// Degrees Celsius → level.
pub fn classify_temperature(celsius: f64) -> &'static str {
    if celsius < 18.0 {
        "cold"
    } else if celsius > 28.0 {
        "hot"
    } else {
        "comfortable"
    }
}

#[derive(Clone)]
pub struct EnvironmentSense {
    store: StateStore,
    log: RollingLog<EnvironmentSnapshot>,
    events: EventBus,
}

impl EnvironmentSense {
    pub fn new(store: StateStore, log: RollingLog<EnvironmentSnapshot>, events: EventBus) -> Self {
        Self { store, log, events }
    }

    /// Store the snapshot as current and log it. `last_update` defaults to now.
    pub async fn record(&self, mut snapshot: EnvironmentSnapshot) -> Result<EnvironmentSnapshot> {
        snapshot.last_update.get_or_insert_with(Utc::now);
        let stored = snapshot.clone();
        self.store
            .transact(move |doc| doc.system_state.environment = Some(stored))
            .await?;

        info!(
            "Environment: light {}, sound {}, temperature {}",
            snapshot.light_level, snapshot.sound_level, snapshot.temperature
        );
        if let Err(e) = self.log.append(&snapshot).await {
            warn!("Environment log append failed: {}", e);
        }
        self.events.emit(EngineEvent::EnvironmentRecorded {
            light_level: snapshot.light_level.clone(),
            sound_level: snapshot.sound_level.clone(),
            temperature: snapshot.temperature.clone(),
        });
        Ok(snapshot)
    }

    pub fn current(&self) -> Option<EnvironmentSnapshot> {
        self.store.read(|doc| doc.system_state.environment.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_levels() {
        assert_eq!(classify_light(60_000), "bright");
        assert_eq!(classify_light(50_000), "dim");
        assert_eq!(classify_light(20_000), "dark");
    }

    #[test]
    fn temperature_levels() {
        assert_eq!(classify_temperature(12.5), "cold");
        assert_eq!(classify_temperature(22.0), "comfortable");
        assert_eq!(classify_temperature(31.0), "hot");
    }
}
