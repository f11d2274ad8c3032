//! Missions — one active goal at a time, with history.

use chrono::Utc;
use tracing::{info, warn};
use vritual_core::{Error, Mission, MissionStatus, Result, SystemState, Timestamp};
use vritual_store::{RollingLog, StateStore};

use crate::events::{EngineEvent, EventBus};

pub const LOG_CAP: usize = 100;

/// Replace the current mission. A still-active mission is left in history as-is.
pub fn assign(state: &mut SystemState, mission: Mission) {
    state.mission_history.push(mission.clone());
    state.current_mission = Some(mission);
}

pub fn complete(state: &mut SystemState, now: Timestamp) -> Result<Mission> {
    let mut mission = state.current_mission.take().ok_or(Error::NoActiveMission)?;
    mission.status = MissionStatus::Complete;
    mission.completed_at = Some(now);
    match state.mission_history.iter_mut().find(|m| m.id == mission.id) {
        Some(entry) => *entry = mission.clone(),
        None => state.mission_history.push(mission.clone()),
    }
    Ok(mission)
}

#[derive(Clone)]
pub struct MissionController {
    store: StateStore,
    log: RollingLog<Mission>,
    events: EventBus,
}

impl MissionController {
    pub fn new(store: StateStore, log: RollingLog<Mission>, events: EventBus) -> Self {
        Self { store, log, events }
    }

    pub async fn assign(
        &self,
        title: &str,
        goal: &str,
        success_conditions: Vec<String>,
        emotion_bias: Vec<String>,
    ) -> Result<Mission> {
        let mission = Mission {
            id: uuid::Uuid::new_v4(),
            title: title.to_string(),
            goal: goal.to_string(),
            assigned_at: Utc::now(),
            success_conditions,
            emotion_bias,
            status: MissionStatus::Active,
            completed_at: None,
        };
        let stored = mission.clone();
        self.store
            .transact(move |doc| assign(&mut doc.system_state, stored))
            .await?;

        info!("Mission assigned: {} ({})", mission.title, mission.goal);
        self.append_log(&mission).await;
        self.events.emit(EngineEvent::MissionAssigned { title: mission.title.clone() });
        Ok(mission)
    }

    pub async fn complete(&self) -> Result<Mission> {
        let now = Utc::now();
        let mission = self
            .store
            .transact(move |doc| complete(&mut doc.system_state, now))
            .await??;

        info!("Mission complete: {}", mission.title);
        self.append_log(&mission).await;
        self.events.emit(EngineEvent::MissionCompleted { title: mission.title.clone() });
        Ok(mission)
    }

    pub fn active(&self) -> Option<Mission> {
        self.store.read(|doc| doc.system_state.current_mission.clone())
    }

    pub fn history(&self) -> Vec<Mission> {
        self.store.read(|doc| doc.system_state.mission_history.clone())
    }

    async fn append_log(&self, mission: &Mission) {
        if let Err(e) = self.log.append(mission).await {
            warn!("Mission log append failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mission(title: &str) -> Mission {
        Mission {
            id: uuid::Uuid::new_v4(),
            title: title.into(),
            goal: "g".into(),
            assigned_at: Utc::now(),
            success_conditions: vec![],
            emotion_bias: vec!["joy".into()],
            status: MissionStatus::Active,
            completed_at: None,
        }
    }

    #[test]
    fn complete_without_mission_is_error() {
        let mut state = SystemState::default();
        assert!(matches!(complete(&mut state, Utc::now()), Err(Error::NoActiveMission)));
    }

    #[test]
    fn complete_updates_history_entry() {
        let mut state = SystemState::default();
        assign(&mut state, mission("first"));
        assign(&mut state, mission("second"));
        let done = complete(&mut state, Utc::now()).unwrap();

        assert_eq!(done.title, "second");
        assert!(state.current_mission.is_none());
        assert_eq!(state.mission_history.len(), 2);
        assert_eq!(state.mission_history[0].status, MissionStatus::Active);
        assert_eq!(state.mission_history[1].status, MissionStatus::Complete);
        assert!(state.mission_history[1].completed_at.is_some());
    }
}
