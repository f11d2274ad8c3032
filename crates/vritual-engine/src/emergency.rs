//! Emergency monitor — composes the other monitors into a distress check.
//!
//! Reasons are accumulated, not classified: every condition that holds is
//! reported, so an empty mood under neglect yields two reasons.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use vritual_core::{
    AttentionState, EmergencyReason, EmergencyReport, EnergyReport, MoodScore, Result, Timestamp,
};
use vritual_store::{RollingLog, StateStore};

use crate::attention::AttentionMonitor;
use crate::energy::EnergyMeter;
use crate::events::{EngineEvent, EventBus};
use crate::heartbeat::Heartbeat;
use crate::notify::NotificationSink;

/// Total loop energy above which the system is overloaded.
pub const ENERGY_LIMIT: f64 = 20.0;
pub const LOG_CAP: usize = 50;
/// `status` field of every report, as webhook consumers expect it.
pub const REPORT_STATUS: &str = "distress";

pub fn reasons(
    attention: Option<AttentionState>,
    total_loop_energy: f64,
    mood: &MoodScore,
) -> Vec<EmergencyReason> {
    let mut reasons = Vec::new();
    if attention == Some(AttentionState::Neglected) {
        reasons.push(EmergencyReason::Neglected);
    }
    if total_loop_energy > ENERGY_LIMIT {
        reasons.push(EmergencyReason::LoopOverload);
    }
    if mood.is_empty() {
        reasons.push(EmergencyReason::EmotionAbsence);
    }
    reasons
}

/// `None` when nothing is wrong.
pub fn build_report(
    energy: &EnergyReport,
    attention: Option<AttentionState>,
    mood: &MoodScore,
    now: Timestamp,
) -> Option<EmergencyReport> {
    let reasons = reasons(attention, energy.total_loop_energy, mood);
    if reasons.is_empty() {
        return None;
    }
    Some(EmergencyReport {
        id: uuid::Uuid::new_v4(),
        time: now,
        status: REPORT_STATUS.to_string(),
        reasons,
        critical_loops: energy.overload_loops.iter().map(|l| l.phrase.clone()).collect(),
        emotion_snapshot: mood.clone(),
        attention_state: attention
            .map(|a| a.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    })
}

#[derive(Clone)]
pub struct EmergencyMonitor {
    store: StateStore,
    energy: EnergyMeter,
    heartbeat: Heartbeat,
    attention: AttentionMonitor,
    sink: Arc<dyn NotificationSink>,
    log: RollingLog<EmergencyReport>,
    events: EventBus,
}

impl EmergencyMonitor {
    pub fn new(
        store: StateStore,
        energy: EnergyMeter,
        heartbeat: Heartbeat,
        attention: AttentionMonitor,
        sink: Arc<dyn NotificationSink>,
        log: RollingLog<EmergencyReport>,
        events: EventBus,
    ) -> Self {
        Self { store, energy, heartbeat, attention, sink, log, events }
    }

    /// Run energy, heartbeat and attention, then re-read mood and decide.
    /// A failed delivery is logged; the report is still kept.
    pub async fn run_check(&self) -> Result<Option<EmergencyReport>> {
        let energy = self.energy.analyze().await?;
        self.heartbeat.check_vitals().await?;
        let attention = self.attention.evaluate().await?;
        let mood = self.store.read(|doc| doc.system_state.mood_score.clone());

        let Some(report) = build_report(&energy, Some(attention.attention_state), &mood, Utc::now())
        else {
            info!("Emergency check: all clear");
            return Ok(None);
        };

        error!(
            "Emergency raised: {:?} (attention {}, {} critical loops)",
            report.reasons,
            report.attention_state,
            report.critical_loops.len()
        );

        let delivered = match self.sink.notify(&report).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Emergency notification via {} failed: {}", self.sink.name(), e);
                false
            }
        };
        if let Err(e) = self.log.append(&report).await {
            warn!("Emergency log append failed: {}", e);
        }
        self.events.emit(EngineEvent::EmergencyRaised {
            reasons: report.reasons.clone(),
            delivered,
        });
        Ok(Some(report))
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vritual_core::OverloadLoop;

    fn energy(total: f64) -> EnergyReport {
        EnergyReport {
            timestamp: Utc::now(),
            total_loop_energy: total,
            overload_loops: vec![OverloadLoop { phrase: "again".into(), energy: total }],
            dominant_phrases: vec![],
            emotional_pressure: "neutral".into(),
        }
    }

    #[test]
    fn reasons_are_a_union() {
        let empty = MoodScore::new();
        assert_eq!(
            reasons(Some(AttentionState::Neglected), 0.0, &empty),
            vec![EmergencyReason::Neglected, EmergencyReason::EmotionAbsence]
        );
        assert_eq!(
            reasons(Some(AttentionState::Neglected), 25.0, &empty),
            vec![
                EmergencyReason::Neglected,
                EmergencyReason::LoopOverload,
                EmergencyReason::EmotionAbsence
            ]
        );
    }

    #[test]
    fn healthy_state_has_no_report() {
        let mut mood = MoodScore::new();
        mood.insert("joy".into(), 2.0);
        assert!(build_report(&energy(20.0), Some(AttentionState::Active), &mood, Utc::now()).is_none());
    }

    #[test]
    fn report_carries_critical_loops_and_snapshot() {
        let mut mood = MoodScore::new();
        mood.insert("rage".into(), 9.0);
        let report =
            build_report(&energy(21.0), Some(AttentionState::Idle), &mood, Utc::now()).unwrap();
        assert_eq!(report.reasons, vec![EmergencyReason::LoopOverload]);
        assert_eq!(report.critical_loops, vec!["again".to_string()]);
        assert_eq!(report.emotion_snapshot, mood);
        assert_eq!(report.attention_state, "idle");
        assert_eq!(report.status, "distress");
    }
}
