//! Attention monitor — classifies recent interaction activity.

use chrono::Utc;
use tracing::{info, warn};
use vritual_core::{AttentionSnapshot, AttentionState, MemoryDocument, Result, Timestamp};
use vritual_store::{RollingLog, StateStore};

use crate::events::{EngineEvent, EventBus};

pub const NEGLECT_AFTER_SECS: f64 = 300.0;
pub const REPEATING_LOOP_COUNT: u32 = 5;
pub const ACTIVE_WITHIN_SECS: f64 = 20.0;
pub const LOG_CAP: usize = 100;

/// First matching rule wins: neglected, repeating loop, active, idle.
/// No phrase ever observed (`None`) can only be a repeating loop or idle.
pub fn classify(seconds_silent: Option<f64>, loop_count: u32) -> AttentionState {
    if seconds_silent.is_some_and(|s| s > NEGLECT_AFTER_SECS) {
        AttentionState::Neglected
    } else if loop_count >= REPEATING_LOOP_COUNT {
        AttentionState::RepeatingLoop
    } else if seconds_silent.is_some_and(|s| s < ACTIVE_WITHIN_SECS) {
        AttentionState::Active
    } else {
        AttentionState::Idle
    }
}

/// Build a fresh snapshot from the most recently used loop.
pub fn assess(doc: &MemoryDocument, now: Timestamp) -> AttentionSnapshot {
    let recent = doc.most_recent_loop();
    let last_phrase_time = recent.and_then(|(_, r)| r.last_used);
    let seconds_silent = last_phrase_time
        .map(|t| (now - t).num_milliseconds().max(0) as f64 / 1000.0)
        .map(crate::round2);
    let loop_count = recent.map(|(_, r)| r.count).unwrap_or(0);

    AttentionSnapshot {
        timestamp: now,
        last_phrase: recent.map(|(p, _)| p.to_string()),
        last_phrase_time,
        seconds_since_last_phrase: seconds_silent,
        loop_count,
        attention_state: classify(seconds_silent, loop_count),
    }
}

#[derive(Clone)]
pub struct AttentionMonitor {
    store: StateStore,
    log: RollingLog<AttentionSnapshot>,
    events: EventBus,
}

impl AttentionMonitor {
    pub fn new(store: StateStore, log: RollingLog<AttentionSnapshot>, events: EventBus) -> Self {
        Self { store, log, events }
    }

    pub async fn evaluate(&self) -> Result<AttentionSnapshot> {
        self.evaluate_at(Utc::now()).await
    }

    pub async fn evaluate_at(&self, now: Timestamp) -> Result<AttentionSnapshot> {
        let snapshot = self
            .store
            .transact(move |doc| {
                let snapshot = assess(doc, now);
                doc.system_state.attention = Some(snapshot.clone());
                snapshot
            })
            .await?;

        info!(
            "Attention: {} (last phrase {:?}, silent {:?}s)",
            snapshot.attention_state, snapshot.last_phrase, snapshot.seconds_since_last_phrase
        );
        if let Err(e) = self.log.append(&snapshot).await {
            warn!("Attention log append failed: {}", e);
        }
        self.events.emit(EngineEvent::AttentionEvaluated {
            state: snapshot.attention_state,
            seconds_silent: snapshot.seconds_since_last_phrase,
        });
        Ok(snapshot)
    }

    /// The last evaluated state, if any.
    pub fn current(&self) -> Option<AttentionSnapshot> {
        self.store.read(|doc| doc.system_state.attention.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vritual_core::LoopRecord;

    #[test]
    fn neglect_outranks_repeating_loop() {
        assert_eq!(classify(Some(400.0), 6), AttentionState::Neglected);
    }

    #[test]
    fn repeating_loop_outranks_active() {
        assert_eq!(classify(Some(3.0), 5), AttentionState::RepeatingLoop);
    }

    #[test]
    fn boundaries_are_exclusive() {
        assert_eq!(classify(Some(300.0), 0), AttentionState::Idle);
        assert_eq!(classify(Some(20.0), 0), AttentionState::Idle);
        assert_eq!(classify(Some(19.9), 4), AttentionState::Active);
    }

    #[test]
    fn never_observed_is_idle() {
        assert_eq!(classify(None, 0), AttentionState::Idle);
        let snap = assess(&MemoryDocument::default(), Utc::now());
        assert_eq!(snap.attention_state, AttentionState::Idle);
        assert!(snap.last_phrase.is_none());
        assert!(snap.seconds_since_last_phrase.is_none());
    }

    #[test]
    fn assess_uses_most_recent_phrase() {
        let now = Utc::now();
        let mut doc = MemoryDocument::default();
        doc.loops.insert(
            "old".into(),
            LoopRecord { count: 9, last_used: Some(now - Duration::seconds(900)), ..Default::default() },
        );
        doc.loops.insert(
            "new".into(),
            LoopRecord { count: 2, last_used: Some(now - Duration::seconds(5)), ..Default::default() },
        );
        let snap = assess(&doc, now);
        assert_eq!(snap.last_phrase.as_deref(), Some("new"));
        assert_eq!(snap.loop_count, 2);
        assert_eq!(snap.seconds_since_last_phrase, Some(5.0));
        assert_eq!(snap.attention_state, AttentionState::Active);
    }
}
