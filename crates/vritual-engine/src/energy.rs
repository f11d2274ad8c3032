//! Energy meter — aggregate loop pressure and emotional pressure.

use chrono::Utc;
use tracing::{info, warn};
use vritual_core::{EnergyReport, MemoryDocument, OverloadLoop, ReactionEvent, Result, Timestamp};
use vritual_store::{RollingLog, StateStore};

use crate::events::{EngineEvent, EventBus};

pub const OVERLOAD_ENERGY: f64 = 1.0;
pub const DOMINANT_COUNT: u32 = 5;
/// Reactions considered for emotional pressure.
pub const PRESSURE_WINDOW: usize = 20;
pub const NEUTRAL: &str = "neutral";
pub const LOG_CAP: usize = 100;

/// Most frequent emotion; ties go to the one seen first in the window.
pub fn emotional_pressure(reactions: &[ReactionEvent]) -> String {
    let mut tally: Vec<(&str, usize)> = Vec::new();
    for reaction in reactions {
        match tally.iter_mut().find(|(e, _)| *e == reaction.emotion) {
            Some((_, n)) => *n += 1,
            None => tally.push((reaction.emotion.as_str(), 1)),
        }
    }
    let mut best: Option<(&str, usize)> = None;
    for (emotion, n) in tally {
        match best {
            Some((_, b)) if b >= n => {}
            _ => best = Some((emotion, n)),
        }
    }
    best.map(|(e, _)| e.to_string())
        .unwrap_or_else(|| NEUTRAL.to_string())
}

pub fn analyze(doc: &MemoryDocument, now: Timestamp) -> EnergyReport {
    let total: f64 = doc.loops.values().map(|r| r.loop_energy).sum();
    let overload_loops = doc
        .loops
        .iter()
        .filter(|(_, r)| r.loop_energy >= OVERLOAD_ENERGY)
        .map(|(phrase, r)| OverloadLoop {
            phrase: phrase.clone(),
            energy: crate::round2(r.loop_energy),
        })
        .collect();
    let dominant_phrases = doc
        .loops
        .iter()
        .filter(|(_, r)| r.count >= DOMINANT_COUNT)
        .map(|(phrase, _)| phrase.clone())
        .collect();

    EnergyReport {
        timestamp: now,
        total_loop_energy: crate::round2(total),
        overload_loops,
        dominant_phrases,
        emotional_pressure: emotional_pressure(doc.recent_reactions(PRESSURE_WINDOW)),
    }
}

#[derive(Clone)]
pub struct EnergyMeter {
    store: StateStore,
    log: RollingLog<EnergyReport>,
    events: EventBus,
}

impl EnergyMeter {
    pub fn new(store: StateStore, log: RollingLog<EnergyReport>, events: EventBus) -> Self {
        Self { store, log, events }
    }

    /// Read-only over the document; the report goes to the energy log.
    pub async fn analyze(&self) -> Result<EnergyReport> {
        let now = Utc::now();
        let report = self.store.read(|doc| analyze(doc, now));
        info!(
            "Loop energy {:.2} ({} overloaded, {} dominant, pressure: {})",
            report.total_loop_energy,
            report.overload_loops.len(),
            report.dominant_phrases.len(),
            report.emotional_pressure
        );
        if let Err(e) = self.log.append(&report).await {
            warn!("Energy log append failed: {}", e);
        }
        self.events.emit(EngineEvent::EnergyAnalyzed {
            total_loop_energy: report.total_loop_energy,
        });
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vritual_core::LoopRecord;

    fn reaction(emotion: &str) -> ReactionEvent {
        ReactionEvent::new(emotion, "t", Utc::now())
    }

    #[test]
    fn pressure_is_neutral_without_reactions() {
        assert_eq!(emotional_pressure(&[]), NEUTRAL);
    }

    #[test]
    fn pressure_picks_most_frequent_then_earliest() {
        let r = [reaction("joy"), reaction("rage"), reaction("rage"), reaction("joy")];
        assert_eq!(emotional_pressure(&r), "joy");
        let r = [reaction("joy"), reaction("rage"), reaction("rage")];
        assert_eq!(emotional_pressure(&r), "rage");
    }

    #[test]
    fn pressure_only_sees_the_last_window() {
        let mut doc = MemoryDocument::default();
        for _ in 0..30 {
            doc.push_reaction(reaction("calm"));
        }
        for _ in 0..PRESSURE_WINDOW {
            doc.push_reaction(reaction("curious"));
        }
        assert_eq!(analyze(&doc, Utc::now()).emotional_pressure, "curious");
    }

    #[test]
    fn partitions_overload_and_dominant() {
        let mut doc = MemoryDocument::default();
        doc.loops.insert("hot".into(), LoopRecord { count: 3, loop_energy: 1.2, ..Default::default() });
        doc.loops.insert("busy".into(), LoopRecord { count: 6, loop_energy: 0.4, ..Default::default() });
        doc.loops.insert("quiet".into(), LoopRecord { count: 1, loop_energy: 0.2, ..Default::default() });

        let report = analyze(&doc, Utc::now());
        assert!((report.total_loop_energy - 1.8).abs() < 1e-9);
        assert_eq!(report.overload_loops, vec![OverloadLoop { phrase: "hot".into(), energy: 1.2 }]);
        assert_eq!(report.dominant_phrases, vec!["busy".to_string()]);
    }
}
