//! Ritual registry — named trigger → effect rules.
//!
//! Matching is independent per ritual: one context can fire any number of
//! rituals in the same scan. Usage statistics are persisted once per scan,
//! then effects run; an effect failure never rolls the statistics back.

use chrono::{Local, Timelike, Utc};
use tracing::{info, warn};
use vritual_core::{
    EffectKind, MemoryDocument, Result, RitualImportance, RitualRecord, RitualTrigger, Timestamp,
};
use vritual_store::StateStore;

use crate::effects::EffectDispatcher;
use crate::events::{EngineEvent, EventBus};

/// What a scan is matched against.
#[derive(Debug, Clone, Default)]
pub struct TriggerContext {
    pub phrase: Option<String>,
}

impl TriggerContext {
    pub fn phrase(phrase: impl Into<String>) -> Self {
        Self { phrase: Some(phrase.into()) }
    }

    /// Clock-only context; only hour triggers can match.
    pub fn clock() -> Self {
        Self { phrase: None }
    }
}

/// One ritual that fired during a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Firing {
    pub name: String,
    pub effect: EffectKind,
    pub usage_count: u64,
}

pub fn trigger_matches(trigger: &RitualTrigger, phrase: Option<&str>, hour: u32) -> bool {
    match trigger {
        RitualTrigger::Phrase(p) => phrase.is_some_and(|ctx| ctx.contains(p.as_str())),
        RitualTrigger::Hour { hour: h } => *h == hour,
    }
}

/// Append a ritual unless its name is taken. Returns whether it was added.
pub fn insert(doc: &mut MemoryDocument, record: RitualRecord) -> bool {
    if doc.has_ritual(&record.name) {
        return false;
    }
    doc.rituals.push(record);
    true
}

/// Fire every matching ritual, updating usage statistics in place.
pub fn scan(
    doc: &mut MemoryDocument,
    phrase: Option<&str>,
    hour: u32,
    now: Timestamp,
) -> Vec<Firing> {
    let mut fired = Vec::new();
    for ritual in doc.rituals.iter_mut() {
        if !trigger_matches(&ritual.trigger, phrase, hour) {
            continue;
        }
        ritual.usage_count += 1;
        ritual.last_triggered = Some(now);
        fired.push(Firing {
            name: ritual.name.clone(),
            effect: ritual.effect.clone(),
            usage_count: ritual.usage_count,
        });
    }
    fired
}

#[derive(Clone)]
pub struct RitualRegistry {
    store: StateStore,
    effects: EffectDispatcher,
    events: EventBus,
}

impl RitualRegistry {
    pub fn new(store: StateStore, effects: EffectDispatcher, events: EventBus) -> Self {
        Self { store, effects, events }
    }

    /// Register a ritual. A duplicate name is rejected (no-op) and reported as false.
    pub async fn add_ritual(
        &self,
        name: &str,
        trigger: RitualTrigger,
        effect: EffectKind,
        importance: RitualImportance,
    ) -> Result<bool> {
        let record = RitualRecord::new(name, trigger, effect, importance);
        let added = self.store.transact(move |doc| insert(doc, record)).await?;
        if added {
            info!("Ritual added: {} ({})", name, importance);
        } else {
            warn!("Ritual {} already exists — not added", name);
            self.events.emit(EngineEvent::RitualRejected { name: name.to_string() });
        }
        Ok(added)
    }

    /// Scan against the wall clock.
    pub async fn scan_and_trigger(&self, context: TriggerContext) -> Result<Vec<Firing>> {
        self.scan_and_trigger_at(context, Utc::now(), Local::now().hour())
            .await
    }

    pub async fn scan_and_trigger_at(
        &self,
        context: TriggerContext,
        now: Timestamp,
        hour: u32,
    ) -> Result<Vec<Firing>> {
        let fired = self
            .store
            .transact(move |doc| scan(doc, context.phrase.as_deref(), hour, now))
            .await?;

        for firing in &fired {
            info!("Ritual triggered: {} (uses: {})", firing.name, firing.usage_count);
            self.events.emit(EngineEvent::RitualTriggered {
                name: firing.name.clone(),
                usage_count: firing.usage_count,
            });
        }
        self.effects.dispatch_all(&fired);
        Ok(fired)
    }

    pub fn list(&self) -> Vec<RitualRecord> {
        self.store.read(|doc| doc.rituals.clone())
    }

    pub fn get(&self, name: &str) -> Option<RitualRecord> {
        self.store.read(|doc| doc.ritual(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ritual(name: &str, trigger: RitualTrigger) -> RitualRecord {
        RitualRecord::new(name, trigger, EffectKind::label(name), RitualImportance::Normal)
    }

    #[test]
    fn phrase_trigger_is_substring_match() {
        let t = RitualTrigger::Phrase("mirror".into());
        assert!(trigger_matches(&t, Some("look in the mirror please"), 3));
        assert!(!trigger_matches(&t, Some("Mirror"), 3));
        assert!(!trigger_matches(&t, None, 3));
    }

    #[test]
    fn hour_trigger_matches_clock_only() {
        let t = RitualTrigger::Hour { hour: 6 };
        assert!(trigger_matches(&t, None, 6));
        assert!(trigger_matches(&t, Some("anything"), 6));
        assert!(!trigger_matches(&t, None, 7));
    }

    #[test]
    fn insert_rejects_duplicate_names() {
        let mut doc = MemoryDocument::default();
        assert!(insert(&mut doc, ritual("a", RitualTrigger::Phrase("x".into()))));
        assert!(!insert(&mut doc, ritual("a", RitualTrigger::Phrase("y".into()))));
        assert_eq!(doc.rituals.len(), 1);
        assert_eq!(doc.rituals[0].trigger, RitualTrigger::Phrase("x".into()));
    }

    #[test]
    fn scan_fires_all_matches_in_order() {
        let mut doc = MemoryDocument::default();
        insert(&mut doc, ritual("greet", RitualTrigger::Phrase("hello".into())));
        insert(&mut doc, ritual("other", RitualTrigger::Phrase("bye".into())));
        insert(&mut doc, ritual("greet_world", RitualTrigger::Phrase("hello world".into())));
        insert(&mut doc, ritual("dawn", RitualTrigger::Hour { hour: 6 }));

        let now = Utc::now();
        let fired = scan(&mut doc, Some("hello world"), 6, now);
        let names: Vec<&str> = fired.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["greet", "greet_world", "dawn"]);

        assert_eq!(doc.ritual("greet").unwrap().usage_count, 1);
        assert_eq!(doc.ritual("greet").unwrap().last_triggered, Some(now));
        assert_eq!(doc.ritual("other").unwrap().usage_count, 0);
        assert!(doc.ritual("other").unwrap().last_triggered.is_none());
    }
}
