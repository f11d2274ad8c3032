//! Ritual effect dispatch.
//!
//! `EffectKind::Callback` resolves against registered closures;
//! `EffectKind::Label` is published as an `EngineEvent::RitualEffect` for
//! downstream reaction logic. Failures are logged and swallowed.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};
use vritual_core::{EffectKind, Error, Result};

use crate::events::{EngineEvent, EventBus};
use crate::rituals::Firing;

pub type EffectCallback = Arc<dyn Fn(&Firing) -> std::result::Result<(), String> + Send + Sync>;

#[derive(Clone)]
pub struct EffectDispatcher {
    callbacks: Arc<DashMap<String, EffectCallback>>,
    events: EventBus,
}

impl EffectDispatcher {
    pub fn new(events: EventBus) -> Self {
        Self {
            callbacks: Arc::new(DashMap::new()),
            events,
        }
    }

    pub fn register<F>(&self, id: impl Into<String>, callback: F)
    where
        F: Fn(&Firing) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.callbacks.insert(id.into(), Arc::new(callback));
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.callbacks.contains_key(id)
    }

    pub fn dispatch(&self, firing: &Firing) -> Result<()> {
        match &firing.effect {
            EffectKind::Label(label) => {
                debug!("Ritual effect: {} → {}", firing.name, label);
                self.events.emit(EngineEvent::RitualEffect {
                    ritual: firing.name.clone(),
                    label: label.clone(),
                });
                Ok(())
            }
            EffectKind::Callback { callback } => {
                // Clone out of the map so the callback runs without holding a shard lock.
                let f = self
                    .callbacks
                    .get(callback)
                    .map(|entry| entry.value().clone())
                    .ok_or_else(|| Error::effect_dispatch(callback, "no callback registered"))?;
                f(firing).map_err(|message| Error::effect_dispatch(callback, message))
            }
        }
    }

    /// Run every effect; returns how many failed.
    pub fn dispatch_all(&self, fired: &[Firing]) -> usize {
        let mut failed = 0;
        for firing in fired {
            if let Err(e) = self.dispatch(firing) {
                warn!("Effect for ritual {} failed: {}", firing.name, e);
                failed += 1;
            }
        }
        failed
    }
}
