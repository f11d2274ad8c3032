//! Engine — wires every component onto one store and one event bus.

use std::sync::Arc;

use tracing::{debug, info};
use vritual_core::{ReactionEvent, Result};
use vritual_store::{MemoryGuard, RollingLog, StateStore};

use crate::attention::{self, AttentionMonitor};
use crate::config::VritualConfig;
use crate::effects::EffectDispatcher;
use crate::emergency::{self, EmergencyMonitor};
use crate::energy::{self, EnergyMeter};
use crate::environment::{self, EnvironmentSense};
use crate::events::EventBus;
use crate::fusion::SymbolFuser;
use crate::heartbeat::{self, Heartbeat};
use crate::loops::{LoopTracker, Registration};
use crate::mission::{self, MissionController};
use crate::mood::MoodAccumulator;
use crate::notify::{self, NotificationSink};
use crate::preset::PresetLoader;
use crate::reactions::{infer_emotion, ReactionLog};
use crate::rituals::{Firing, RitualRegistry, TriggerContext};
use crate::timekeeper::{self, Timekeeper};

/// What one observed phrase caused.
#[derive(Debug, Clone, Default)]
pub struct PhraseOutcome {
    /// `None` when the phrase was empty after trimming.
    pub registration: Option<Registration>,
    pub fired: Vec<Firing>,
    pub reactions: Vec<ReactionEvent>,
}

#[derive(Clone)]
pub struct Engine {
    pub config: VritualConfig,
    pub store: StateStore,
    pub events: EventBus,
    pub effects: EffectDispatcher,
    pub loops: LoopTracker,
    pub rituals: RitualRegistry,
    pub mood: MoodAccumulator,
    pub reactions: ReactionLog,
    pub attention: AttentionMonitor,
    pub energy: EnergyMeter,
    pub heartbeat: Heartbeat,
    pub emergency: EmergencyMonitor,
    pub timekeeper: Timekeeper,
    pub environment: EnvironmentSense,
    pub missions: MissionController,
    pub presets: PresetLoader,
    pub fusions: SymbolFuser,
    pub guard: Arc<MemoryGuard>,
}

impl Engine {
    /// Open the store described by `config` and build every component.
    pub async fn open(config: &VritualConfig) -> Result<Self> {
        let store = StateStore::open(config.store_config()).await?;
        let sink = notify::sink_from_config(&config.notify);
        Ok(Self::with_sink(config, store, sink))
    }

    pub fn with_sink(
        config: &VritualConfig,
        store: StateStore,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let paths = &config.paths;
        let events = EventBus::default();
        let effects = EffectDispatcher::new(events.clone());

        let rituals = RitualRegistry::new(store.clone(), effects.clone(), events.clone());
        let attention = AttentionMonitor::new(
            store.clone(),
            RollingLog::new(paths.resolve(&paths.attention_log), attention::LOG_CAP),
            events.clone(),
        );
        let energy = EnergyMeter::new(
            store.clone(),
            RollingLog::new(paths.resolve(&paths.energy_log), energy::LOG_CAP),
            events.clone(),
        );
        let heartbeat = Heartbeat::new(
            store.clone(),
            RollingLog::new(paths.resolve(&paths.heartbeat_log), heartbeat::LOG_CAP),
            events.clone(),
        );
        info!("Emergency notifications via {} sink", sink.name());
        let emergency = EmergencyMonitor::new(
            store.clone(),
            energy.clone(),
            heartbeat.clone(),
            attention.clone(),
            sink,
            RollingLog::new(paths.resolve(&paths.emergency_log), emergency::LOG_CAP),
            events.clone(),
        );
        let timekeeper = Timekeeper::new(
            store.clone(),
            rituals.clone(),
            RollingLog::new(paths.resolve(&paths.timekeeper_log), timekeeper::LOG_CAP),
            events.clone(),
        );
        let environment = EnvironmentSense::new(
            store.clone(),
            RollingLog::new(paths.resolve(&paths.environment_log), environment::LOG_CAP),
            events.clone(),
        );
        let missions = MissionController::new(
            store.clone(),
            RollingLog::new(paths.resolve(&paths.mission_log), mission::LOG_CAP),
            events.clone(),
        );

        Self {
            config: config.clone(),
            loops: LoopTracker::new(store.clone(), events.clone()),
            mood: MoodAccumulator::new(store.clone(), events.clone()),
            reactions: ReactionLog::new(store.clone(), events.clone()),
            presets: PresetLoader::new(paths.presets_path(), store.clone(), events.clone()),
            fusions: SymbolFuser::new(store.clone(), paths.fusions_path()),
            guard: Arc::new(MemoryGuard::new(paths.memory_path(), paths.snapshot_path())),
            store,
            events,
            effects,
            rituals,
            attention,
            energy,
            heartbeat,
            emergency,
            timekeeper,
            environment,
            missions,
        }
    }

    /// Sensory entry point: register the phrase, scan rituals against it,
    /// then react to every ritual that fired. Each step commits on its own.
    pub async fn on_phrase_observed(&self, phrase: &str) -> Result<PhraseOutcome> {
        let Some(registration) = self.loops.register_phrase(phrase).await? else {
            debug!("Ignoring empty phrase");
            return Ok(PhraseOutcome::default());
        };

        let fired = self
            .rituals
            .scan_and_trigger(TriggerContext::phrase(registration.phrase.clone()))
            .await?;

        let mut reactions = Vec::with_capacity(fired.len());
        for firing in &fired {
            let emotion = infer_emotion(&firing.name);
            reactions.push(self.reactions.log_reaction(emotion, &firing.name).await?);
            self.mood.stack(emotion, 1.0).await?;
        }

        Ok(PhraseOutcome {
            registration: Some(registration),
            fired,
            reactions,
        })
    }
}
