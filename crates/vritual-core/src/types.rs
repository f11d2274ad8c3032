//! Symbolic memory model
//!
//! `MemoryDocument` is the single root aggregate. Every component reads and
//! mutates it through the store; nothing holds a private long-lived copy.
//! Unknown keys at the top level and inside `system_state` are preserved so a
//! document written by another tool survives a load/store cycle. Timestamps
//! written without an offset are read as local time (see `timefmt`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type Timestamp = DateTime<Utc>;

/// Emotion tag → intensity. Absence of a key means no current mood for it.
pub type MoodScore = BTreeMap<String, f64>;

/// Reactions kept in the document.
pub const REACTION_RETENTION: usize = 100;

// ---------------------------------------------------------------------------
// MemoryDocument
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryDocument {
    pub rituals: Vec<RitualRecord>,
    pub loops: BTreeMap<String, LoopRecord>,
    pub reactions: Vec<ReactionEvent>,
    pub system_state: SystemState,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl MemoryDocument {
    pub fn ritual(&self, name: &str) -> Option<&RitualRecord> {
        self.rituals.iter().find(|r| r.name == name)
    }

    pub fn has_ritual(&self, name: &str) -> bool {
        self.ritual(name).is_some()
    }

    /// The loop whose `last_used` is newest. Ties go to the lexically first phrase.
    pub fn most_recent_loop(&self) -> Option<(&str, &LoopRecord)> {
        let mut best: Option<(&str, &LoopRecord)> = None;
        for (phrase, record) in &self.loops {
            let Some(used) = record.last_used else { continue };
            match best {
                Some((_, b)) if b.last_used >= Some(used) => {}
                _ => best = Some((phrase.as_str(), record)),
            }
        }
        best
    }

    /// Append a reaction, dropping the oldest beyond `REACTION_RETENTION`.
    pub fn push_reaction(&mut self, event: ReactionEvent) {
        self.reactions.push(event);
        if self.reactions.len() > REACTION_RETENTION {
            let excess = self.reactions.len() - REACTION_RETENTION;
            self.reactions.drain(..excess);
        }
    }

    /// The last `n` reactions, oldest first.
    pub fn recent_reactions(&self, n: usize) -> &[ReactionEvent] {
        &self.reactions[self.reactions.len().saturating_sub(n)..]
    }
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopImportance {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopRecord {
    pub count: u32,
    #[serde(default, deserialize_with = "crate::timefmt::option::deserialize")]
    pub last_used: Option<Timestamp>,
    pub importance: LoopImportance,
    pub loop_energy: f64,
    /// Flips to true once, when `count` first reaches the ritual threshold.
    pub ritualized: bool,
}

impl Default for LoopRecord {
    fn default() -> Self {
        Self {
            count: 0,
            last_used: None,
            importance: LoopImportance::Low,
            loop_energy: 0.0,
            ritualized: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Rituals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RitualImportance {
    #[default]
    Normal,
    Daily,
    Sacred,
    Emergent,
}

impl fmt::Display for RitualImportance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Daily => write!(f, "daily"),
            Self::Sacred => write!(f, "sacred"),
            Self::Emergent => write!(f, "emergent"),
        }
    }
}

impl std::str::FromStr for RitualImportance {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "daily" => Ok(Self::Daily),
            "sacred" => Ok(Self::Sacred),
            "emergent" => Ok(Self::Emergent),
            other => Err(format!("unknown ritual importance: {other}")),
        }
    }
}

/// A phrase trigger is stored as a bare string, an hour trigger as `{"hour": N}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RitualTrigger {
    Hour { hour: u32 },
    Phrase(String),
}

impl fmt::Display for RitualTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hour { hour } => write!(f, "{hour:02}:00"),
            Self::Phrase(p) => write!(f, "\"{p}\""),
        }
    }
}

/// A label is stored as a bare string, a callback as `{"callback": "id"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EffectKind {
    Callback { callback: String },
    Label(String),
}

impl EffectKind {
    pub fn callback(id: impl Into<String>) -> Self {
        Self::Callback { callback: id.into() }
    }

    pub fn label(text: impl Into<String>) -> Self {
        Self::Label(text.into())
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback { callback } => write!(f, "callback:{callback}"),
            Self::Label(label) => write!(f, "{label}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RitualRecord {
    pub name: String,
    pub trigger: RitualTrigger,
    pub effect: EffectKind,
    #[serde(default)]
    pub importance: RitualImportance,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default, deserialize_with = "crate::timefmt::option::deserialize")]
    pub last_triggered: Option<Timestamp>,
}

impl RitualRecord {
    pub fn new(
        name: impl Into<String>,
        trigger: RitualTrigger,
        effect: EffectKind,
        importance: RitualImportance,
    ) -> Self {
        Self {
            name: name.into(),
            trigger,
            effect,
            importance,
            usage_count: 0,
            last_triggered: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Reactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub emotion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    pub source: String,
    #[serde(deserialize_with = "crate::timefmt::deserialize")]
    pub timestamp: Timestamp,
    /// Fields such as `face` or `mood_score` written by other tools.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ReactionEvent {
    pub fn new(emotion: impl Into<String>, source: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            emotion: emotion.into(),
            emoji: None,
            source: source.into(),
            timestamp,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }
}

// ---------------------------------------------------------------------------
// System state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemState {
    pub mood_score: MoodScore,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attention: Option<AttentionSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentSnapshot>,
    #[serde(skip_serializing_if = "EnergyByHour::is_empty")]
    pub loop_energy_by_hour: EnergyByHour,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_known_hour: Option<u32>,
    pub current_mission: Option<Mission>,
    pub mission_history: Vec<Mission>,
    pub emotion_bias: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_loaded_identity: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::timefmt::option::deserialize"
    )]
    pub identity_loaded_at: Option<Timestamp>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionState {
    Active,
    Idle,
    RepeatingLoop,
    Neglected,
}

impl fmt::Display for AttentionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Idle => write!(f, "idle"),
            Self::RepeatingLoop => write!(f, "repeating_loop"),
            Self::Neglected => write!(f, "neglected"),
        }
    }
}

/// Recomputed from scratch on every attention tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionSnapshot {
    #[serde(deserialize_with = "crate::timefmt::deserialize")]
    pub timestamp: Timestamp,
    #[serde(default)]
    pub last_phrase: Option<String>,
    /// `"never"` on read means no phrase has been seen.
    #[serde(default, deserialize_with = "crate::timefmt::option::deserialize")]
    pub last_phrase_time: Option<Timestamp>,
    #[serde(default)]
    pub seconds_since_last_phrase: Option<f64>,
    pub loop_count: u32,
    pub attention_state: AttentionState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub light_level: String,
    pub sound_level: String,
    pub temperature: String,
    #[serde(default, deserialize_with = "crate::timefmt::option::deserialize")]
    pub last_update: Option<Timestamp>,
}

impl Default for EnvironmentSnapshot {
    fn default() -> Self {
        Self {
            light_level: "unknown".into(),
            sound_level: "unknown".into(),
            temperature: "unknown".into(),
            last_update: None,
        }
    }
}

/// Loop energy per hour of day (0-23). Keys are stored as strings so the map
/// round-trips through the flattened `system_state` bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnergyByHour(pub BTreeMap<String, f64>);

impl EnergyByHour {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Materialise any missing slot of the 24 at zero.
    pub fn fill_slots(&mut self) {
        for hour in 0..24u32 {
            self.0.entry(hour.to_string()).or_insert(0.0);
        }
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn get(&self, hour: u32) -> f64 {
        self.0.get(&hour.to_string()).copied().unwrap_or(0.0)
    }

    pub fn slot_mut(&mut self, hour: u32) -> &mut f64 {
        self.0.entry(hour.to_string()).or_insert(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.0
            .iter()
            .filter_map(|(k, v)| k.parse::<u32>().ok().map(|h| (h, *v)))
    }
}

// ---------------------------------------------------------------------------
// Missions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Active,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    /// Missions written without an id get a fresh one on load.
    #[serde(default = "uuid::Uuid::new_v4")]
    pub id: uuid::Uuid,
    pub title: String,
    pub goal: String,
    #[serde(deserialize_with = "crate::timefmt::deserialize")]
    pub assigned_at: Timestamp,
    #[serde(default)]
    pub success_conditions: Vec<String>,
    #[serde(default)]
    pub emotion_bias: Vec<String>,
    pub status: MissionStatus,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::timefmt::option::deserialize"
    )]
    pub completed_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// Derived reports (never read back for control decisions)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverloadLoop {
    pub phrase: String,
    pub energy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyReport {
    pub timestamp: Timestamp,
    pub total_loop_energy: f64,
    pub overload_loops: Vec<OverloadLoop>,
    pub dominant_phrases: Vec<String>,
    pub emotional_pressure: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatAlert {
    Normal,
    LoopOverload,
    InactiveStateDetected,
}

impl fmt::Display for HeartbeatAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::LoopOverload => write!(f, "loop_overload"),
            Self::InactiveStateDetected => write!(f, "inactive_state_detected"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatStatus {
    pub time: Timestamp,
    pub alive: bool,
    pub attention_state: String,
    pub top_mood: String,
    pub loop_pressure: f64,
    pub alert: HeartbeatAlert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyReason {
    Neglected,
    LoopOverload,
    EmotionAbsence,
}

impl fmt::Display for EmergencyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Neglected => write!(f, "neglected"),
            Self::LoopOverload => write!(f, "loop overload"),
            Self::EmotionAbsence => write!(f, "emotion absence"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyReport {
    pub id: uuid::Uuid,
    pub time: Timestamp,
    pub status: String,
    pub reasons: Vec<EmergencyReason>,
    pub critical_loops: Vec<String>,
    pub emotion_snapshot: MoodScore,
    pub attention_state: String,
}
