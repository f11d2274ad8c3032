//! Vritual Engine — the monitors and promotion pipeline over the memory document
//!
//! Every component is a pure function of the current document plus a thin
//! async wrapper that applies it through the `StateStore`:
//!
//! - observation → `loops` (count, energy, promotion) → `rituals` (trigger, effect)
//! - `mood` stacks and decays emotion intensity
//! - `attention`, `energy`, `heartbeat` classify the document on their own ticks
//! - `emergency` composes them and dispatches through a `notify` sink
//! - `timekeeper`, `environment`, `mission`, `preset` keep the rest of system state
//! - `fusion` and `export` are read-only views written to side files

pub mod attention;
pub mod config;
pub mod effects;
pub mod emergency;
pub mod energy;
pub mod engine;
pub mod environment;
pub mod events;
pub mod export;
pub mod fusion;
pub mod heartbeat;
pub mod loops;
pub mod mission;
pub mod mood;
pub mod notify;
pub mod preset;
pub mod reactions;
pub mod rituals;
pub mod timekeeper;

pub use config::VritualConfig;
pub use engine::{Engine, PhraseOutcome};
pub use events::{EngineEvent, EventBus};

/// Round to two decimals for reports.
pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
