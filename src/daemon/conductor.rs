//! Stdin sensory adapter.
//!
//! Plain lines are observed phrases. Lines starting with `{` are commands:
//!
//! ```text
//! {"cmd": "stack", "emotion": "joy", "weight": 2.0}
//! {"cmd": "environment", "light_level": "dim", "sound_level": "quiet", "temperature": "cold"}
//! {"cmd": "assign_mission", "title": "Greet", "goal": "Say hello"}
//! {"cmd": "load_preset", "name": "night", "merge": true}
//! ```

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use vritual_core::{EnvironmentSnapshot, Result};
use vritual_engine::preset::LoadMode;
use vritual_engine::Engine;

use super::status;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ConductorCommand {
    Observe {
        phrase: String,
    },
    Stack {
        emotion: String,
        weight: Option<f64>,
    },
    Environment {
        light_level: String,
        sound_level: String,
        temperature: String,
    },
    AssignMission {
        title: String,
        goal: String,
        #[serde(default)]
        success_conditions: Vec<String>,
        #[serde(default)]
        emotion_bias: Vec<String>,
    },
    CompleteMission,
    LoadPreset {
        name: String,
        #[serde(default)]
        merge: bool,
    },
    Snapshot,
    Status,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SensoryInput {
    Phrase(String),
    Command(ConductorCommand),
}

/// `None` for blank lines and malformed commands.
pub fn parse_line(line: &str) -> Option<SensoryInput> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('{') {
        return Some(SensoryInput::Phrase(line.to_string()));
    }
    match serde_json::from_str::<ConductorCommand>(line) {
        Ok(cmd) => Some(SensoryInput::Command(cmd)),
        Err(e) => {
            warn!("Invalid command {:?}: {}", line, e);
            None
        }
    }
}

pub async fn listen_stdin(tx: mpsc::Sender<SensoryInput>) {
    let stdin = tokio::io::stdin();
    let reader = BufReader::new(stdin);
    let mut lines = reader.lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(input) = parse_line(&line) {
            if tx.send(input).await.is_err() {
                break;
            }
        }
    }
}

pub async fn handle(engine: &Engine, input: SensoryInput) -> Result<()> {
    let cmd = match input {
        SensoryInput::Phrase(phrase) => ConductorCommand::Observe { phrase },
        SensoryInput::Command(cmd) => cmd,
    };
    match cmd {
        ConductorCommand::Observe { phrase } => {
            let outcome = engine.on_phrase_observed(&phrase).await?;
            for firing in &outcome.fired {
                info!("'{}' → ritual {}", phrase, firing.name);
            }
        }
        ConductorCommand::Stack { emotion, weight } => {
            engine.mood.stack(&emotion, weight.unwrap_or(1.0)).await?;
        }
        ConductorCommand::Environment { light_level, sound_level, temperature } => {
            engine
                .environment
                .record(EnvironmentSnapshot {
                    light_level,
                    sound_level,
                    temperature,
                    last_update: None,
                })
                .await?;
        }
        ConductorCommand::AssignMission { title, goal, success_conditions, emotion_bias } => {
            engine
                .missions
                .assign(&title, &goal, success_conditions, emotion_bias)
                .await?;
        }
        ConductorCommand::CompleteMission => {
            engine.missions.complete().await?;
        }
        ConductorCommand::LoadPreset { name, merge } => {
            let mode = if merge { LoadMode::Merge } else { LoadMode::Replace };
            engine.presets.load(&name, mode).await?;
        }
        ConductorCommand::Snapshot => {
            engine.guard.save_snapshot().await?;
        }
        ConductorCommand::Status => {
            println!("{}", status::render(&engine.store.snapshot()));
        }
    }
    Ok(())
}
