//! Periodic monitor tasks.
//!
//! Each monitor ticks on its own interval. Cancellation is only observed at
//! the sleep boundary, so a tick in flight always finishes its transaction.
//! Contention is absorbed by the next tick; corruption stops the task.

use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vritual_core::{Error, Result};
use vritual_engine::config::ScheduleConfig;
use vritual_engine::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Monitor {
    Attention,
    Energy,
    Heartbeat,
    Emergency,
    MoodDecay,
    Timekeeper,
}

impl Monitor {
    pub const ALL: [Monitor; 6] = [
        Monitor::Attention,
        Monitor::Timekeeper,
        Monitor::Heartbeat,
        Monitor::MoodDecay,
        Monitor::Energy,
        Monitor::Emergency,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Attention => "attention",
            Self::Energy => "energy",
            Self::Heartbeat => "heartbeat",
            Self::Emergency => "emergency",
            Self::MoodDecay => "mood-decay",
            Self::Timekeeper => "timekeeper",
        }
    }

    pub fn interval(&self, schedule: &ScheduleConfig) -> Duration {
        match self {
            Self::Attention => schedule.attention(),
            Self::Energy => schedule.energy(),
            Self::Heartbeat => schedule.heartbeat(),
            Self::Emergency => schedule.emergency(),
            Self::MoodDecay => schedule.mood_decay(),
            Self::Timekeeper => schedule.timekeeper(),
        }
    }

    /// One tick. Returns a one-line summary.
    pub async fn run_once(&self, engine: &Engine) -> Result<String> {
        let summary = match self {
            Self::Attention => {
                let snap = engine.attention.evaluate().await?;
                format!("attention: {}", snap.attention_state)
            }
            Self::Energy => {
                let report = engine.energy.analyze().await?;
                format!(
                    "loop energy: {:.2} (pressure: {})",
                    report.total_loop_energy, report.emotional_pressure
                )
            }
            Self::Heartbeat => {
                let status = engine.heartbeat.check_vitals().await?;
                format!("heartbeat: {} (alive: {})", status.alert, status.alive)
            }
            Self::Emergency => match engine.emergency.run_check().await? {
                Some(report) => {
                    let reasons: Vec<String> = report.reasons.iter().map(|r| r.to_string()).collect();
                    format!("emergency: {}", reasons.join(", "))
                }
                None => "emergency: all clear".to_string(),
            },
            Self::MoodDecay => {
                let changed = engine.mood.decay().await?;
                format!("mood decay: {}", if changed { "applied" } else { "nothing to decay" })
            }
            Self::Timekeeper => match engine.timekeeper.tick().await? {
                Some((entry, fired)) => {
                    format!("hour {:02}: {} rituals fired", entry.hour, fired.len())
                }
                None => "hour unchanged".to_string(),
            },
        };
        Ok(summary)
    }
}

/// Tick until cancelled. Returns `Err` only for errors that must reach the operator.
pub async fn run_periodic(
    engine: Engine,
    monitor: Monitor,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    info!("{} monitor every {}s", monitor.name(), interval.as_secs());
    loop {
        match monitor.run_once(&engine).await {
            Ok(summary) => debug!("{}", summary),
            Err(e) if e.is_retryable() => {
                warn!("{} tick skipped: {} (retrying next tick)", monitor.name(), e)
            }
            Err(e @ Error::CorruptState { .. }) => {
                error!("{} monitor stopping: {}", monitor.name(), e);
                return Err(e);
            }
            Err(e) => warn!("{} tick failed: {}", monitor.name(), e),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!("{} monitor stopped", monitor.name());
    Ok(())
}

/// Spawn every monitor on its configured interval.
pub fn spawn_all(engine: &Engine, cancel: &CancellationToken) -> JoinSet<Result<()>> {
    let mut tasks = JoinSet::new();
    for monitor in Monitor::ALL {
        let interval = monitor.interval(&engine.config.schedule);
        tasks.spawn(run_periodic(engine.clone(), monitor, interval, cancel.child_token()));
    }
    tasks
}
