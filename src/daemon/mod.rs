//! Daemon — every monitor on its interval plus the stdin sensory adapter.

pub mod conductor;
pub mod schedule;
pub mod status;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vritual_core::Error;
use vritual_engine::Engine;

use conductor::SensoryInput;

/// Run until `cancel` fires, a monitor hits corrupt state, or input fails fatally.
/// Always attempts a final snapshot on the way out.
pub async fn run(engine: Engine, cancel: CancellationToken) -> anyhow::Result<()> {
    engine.guard.validate().await?;
    if engine.guard.save_snapshot().await? {
        info!("Startup snapshot written to {}", engine.guard.snapshot_path().display());
    }

    let mut monitors = schedule::spawn_all(&engine, &cancel);

    let (input_tx, mut input_rx) = mpsc::channel::<SensoryInput>(64);
    tokio::spawn(conductor::listen_stdin(input_tx));
    let mut stdin_open = true;

    info!("vritual daemon running (data dir {})", engine.config.paths.data_dir.display());

    let mut outcome: anyhow::Result<()> = Ok(());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            input = input_rx.recv(), if stdin_open => match input {
                Some(input) => match conductor::handle(&engine, input).await {
                    Ok(()) => {}
                    Err(e @ Error::CorruptState { .. }) => {
                        error!("Stopping: {}", e);
                        outcome = Err(e.into());
                        break;
                    }
                    Err(e) => warn!("Input not applied: {}", e),
                },
                None => {
                    info!("stdin closed — monitors keep running");
                    stdin_open = false;
                }
            },
            Some(joined) = monitors.join_next() => {
                let failure = match joined {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(anyhow::Error::from(e)),
                    Err(e) => Some(anyhow::anyhow!("monitor task panicked: {e}")),
                };
                if let Some(e) = failure {
                    outcome = Err(e);
                    break;
                }
            }
        }
    }

    cancel.cancel();
    while monitors.join_next().await.is_some() {}

    match engine.guard.save_snapshot().await {
        Ok(true) => info!("Final snapshot written"),
        Ok(false) => {}
        Err(e) => warn!("Final snapshot failed: {}", e),
    }
    outcome
}
