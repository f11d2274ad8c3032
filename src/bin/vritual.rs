//! vritual — shared symbolic state engine
//!
//! Usage:
//!   vritual run                          → daemon: monitors + stdin phrases
//!   vritual observe "good morning"       → one observation
//!   vritual monitor heartbeat --loop     → one monitor on its interval
//!   vritual status                       → rituals, loops, mood, mission
//!   vritual export                       → JSONL files under compressed_memory/
//!
//! `status`, `guard`, `export`, `ritual list` and `ritual fuse` only read the
//! document and can run beside a daemon; every other command takes the
//! document lock.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vritual::daemon::{self, schedule::Monitor, status};
use vritual_core::{EffectKind, RitualImportance, RitualTrigger};
use vritual_engine::preset::LoadMode;
use vritual_engine::{export, fusion, Engine, VritualConfig};
use vritual_store::{load_document, MemoryGuard};

const CONFIG_FILE: &str = "vritual.toml";

#[derive(Parser)]
#[command(
    name = "vritual",
    about = "Shared symbolic state engine — loops, rituals, mood and monitors",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (TOML). Default: <data-dir>/vritual.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the memory document, presets and logs
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    /// Write logs to a file (in addition to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every monitor on its interval and read phrases from stdin
    Run,
    /// Observe one phrase
    Observe { phrase: String },
    /// Run one monitor once, or on its interval with --loop
    Monitor {
        #[arg(value_enum)]
        which: Monitor,
        #[arg(long = "loop", default_value_t = false)]
        repeat: bool,
    },
    /// Mood stacking and inspection
    Mood {
        #[command(subcommand)]
        action: MoodAction,
    },
    /// Ritual registry
    Ritual {
        #[command(subcommand)]
        action: RitualAction,
    },
    /// Identity presets
    Preset {
        #[command(subcommand)]
        action: PresetAction,
    },
    /// Missions
    Mission {
        #[command(subcommand)]
        action: MissionAction,
    },
    /// Validate, snapshot or diff the memory document
    Guard {
        #[command(subcommand)]
        action: GuardAction,
    },
    /// Show rituals, loops, reactions, attention, mood and mission
    Status,
    /// Write the document as JSONL files, one per section
    Export {
        /// Output directory. Default: <data-dir>/compressed_memory
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show the effective configuration
    Config {
        /// Dump default config as TOML
        #[arg(long, default_value_t = false)]
        dump: bool,
    },
}

#[derive(Subcommand)]
enum MoodAction {
    Stack {
        emotion: String,
        #[arg(long, default_value_t = 1.0)]
        weight: f64,
    },
    Top,
}

#[derive(Subcommand)]
enum RitualAction {
    /// Effect `callback:<id>` invokes a registered callback; anything else is a label
    Add {
        name: String,
        trigger: String,
        effect: String,
        #[arg(long, default_value = "normal")]
        importance: RitualImportance,
        /// Treat <trigger> as an hour of day (0-23)
        #[arg(long, default_value_t = false)]
        hour: bool,
    },
    List,
    /// Propose fusions of similar rituals (the ritual list is not changed)
    Fuse {
        /// Don't write the fusions file
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum PresetAction {
    List,
    Load {
        name: String,
        /// Add missing rituals instead of replacing the list
        #[arg(long, default_value_t = false)]
        merge: bool,
    },
}

#[derive(Subcommand)]
enum MissionAction {
    Assign {
        title: String,
        goal: String,
        #[arg(long = "emotion")]
        emotions: Vec<String>,
        #[arg(long = "condition")]
        conditions: Vec<String>,
    },
    Complete,
    Show,
}

#[derive(Subcommand)]
enum GuardAction {
    Validate,
    Snapshot,
    Drift,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_json, cli.log_file.as_deref())?;

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Config { dump } => {
            let shown = if dump { VritualConfig::default() } else { config };
            println!("{}", shown.to_toml());
        }
        Commands::Run => {
            let engine = Engine::open(&config).await?;
            let cancel = shutdown_on_ctrl_c();
            daemon::run(engine, cancel).await?;
        }
        Commands::Observe { phrase } => {
            let engine = Engine::open(&config).await?;
            let outcome = engine.on_phrase_observed(&phrase).await?;
            match &outcome.registration {
                Some(reg) => {
                    println!("'{}' x{} (energy {:.2})", reg.phrase, reg.count, reg.loop_energy);
                    if let Some(p) = &reg.promotion {
                        println!("ritual formed: {}", p.ritual_name);
                    }
                }
                None => println!("empty phrase ignored"),
            }
            for (firing, reaction) in outcome.fired.iter().zip(&outcome.reactions) {
                println!("fired {} → {} ({})", firing.name, firing.effect, reaction.emotion);
            }
        }
        Commands::Monitor { which, repeat } => {
            let engine = Engine::open(&config).await?;
            if repeat {
                let cancel = shutdown_on_ctrl_c();
                let interval = which.interval(&config.schedule);
                daemon::schedule::run_periodic(engine.clone(), which, interval, cancel).await?;
                final_snapshot(&engine).await;
            } else {
                println!("{}", which.run_once(&engine).await?);
            }
        }
        Commands::Mood { action } => {
            let engine = Engine::open(&config).await?;
            match action {
                MoodAction::Stack { emotion, weight } => {
                    let v = engine.mood.stack(&emotion, weight).await?;
                    println!("{emotion}: {v:.2}");
                }
                MoodAction::Top => println!("{}", engine.mood.top_mood()),
            }
        }
        Commands::Ritual { action } => match action {
            RitualAction::Add { name, trigger, effect, importance, hour } => {
                let engine = Engine::open(&config).await?;
                let trigger = if hour {
                    let h: u32 = trigger.trim().parse()?;
                    anyhow::ensure!(h < 24, "hour must be 0-23, got {h}");
                    RitualTrigger::Hour { hour: h }
                } else {
                    RitualTrigger::Phrase(trigger)
                };
                let effect = match effect.strip_prefix("callback:") {
                    Some(id) => EffectKind::callback(id),
                    None => EffectKind::label(effect),
                };
                if engine.rituals.add_ritual(&name, trigger, effect, importance).await? {
                    println!("added {name}");
                } else {
                    println!("{name} already exists");
                }
            }
            RitualAction::List => {
                let doc = load_document(&config.paths.memory_path()).await?;
                for r in &doc.rituals {
                    println!("{} [{}] {} → {} (uses: {})", r.name, r.importance, r.trigger, r.effect, r.usage_count);
                }
            }
            RitualAction::Fuse { dry_run } => {
                let doc = load_document(&config.paths.memory_path()).await?;
                let found = fusion::fusion_candidates(&doc);
                if found.is_empty() {
                    println!("no viable fusions");
                }
                for c in &found {
                    println!("{} ← [{}] (score {:.2})", c.fusion_name, c.components.join(", "), c.score);
                }
                if !dry_run {
                    fusion::save(&config.paths.fusions_path(), &found).await?;
                }
            }
        },
        Commands::Preset { action } => {
            let engine = Engine::open(&config).await?;
            match action {
                PresetAction::List => {
                    for name in engine.presets.list().await? {
                        println!("{name}");
                    }
                }
                PresetAction::Load { name, merge } => {
                    let mode = if merge { LoadMode::Merge } else { LoadMode::Replace };
                    let added = engine.presets.load(&name, mode).await?;
                    println!("loaded {name}: {added} rituals added");
                }
            }
        }
        Commands::Mission { action } => {
            let engine = Engine::open(&config).await?;
            match action {
                MissionAction::Assign { title, goal, emotions, conditions } => {
                    let m = engine.missions.assign(&title, &goal, conditions, emotions).await?;
                    println!("assigned {} ({})", m.title, m.id);
                }
                MissionAction::Complete => {
                    let m = engine.missions.complete().await?;
                    println!("completed {}", m.title);
                }
                MissionAction::Show => match engine.missions.active() {
                    Some(m) => println!("{}", serde_json::to_string_pretty(&m)?),
                    None => println!("no active mission"),
                },
            }
        }
        Commands::Guard { action } => {
            let guard = MemoryGuard::new(config.paths.memory_path(), config.paths.snapshot_path());
            match action {
                GuardAction::Validate => {
                    guard.validate().await?;
                    println!("memory document is valid");
                }
                GuardAction::Snapshot => {
                    if guard.save_snapshot().await? {
                        println!("snapshot written to {}", guard.snapshot_path().display());
                    } else {
                        println!("no memory document yet");
                    }
                }
                GuardAction::Drift => {
                    let drift = guard.drift().await?;
                    if drift.is_empty() {
                        println!("no drift");
                    } else {
                        println!("drifted: {}", drift.join(", "));
                    }
                }
            }
        }
        Commands::Status => {
            let doc = load_document(&config.paths.memory_path()).await?;
            println!("{}", status::render(&doc));
        }
        Commands::Export { out } => {
            let doc = load_document(&config.paths.memory_path()).await?;
            let dir = out.unwrap_or_else(|| config.paths.export_path());
            for file in export::write_all(&doc, &dir).await? {
                println!("{} ({} records)", file.path.display(), file.records);
            }
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<VritualConfig> {
    let path = cli.config.clone().unwrap_or_else(|| {
        cli.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_FILE)
    });
    let mut config = VritualConfig::load(&path)?.with_env();
    if let Some(dir) = &cli.data_dir {
        config.paths.data_dir = dir.clone();
    }
    Ok(config)
}

fn init_tracing(json: bool, log_file: Option<&std::path::Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vritual=info,vritual_engine=info,vritual_store=info".into());

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(std::path::Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("--log-file needs a file name: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let (text_layer, json_layer) = if json {
        (None, Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

/// A token cancelled by the first Ctrl-C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received — shutting down");
        }
        trigger.cancel();
    });
    cancel
}

async fn final_snapshot(engine: &Engine) {
    match engine.guard.save_snapshot().await {
        Ok(true) => tracing::info!("Final snapshot written"),
        Ok(false) => {}
        Err(e) => tracing::warn!("Final snapshot failed: {}", e),
    }
}
