mod actuator;
mod cli;
mod config;
mod controller;
mod engine;
mod error;
mod events;
mod player;
mod state_machine;
mod ui;
mod worklist;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use actuator::{Actuator, DryRunActuator, XdotoolActuator};
use cli::{Cli, Command, Overrides};
use config::Config;
use controller::RunController;
use engine::Engine;
use error::{AutodialError, ControllerError};
use events::{EventLog, EventSink, Tee};
use player::{AudioBackend, InstalledPlayers, PlayerFactory};
use state_machine::{RunReport, WorkItem};
use ui::RunProgress;
use worklist::{DiscardSink, WorkListFile, WorkListSink};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            worklist,
            overrides,
            transcript,
        } => {
            let path = resolve_worklist(worklist, &config)?;
            cmd_run(&path, config, &overrides, cli.dry_run, transcript.as_deref()).await?;
        }
        Command::Status { worklist } => {
            let path = resolve_worklist(worklist, &config)?;
            cmd_status(&path)?;
        }
        Command::Demo => cmd_demo().await?,
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_worklist(arg: Option<PathBuf>, config: &Config) -> Result<PathBuf, AutodialError> {
    arg.or_else(|| config.worklist.clone()).ok_or_else(|| {
        AutodialError::Config("no work list given and `worklist` is not set".to_string())
    })
}

fn cmd_status(path: &Path) -> Result<(), AutodialError> {
    let items = WorkListFile::new(path)?.load()?;
    println!("{} rows in {}", items.len(), path.display());
    ui::print_items(&items);
    Ok(())
}

async fn cmd_run(
    path: &Path,
    mut config: Config,
    overrides: &Overrides,
    dry_run: bool,
    transcript: Option<&Path>,
) -> Result<(), AutodialError> {
    overrides.apply(&mut config);

    let list = WorkListFile::new(path)?;
    let mut items = list.load()?;
    println!("Loaded {} rows from {}", items.len(), path.display());
    items.iter_mut().for_each(WorkItem::reset);

    let sink = results_sink(list, dry_run);
    let report = if dry_run {
        let actuator = DryRunActuator::new();
        let probe = actuator.clone();
        config.audio_backend = AudioBackend::Silent;
        let report =
            execute(items, config, move || actuator.clone(), InstalledPlayers, sink, transcript)
                .await?;
        println!("Dry run recorded {} desktop actions", probe.actions().len());
        report
    } else {
        // Fail before anything is spawned if the desktop cannot be driven.
        let actuator = XdotoolActuator::new()?;
        execute(items, config, move || actuator.clone(), InstalledPlayers, sink, transcript).await?
    };

    ui::print_report(&report);
    Ok(())
}

/// Where a run's results go. A dry run never writes back to the list, so
/// what real runs recorded there survives it.
fn results_sink(list: WorkListFile, dry_run: bool) -> Arc<dyn WorkListSink> {
    if dry_run {
        Arc::new(DiscardSink)
    } else {
        Arc::new(list)
    }
}

/// What a Ctrl-C means: the first asks the run to stop after the current
/// call, the next one quits without waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Stop,
    Exit,
}

#[derive(Debug, Default)]
struct Interrupts {
    seen: u32,
}

impl Interrupts {
    fn next(&mut self) -> Interrupt {
        self.seen += 1;
        if self.seen == 1 {
            Interrupt::Stop
        } else {
            Interrupt::Exit
        }
    }
}

async fn cmd_demo() -> Result<(), AutodialError> {
    let items = vec![
        WorkItem::new("5550100", "clips/welcome.wav"),
        WorkItem::new("5550101", "clips/reminder.wav"),
        WorkItem::new("5550102", "clips/goodbye.wav"),
    ];
    let config = Config {
        audio_backend: AudioBackend::Silent,
        ..Config::instant()
    };
    let actuator = DryRunActuator::new();
    let report = execute(
        items,
        config,
        move || actuator.clone(),
        InstalledPlayers,
        Arc::new(DiscardSink),
        None,
    )
    .await?;
    ui::print_report(&report);
    Ok(())
}

/// Starts one run, renders its progress, forwards Ctrl-C as a stop request
/// and waits for the completion report.
async fn execute<A, P>(
    items: Vec<WorkItem>,
    config: Config,
    actuators: impl Fn() -> A + Send + Sync + 'static,
    players: P,
    sink: Arc<dyn WorkListSink>,
    transcript: Option<&Path>,
) -> Result<RunReport, AutodialError>
where
    A: Actuator + 'static,
    P: PlayerFactory + Clone + Sync + 'static,
{
    let log = Arc::new(EventLog::new());
    let progress = RunProgress::new(items.len());
    let events: Arc<dyn EventSink> = Arc::new(Tee(progress, Arc::clone(&log)));

    let factory = move |events: Arc<dyn EventSink>| {
        Engine::new(Box::new(actuators()), Box::new(players.clone()), events)
    };
    let mut controller = RunController::new(factory, events, sink);
    controller.start(items, config)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut listening = true;
    let mut interrupts = Interrupts::default();
    while controller.is_active() {
        tokio::select! {
            res = &mut ctrl_c, if listening => match res {
                Err(e) => {
                    tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                    listening = false;
                }
                Ok(()) => match interrupts.next() {
                    Interrupt::Stop => {
                        eprintln!("Stopping after the current call... (Ctrl-C again to quit now)");
                        controller.stop();
                        ctrl_c.set(tokio::signal::ctrl_c());
                    }
                    Interrupt::Exit => {
                        eprintln!("Interrupted; results of this run are not saved");
                        std::process::exit(130);
                    }
                },
            },
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }

    let report = controller
        .wait()
        .await?
        .ok_or(ControllerError::InvalidState("no run to wait for"))?;

    if let Some(path) = transcript {
        std::fs::write(path, log.lines().join("\n") + "\n")?;
    }
    Ok(report)
}
