use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::{EngineFactory, StopHandle};
use crate::error::ControllerError;
use crate::events::{Event, EventKind, EventSink};
use crate::state_machine::{RunOutcome, RunReport, WorkItem};
use crate::worklist::WorkListSink;

/// The run currently owned by the controller.
struct ActiveRun {
    run_id: Uuid,
    stop: StopHandle,
    finished: Arc<AtomicBool>,
    handle: JoinHandle<RunReport>,
}

/// Owns the engine's lifecycle: at most one run at a time, each on its own
/// blocking worker thread.
///
/// The work items move into the worker when a run starts and come back in
/// the [`RunReport`] once it has completed, so nothing else can touch them
/// while the engine is working.
pub struct RunController {
    engines: Box<dyn EngineFactory>,
    events: Arc<dyn EventSink>,
    sink: Arc<dyn WorkListSink>,
    active: Option<ActiveRun>,
}

impl RunController {
    pub fn new(
        engines: impl EngineFactory + 'static,
        events: Arc<dyn EventSink>,
        sink: Arc<dyn WorkListSink>,
    ) -> Self {
        Self {
            engines: Box::new(engines),
            events,
            sink,
            active: None,
        }
    }

    /// `true` from `start` until the completion handler has run, or until
    /// the worker has died without reaching it.
    pub fn is_active(&self) -> bool {
        self.active.as_ref().is_some_and(|run| {
            !run.finished.load(Ordering::SeqCst) && !run.handle.is_finished()
        })
    }

    /// Spawns a run and returns its id without waiting for it.
    pub fn start(&mut self, items: Vec<WorkItem>, config: Config) -> Result<Uuid, ControllerError> {
        if self.is_active() {
            return Err(ControllerError::InvalidState("a run is already active"));
        }
        if items.is_empty() {
            return Err(ControllerError::InvalidState("no work items to run"));
        }
        let runtime = Handle::try_current().map_err(|_| ControllerError::NoRuntime)?;

        let run_id = Uuid::new_v4();
        let mut engine = self.engines.build(Arc::clone(&self.events));
        let stop = engine.stop_handle();
        let finished = Arc::new(AtomicBool::new(false));

        info!(%run_id, items = items.len(), "run started");
        self.events.emit(Event::now(EventKind::RunStarted {
            run_id,
            total: items.len(),
        }));

        let events = Arc::clone(&self.events);
        let sink = Arc::clone(&self.sink);
        let done = Arc::clone(&finished);
        let handle = runtime.spawn_blocking(move || {
            let mut items = items;
            let started_at = Local::now();
            let outcome = match engine.run(&mut items, &config) {
                Ok(outcome) => outcome,
                Err(e) => RunOutcome::Aborted(e.to_string()),
            };
            let report = RunReport::from_items(run_id, outcome, started_at, items);
            on_completion(&report, sink.as_ref(), events.as_ref());
            done.store(true, Ordering::SeqCst);
            report
        });

        self.active = Some(ActiveRun {
            run_id,
            stop,
            finished,
            handle,
        });
        Ok(run_id)
    }

    /// Asks the active run to stop at its next item boundary. No-op when idle.
    pub fn stop(&self) {
        if let Some(run) = self.active.as_ref().filter(|_| self.is_active()) {
            info!(run_id = %run.run_id, "stop requested");
            run.stop.request();
        }
    }

    /// Waits for the current run and hands back its report. `None` if no run
    /// was started since the last wait.
    pub async fn wait(&mut self) -> Result<Option<RunReport>, ControllerError> {
        let Some(run) = self.active.take() else {
            return Ok(None);
        };
        let report = run.handle.await?;
        Ok(Some(report))
    }
}

/// Runs once per run on the worker, after the engine returns. Saves whatever
/// state the items reached; a failed save is logged and reported, never
/// raised.
fn on_completion(report: &RunReport, sink: &dyn WorkListSink, events: &dyn EventSink) {
    match sink.save(&report.items) {
        Ok(()) => events.emit(Event::now(EventKind::Saved {
            rows: report.items.len(),
        })),
        Err(e) => {
            error!(run_id = %report.run_id, error = %e, "failed to save work list");
            events.emit(Event::now(EventKind::SaveFailed {
                error: e.to_string(),
            }));
        }
    }

    info!(run_id = %report.run_id, outcome = %report.outcome, "run finished");
    events.emit(Event::now(EventKind::RunCompleted {
        outcome: report.outcome.clone(),
        done: report.done,
        failed: report.failed,
        pending: report.pending,
    }));
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::engine::Engine;
    use crate::engine::testing::*;
    use crate::error::WorkListError;
    use crate::events::EventLog;
    use crate::state_machine::ItemStatus;

    /// Keeps every saved snapshot; optionally refuses to save.
    #[derive(Default)]
    struct MemorySink {
        saved: Mutex<Vec<Vec<WorkItem>>>,
        broken: bool,
    }

    impl WorkListSink for MemorySink {
        fn save(&self, items: &[WorkItem]) -> Result<(), WorkListError> {
            if self.broken {
                return Err(WorkListError::Io {
                    path: "calls.json".into(),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
                });
            }
            self.saved.lock().unwrap().push(items.to_vec());
            Ok(())
        }
    }

    fn items(n: usize) -> Vec<WorkItem> {
        (1..=n)
            .map(|i| WorkItem::new(format!("555010{i}"), format!("clips/{i}.wav")))
            .collect()
    }

    fn controller(
        player: ScriptedPlayer,
        unavailable: bool,
        sink: Arc<dyn WorkListSink>,
    ) -> (RunController, Arc<EventLog>) {
        let log = Arc::new(EventLog::new());
        let factory = move |events: Arc<dyn EventSink>| {
            let mut players = ScriptedPlayers::new(player.clone());
            players.unavailable = unavailable;
            Engine::new(
                Box::new(ScriptedActuator::default()),
                Box::new(players),
                events,
            )
            .with_sleeper(Box::new(RecordingSleeper::default()))
        };
        let controller = RunController::new(factory, log.clone(), sink);
        (controller, log)
    }

    fn count(log: &EventLog, pred: impl Fn(&EventKind) -> bool) -> usize {
        log.kinds().iter().filter(|k| pred(k)).count()
    }

    #[tokio::test]
    async fn three_items_all_done() {
        let sink = Arc::new(MemorySink::default());
        let (mut controller, log) = controller(ScriptedPlayer::default(), false, sink.clone());

        controller.start(items(3), Config::instant()).unwrap();
        let report = controller.wait().await.unwrap().unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.done, 3);
        assert!(report.items.iter().all(|i| i.status == ItemStatus::Done));
        assert_eq!(count(&log, |k| matches!(k, EventKind::HungUp { .. })), 3);
        assert_eq!(count(&log, |k| matches!(k, EventKind::RunCompleted { .. })), 1);
        assert_eq!(sink.saved.lock().unwrap().len(), 1);
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn lifecycle_events_bracket_the_run() {
        let sink = Arc::new(MemorySink::default());
        let (mut controller, log) = controller(ScriptedPlayer::default(), false, sink);

        let run_id = controller.start(items(1), Config::instant()).unwrap();
        controller.wait().await.unwrap();

        let kinds = log.kinds();
        assert_eq!(kinds.first(), Some(&EventKind::RunStarted { run_id, total: 1 }));
        assert!(matches!(kinds.last(), Some(EventKind::RunCompleted { .. })));
        assert!(matches!(kinds[kinds.len() - 2], EventKind::Saved { rows: 1 }));
    }

    #[tokio::test]
    async fn failing_item_does_not_stop_the_run() {
        let player = ScriptedPlayer {
            fail_on: HashSet::from(["clips/2.wav".to_string()]),
            ..ScriptedPlayer::default()
        };
        let sink = Arc::new(MemorySink::default());
        let (mut controller, log) = controller(player, false, sink.clone());

        controller.start(items(3), Config::instant()).unwrap();
        let report = controller.wait().await.unwrap().unwrap();

        let statuses: Vec<_> = report.items.iter().map(|i| i.status).collect();
        assert_eq!(
            statuses,
            vec![ItemStatus::Done, ItemStatus::Failed, ItemStatus::Done]
        );
        assert!(log.lines().iter().any(|l| l.contains("] Error: ")));
        assert_eq!(sink.saved.lock().unwrap()[0][1].status, ItemStatus::Failed);
    }

    #[tokio::test]
    async fn empty_list_is_rejected_without_spawning() {
        let sink = Arc::new(MemorySink::default());
        let (mut controller, log) = controller(ScriptedPlayer::default(), false, sink.clone());

        let err = controller.start(Vec::new(), Config::instant()).unwrap_err();

        assert!(matches!(err, ControllerError::InvalidState(_)));
        assert!(!controller.is_active());
        assert!(controller.wait().await.unwrap().is_none());
        assert!(log.kinds().is_empty());
        assert!(sink.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_start_while_active_is_rejected() {
        let sink = Arc::new(MemorySink::default());
        // Real sleeps, so the first run is still inside its loop delay.
        let factory = |events: Arc<dyn EventSink>| {
            Engine::new(
                Box::new(ScriptedActuator::default()),
                Box::new(ScriptedPlayers::new(ScriptedPlayer::default())),
                events,
            )
        };
        let mut controller = RunController::new(factory, Arc::new(EventLog::new()), sink);
        let config = Config {
            loop_delay: Duration::from_millis(300),
            ..Config::instant()
        };

        controller.start(items(2), config.clone()).unwrap();
        assert!(controller.is_active());
        let err = controller.start(items(1), config).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidState(_)));

        controller.stop();
        let report = controller.wait().await.unwrap().unwrap();
        assert_eq!(report.items.len(), 2);
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn stop_requested_before_run_processes_nothing() {
        let sink = Arc::new(MemorySink::default());
        let log = Arc::new(EventLog::new());
        let factory = |events: Arc<dyn EventSink>| {
            let engine = Engine::new(
                Box::new(ScriptedActuator::default()),
                Box::new(ScriptedPlayers::new(ScriptedPlayer::default())),
                events,
            );
            engine.stop_handle().request();
            engine
        };
        let mut controller = RunController::new(factory, log.clone(), sink.clone());

        controller.start(items(3), Config::instant()).unwrap();
        let report = controller.wait().await.unwrap().unwrap();

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.pending, 3);
        assert!(report.items.iter().all(|i| i.last_updated.is_none()));
        assert_eq!(count(&log, |k| matches!(k, EventKind::Dialing { .. })), 0);
        assert_eq!(count(&log, |k| matches!(k, EventKind::RunCompleted { .. })), 1);
        assert_eq!(sink.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn aborted_run_still_completes_and_saves() {
        let sink = Arc::new(MemorySink::default());
        let (mut controller, log) = controller(ScriptedPlayer::default(), true, sink.clone());

        controller.start(items(2), Config::instant()).unwrap();
        let report = controller.wait().await.unwrap().unwrap();

        assert!(matches!(report.outcome, RunOutcome::Aborted(_)));
        assert_eq!(report.pending, 2);
        assert_eq!(count(&log, |k| matches!(k, EventKind::RunAborted { .. })), 1);
        assert_eq!(count(&log, |k| matches!(k, EventKind::RunCompleted { .. })), 1);
        assert_eq!(sink.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn save_failure_is_reported_not_raised() {
        let sink = Arc::new(MemorySink {
            broken: true,
            ..MemorySink::default()
        });
        let (mut controller, log) = controller(ScriptedPlayer::default(), false, sink);

        controller.start(items(1), Config::instant()).unwrap();
        let report = controller.wait().await.unwrap().unwrap();

        assert_eq!(report.done, 1);
        let lines = log.lines();
        assert!(lines.iter().any(|l| l.contains("Save failed: cannot access calls.json")));
        assert!(lines.last().unwrap().contains("Automation finished"));
    }

    #[tokio::test]
    async fn worker_panic_releases_the_controller() {
        struct PanickingSink;

        impl WorkListSink for PanickingSink {
            fn save(&self, _items: &[WorkItem]) -> Result<(), WorkListError> {
                panic!("sink blew up");
            }
        }

        let (mut controller, _log) =
            controller(ScriptedPlayer::default(), false, Arc::new(PanickingSink));
        controller.start(items(1), Config::instant()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while controller.is_active() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("controller still active after its worker died");

        let err = controller.wait().await.unwrap_err();
        assert!(matches!(err, ControllerError::Worker(_)));
        assert!(controller.start(items(1), Config::instant()).is_ok());
    }

    #[tokio::test]
    async fn controller_can_run_again_after_completion() {
        let sink = Arc::new(MemorySink::default());
        let (mut controller, _log) = controller(ScriptedPlayer::default(), false, sink.clone());

        controller.start(items(1), Config::instant()).unwrap();
        let first = controller.wait().await.unwrap().unwrap();
        controller.start(items(2), Config::instant()).unwrap();
        let second = controller.wait().await.unwrap().unwrap();

        assert_ne!(first.run_id, second.run_id);
        assert_eq!(sink.saved.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stop_when_idle_is_a_no_op() {
        let sink = Arc::new(MemorySink::default());
        let (controller, log) = controller(ScriptedPlayer::default(), false, sink);
        controller.stop();
        controller.stop();
        assert!(!controller.is_active());
        assert!(log.kinds().is_empty());
    }

    #[test]
    fn start_outside_runtime_is_rejected() {
        let sink = Arc::new(MemorySink::default());
        let (mut controller, _log) = controller(ScriptedPlayer::default(), false, sink);
        let err = controller.start(items(1), Config::instant()).unwrap_err();
        assert!(matches!(err, ControllerError::NoRuntime));
    }
}
