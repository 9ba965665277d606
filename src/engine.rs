//! The automation engine: walks every work item through the call state
//! machine, one at a time, on the thread that calls [`Engine::run`].
//!
//! Cancellation is cooperative and only observed between items. Waits are
//! plain sleeps and playback blocks, so a stop request never interrupts the
//! item in flight; the loop delay after it still runs.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::actuator::{Actuator, Key};
use crate::config::Config;
use crate::error::EngineError;
use crate::events::{Event, EventKind, EventSink};
use crate::player::{Player, PlayerFactory};
use crate::state_machine::{CallState, RunOutcome, StateMachine, StepOutcome, Transition, WorkItem};

/// Shared stop flag. Cloning gives another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Asks the run to stop before its next item. Repeated calls are harmless.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where the engine blocks between steps.
pub trait Sleeper: Send {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Progress of one run. Lives only as long as [`Engine::run`].
struct RunState {
    stop: StopHandle,
    current_index: usize,
}

impl RunState {
    fn cancel_requested(&self) -> bool {
        self.stop.is_requested()
    }
}

/// Builds a fresh engine for each run.
pub trait EngineFactory: Send + Sync {
    fn build(&self, events: Arc<dyn EventSink>) -> Engine;
}

impl<F> EngineFactory for F
where
    F: Fn(Arc<dyn EventSink>) -> Engine + Send + Sync,
{
    fn build(&self, events: Arc<dyn EventSink>) -> Engine {
        self(events)
    }
}

pub struct Engine {
    actuator: Box<dyn Actuator>,
    players: Box<dyn PlayerFactory>,
    sleeper: Box<dyn Sleeper>,
    events: Arc<dyn EventSink>,
    stop: StopHandle,
}

impl Engine {
    pub fn new(
        actuator: Box<dyn Actuator>,
        players: Box<dyn PlayerFactory>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            actuator,
            players,
            sleeper: Box::new(ThreadSleeper),
            events,
            stop: StopHandle::default(),
        }
    }

    /// Replace the real clock, e.g. to record waits.
    #[cfg(test)]
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Handle to this engine's stop flag. Requests take effect at the next
    /// item boundary and may come from any thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Process `items` in order. Blocks until every item has been considered
    /// or a stop request is seen between items.
    ///
    /// Only a failure to build the audio player aborts the run; it is
    /// reported to the event sink before this returns.
    pub fn run(&mut self, items: &mut [WorkItem], config: &Config) -> Result<RunOutcome, EngineError> {
        let mut player = match self.players.create(config.audio_backend) {
            Ok(player) => player,
            Err(e) => {
                let err = EngineError::from(e);
                warn!(error = %err, "run aborted");
                self.emit(EventKind::RunAborted {
                    error: err.to_string(),
                });
                return Err(err);
            }
        };

        let mut state = RunState {
            stop: self.stop.clone(),
            current_index: 0,
        };

        while state.current_index < items.len() {
            if state.cancel_requested() {
                info!(
                    index = state.current_index,
                    remaining = items.len() - state.current_index,
                    "stop requested, leaving remaining items pending"
                );
                return Ok(RunOutcome::Cancelled);
            }

            let index = state.current_index;
            self.process(index, &mut items[index], config, player.as_mut());
            self.sleeper.sleep(config.loop_delay);
            state.current_index += 1;
        }

        Ok(RunOutcome::Completed)
    }

    /// Runs one item to a terminal status. Never fails: errors settle the
    /// item as `Failed`.
    fn process(&mut self, index: usize, item: &mut WorkItem, config: &Config, player: &mut dyn Player) {
        item.begin();
        let mut call = CallState::Pending;

        loop {
            let outcome = match self.step(call, index, item, config, player) {
                Ok(()) => StepOutcome::Success,
                Err(message) => StepOutcome::Failure(message),
            };

            match StateMachine::next(call, outcome, config.auto_hangup) {
                Transition::Next(next) => {
                    debug!(index, from = %call, to = %next, "transition");
                    call = next;
                }
                Transition::Complete { status, error } => {
                    item.settle(status);
                    if let Some(error) = error {
                        warn!(index, phone = %item.phone, state = %call, %error, "item failed");
                        self.emit(EventKind::ItemFailed { index, error });
                    } else {
                        info!(index, phone = %item.phone, "item done");
                    }
                    return;
                }
            }
        }
    }

    /// The work attached to entering `state`.
    fn step(
        &mut self,
        state: CallState,
        index: usize,
        item: &WorkItem,
        config: &Config,
        player: &mut dyn Player,
    ) -> Result<(), String> {
        match state {
            CallState::Pending | CallState::Done | CallState::Failed => {}
            CallState::Dialing => {
                self.emit(EventKind::Dialing {
                    index,
                    phone: item.phone.clone(),
                });
                self.actuator
                    .click(config.dial_click)
                    .and_then(|()| self.actuator.type_text(&item.phone))
                    .and_then(|()| self.actuator.press_key(Key::Enter))
                    .map_err(|e| e.to_string())?;
            }
            CallState::WaitingPostDial => self.sleeper.sleep(config.wait_after_dial),
            CallState::WaitingPreAudio => self.sleeper.sleep(config.wait_before_audio),
            CallState::PlayingAudio => {
                self.emit(EventKind::Playing {
                    index,
                    audio_path: item.audio_path.clone(),
                });
                player
                    .play(Path::new(&item.audio_path))
                    .map_err(|e| e.to_string())?;
            }
            // Fixed worst case, regardless of how long playback took.
            CallState::WaitingCallTimeout => self.sleeper.sleep(config.call_timeout),
            CallState::HangingUp => {
                self.actuator
                    .click(config.hang_click)
                    .map_err(|e| e.to_string())?;
                self.emit(EventKind::HungUp { index });
            }
        }
        Ok(())
    }

    fn emit(&self, kind: EventKind) {
        self.events.emit(Event::now(kind));
    }
}
