use std::fmt;

use crossbeam_channel::Sender;
use dispatch::{DispatchError, DispatchResult};
use parking_lot::Mutex;

/// Phase of a tester run. Phases only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    Created,
    Started,
    Stopping,
    Stopped,
    Deinited,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Created => "created",
            State::Started => "started",
            State::Stopping => "stopping",
            State::Stopped => "stopped",
            State::Deinited => "deinited",
        })
    }
}

/// Published after each transition so the runner can drive the next phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    Started,
    Stopping,
    Stopped,
    Deinited,
}

impl LifecycleEvent {
    pub fn state(self) -> State {
        match self {
            LifecycleEvent::Started => State::Started,
            LifecycleEvent::Stopping => State::Stopping,
            LifecycleEvent::Stopped => State::Stopped,
            LifecycleEvent::Deinited => State::Deinited,
        }
    }
}

/// Linear state machine `Created -> Started -> Stopping -> Stopped -> Deinited`.
pub struct Lifecycle {
    state: Mutex<State>,
    events: Sender<LifecycleEvent>,
}

impl Lifecycle {
    pub fn new(events: Sender<LifecycleEvent>) -> Self {
        Self {
            state: Mutex::new(State::Created),
            events,
        }
    }

    pub fn state(&self) -> State {
        *self.state.lock()
    }

    /// Acknowledges `on_start`: `Created -> Started`.
    pub fn start_done(&self) -> DispatchResult<()> {
        self.advance(State::Created, LifecycleEvent::Started, "on_start_done")
    }

    /// Acknowledges `on_stop`: `Stopping -> Stopped`.
    pub fn stop_done(&self) -> DispatchResult<()> {
        self.advance(State::Stopping, LifecycleEvent::Stopped, "on_stop_done")
    }

    /// Acknowledges `on_deinit`: `Stopped -> Deinited`.
    pub fn deinit_done(&self) -> DispatchResult<()> {
        self.advance(State::Stopped, LifecycleEvent::Deinited, "on_deinit_done")
    }

    /// Moves `Started -> Stopping`, runs `teardown`, then publishes the event.
    ///
    /// Returns `Ok(false)` without running `teardown` when a stop is already
    /// underway or finished. Stopping before start is an error.
    pub fn begin_stop(&self, teardown: impl FnOnce()) -> DispatchResult<bool> {
        {
            let mut state = self.state.lock();
            match *state {
                State::Started => *state = State::Stopping,
                State::Created => {
                    return Err(DispatchError::invalid_state(
                        "stop_test called before the test started",
                    ))
                }
                State::Stopping | State::Stopped | State::Deinited => return Ok(false),
            }
        }
        log::debug!("tester lifecycle: started -> stopping");
        teardown();
        self.publish(LifecycleEvent::Stopping);
        Ok(true)
    }

    fn advance(&self, from: State, event: LifecycleEvent, op: &str) -> DispatchResult<()> {
        let to = event.state();
        {
            let mut state = self.state.lock();
            if *state != from {
                return Err(DispatchError::invalid_state(format!(
                    "{op} called while {}; expected {from}",
                    *state
                )));
            }
            *state = to;
        }
        log::debug!("tester lifecycle: {from} -> {to}");
        self.publish(event);
        Ok(())
    }

    fn publish(&self, event: LifecycleEvent) {
        if self.events.send(event).is_err() {
            log::trace!("no runner listening for {event:?}");
        }
    }
}
