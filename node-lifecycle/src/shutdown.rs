// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The pure stop-protocol state machine
//!
//! `running -> draining -> stopped`, driven only by explicit events.  The
//! machine performs no waiting of its own; see
//! [`coordinator`](crate::coordinator) for the part that does.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Running,
    Draining,
    Stopped,
}

/// The events that can advance the stop protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownEvent {
    /// An external request to stop the node
    StopRequested,
    /// Every draining task has finished
    DrainCompleted,
    /// The hard-stop deadline elapsed while draining
    DeadlineExpired,
}

/// How a completed stop came about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Graceful: the drain ran to completion
    Drained,
    /// A second stop request forced an immediate stop
    SecondSignal,
    /// The hard-stop deadline forced an immediate stop
    DeadlineExceeded,
}

#[derive(Debug, Clone)]
pub struct ShutdownFsm {
    state: NodeState,
}

impl ShutdownFsm {
    pub fn new() -> Self {
        ShutdownFsm { state: NodeState::Running }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Applies `event`, returning the outcome once the node has stopped
    ///
    /// Events that do not apply in the current state (a drain completing
    /// before any stop was requested, anything after the stop) are ignored.
    pub fn on_event(&mut self, event: ShutdownEvent) -> Option<StopOutcome> {
        match (self.state, event) {
            (NodeState::Running, ShutdownEvent::StopRequested) => {
                self.state = NodeState::Draining;
                None
            }
            (NodeState::Draining, ShutdownEvent::StopRequested) => {
                self.state = NodeState::Stopped;
                Some(StopOutcome::SecondSignal)
            }
            (NodeState::Draining, ShutdownEvent::DrainCompleted) => {
                self.state = NodeState::Stopped;
                Some(StopOutcome::Drained)
            }
            (NodeState::Draining, ShutdownEvent::DeadlineExpired) => {
                self.state = NodeState::Stopped;
                Some(StopOutcome::DeadlineExceeded)
            }
            _ => None,
        }
    }
}

impl Default for ShutdownFsm {
    fn default() -> Self {
        Self::new()
    }
}
