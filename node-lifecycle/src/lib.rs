// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Node drain/stop sequencing
//!
//! An executor that restarts real nodes needs to stop them first, and a stop
//! is a small protocol of its own: a stop request begins a graceful drain; a
//! second request or a hard deadline forces an immediate stop.  This crate
//! models exactly that sequencing (an explicit state machine driven by named
//! events, plus a coordinator that waits on those events) and nothing else.
//! Process spawning, storage, and RPC all belong to the executor.

pub mod config;
pub mod coordinator;
pub mod shutdown;

pub use config::NodeConfig;
pub use coordinator::{ShutdownCoordinator, ShutdownError};
pub use shutdown::{NodeState, ShutdownEvent, ShutdownFsm, StopOutcome};
