// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-invocation node configuration
//!
//! Constructed explicitly by the caller and scoped to one command
//! invocation; there is no global context.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Name used in log output for this node
    pub name: String,
    /// How long a graceful drain may run before the stop is forced
    pub hard_stop_deadline: Duration,
    /// How often to report drain progress while draining
    pub drain_poll_period: Duration,
}

impl NodeConfig {
    pub fn new(name: impl Into<String>) -> Self {
        NodeConfig {
            name: name.into(),
            hard_stop_deadline: Duration::from_secs(60),
            drain_poll_period: Duration::from_secs(5),
        }
    }
}
