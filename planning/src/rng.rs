// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Seeded source of every generation-time random decision
//!
//! The planner calls these methods in a fixed, single-threaded order, so a
//! given seed always reproduces the same decision sequence.  No decision may
//! come from wall-clock time, map iteration order, or thread timing.

use crate::plan::NodeId;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Executor-facing start offsets a grouped hook may be assigned
const DELAY_MENU: [Duration; 4] = [
    Duration::ZERO,
    Duration::from_secs(5),
    Duration::from_secs(30),
    Duration::from_secs(180),
];

/// Policy governing whether a transition gets a rollback excursion
///
/// The first transition of a plan is never eligible, regardless of policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RollbackPolicy {
    Never,
    Always,
    WithProbability(f64),
}

impl Default for RollbackPolicy {
    fn default() -> Self {
        RollbackPolicy::WithProbability(0.3)
    }
}

/// All randomness used while generating a plan
#[derive(Debug)]
pub struct PlannerRng {
    rng: ChaCha20Rng,
}

impl PlannerRng {
    pub fn from_seed(seed: u64) -> Self {
        PlannerRng { rng: ChaCha20Rng::seed_from_u64(seed) }
    }

    /// A fresh random permutation of node ids 1..=n
    pub fn node_permutation(&mut self, n: usize) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> =
            (1..=n as u32).map(NodeId::new).collect();
        nodes.shuffle(&mut self.rng);
        nodes
    }

    /// Whether transition `transition_index` gets a rollback excursion
    ///
    /// `Never` and `Always` consume no randomness, so forcing a policy in
    /// tests does not shift the rest of the decision stream relative to what
    /// the policy alone changes.
    pub fn decide_rollback(
        &mut self,
        transition_index: usize,
        policy: RollbackPolicy,
    ) -> bool {
        if transition_index == 0 {
            return false;
        }
        match policy {
            RollbackPolicy::Never => false,
            RollbackPolicy::Always => true,
            RollbackPolicy::WithProbability(p) => self.rng.gen_bool(p),
        }
    }

    /// A start offset for a hook grouped with a restart
    pub fn hook_delay(&mut self) -> Duration {
        DELAY_MENU[self.rng.gen_range(0..DELAY_MENU.len())]
    }

    /// For each of `num_hooks` hooks, the restart index (0-based) it runs
    /// concurrently with
    pub fn interleave(
        &mut self,
        num_hooks: usize,
        num_restarts: usize,
    ) -> Vec<usize> {
        assert!(num_restarts > 0, "restart round must cover at least one node");
        (0..num_hooks).map(|_| self.rng.gen_range(0..num_restarts)).collect()
    }
}
