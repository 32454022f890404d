// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Declarative description of a mixed-version upgrade test
//!
//! A [`TestDescription`] is pure configuration: it records what the caller
//! asked for and performs no validation of its own.  Validation happens in
//! one place, [`Planner::new`](crate::planner::Planner::new), so an
//! inconsistent description fails before any step is emitted.

use crate::hooks::Hook;
use crate::rng::RollbackPolicy;
use crate::versions::{Series, Version};
use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentMode {
    /// Tenants (if any) share the system processes; one upgrade timeline
    SharedProcess,
    /// The tenant runs its own process group with its own upgrade timeline
    SeparateProcess,
}

/// Everything the planner needs to know about one test run
#[derive(Debug)]
pub struct TestDescription {
    nodes: usize,
    mode: DeploymentMode,
    predecessors: Vec<Version>,
    num_upgrades: Option<usize>,
    seed: u64,
    rollback_policy: RollbackPolicy,
    tenant_name: Option<String>,
    tenant_separation_series: Option<Series>,
    hooks: Vec<Hook>,
    workloads: Vec<String>,
}

impl TestDescription {
    pub fn new() -> Self {
        TestDescription {
            nodes: 4,
            mode: DeploymentMode::SharedProcess,
            predecessors: Vec::new(),
            num_upgrades: None,
            seed: 0,
            rollback_policy: RollbackPolicy::default(),
            tenant_name: None,
            tenant_separation_series: None,
            hooks: Vec::new(),
            workloads: Vec::new(),
        }
    }

    pub fn nodes(&mut self, nodes: usize) -> &mut Self {
        self.nodes = nodes;
        self
    }

    pub fn deployment_mode(&mut self, mode: DeploymentMode) -> &mut Self {
        self.mode = mode;
        self
    }

    /// The ascending list of released versions preceding the build under
    /// test
    pub fn predecessors(&mut self, predecessors: Vec<Version>) -> &mut Self {
        self.predecessors = predecessors;
        self
    }

    /// How many transitions the plan should perform; defaults to one per
    /// predecessor
    pub fn num_upgrades(&mut self, num_upgrades: usize) -> &mut Self {
        self.num_upgrades = Some(num_upgrades);
        self
    }

    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = seed;
        self
    }

    pub fn rollback_policy(&mut self, policy: RollbackPolicy) -> &mut Self {
        self.rollback_policy = policy;
        self
    }

    pub fn tenant_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.tenant_name = Some(name.into());
        self
    }

    /// The series the system track must have acknowledged before the tenant
    /// track is started; `None` starts the tenant during initial setup
    pub fn tenant_separation_series(&mut self, series: Series) -> &mut Self {
        self.tenant_separation_series = Some(series);
        self
    }

    pub fn add_hook(&mut self, hook: Hook) -> &mut Self {
        self.hooks.push(hook);
        self
    }

    /// Selects a registered background hook as a workload for this run
    pub fn add_workload(&mut self, name: impl Into<String>) -> &mut Self {
        self.workloads.push(name.into());
        self
    }

    pub fn get_nodes(&self) -> usize {
        self.nodes
    }

    pub fn get_deployment_mode(&self) -> DeploymentMode {
        self.mode
    }

    pub fn get_predecessors(&self) -> &[Version] {
        &self.predecessors
    }

    pub fn get_num_upgrades(&self) -> usize {
        self.num_upgrades.unwrap_or(self.predecessors.len())
    }

    pub fn get_seed(&self) -> u64 {
        self.seed
    }

    pub fn get_rollback_policy(&self) -> RollbackPolicy {
        self.rollback_policy
    }

    pub fn get_tenant_name(&self) -> Option<&str> {
        self.tenant_name.as_deref()
    }

    pub fn get_tenant_separation_series(&self) -> Option<Series> {
        self.tenant_separation_series
    }

    pub fn get_hooks(&self) -> &[Hook] {
        &self.hooks
    }

    pub fn get_workloads(&self) -> &[String] {
        &self.workloads
    }
}

impl Default for TestDescription {
    fn default() -> Self {
        Self::new()
    }
}
