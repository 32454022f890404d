// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The generated plan: an ordered forest of executable steps
//!
//! A [`Plan`] is a pure value.  It is built once, never mutated, and consumed
//! by an executor (which performs the real actions) or by the renderer here
//! (which produces the stable transcript used as a golden-file oracle).
//!
//! Concurrency groups are descriptive metadata for the executor: members of a
//! group may be started together and must all finish before the group's
//! successor runs.  Nothing is concurrent at generation time.

use crate::hooks::HookCategory;
use crate::input::DeploymentMode;
use crate::stage::StageLabel;
use crate::versions::{TargetSeries, TargetVersion, UpgradePath};
use itertools::Itertools;
use std::fmt;
use std::time::Duration;

/// A 1-based node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(id: u32) -> Self {
        assert!(id > 0, "node ids are 1-based");
        NodeId(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Global 1-based sequence number of a step, assigned in pre-order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StepId(pub u32);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a step asks the executor to do
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    /// Stage the given binary version on every node
    InstallBinaries { version: TargetVersion },
    /// Start every node for the first time
    StartCluster,
    RestartNode { node: NodeId, version: TargetVersion },
    /// Poll until every node on the track reports the given cluster version
    WaitForAcknowledgment { series: TargetSeries },
    SetClusterSetting { name: String, value: String },
    RunHook { name: String, category: HookCategory },
    StartTenant { name: String },
    /// Hold the cluster version so a downgrade stays possible
    PreventAutoUpgrade { series: TargetSeries },
    AllowAutoUpgrade { series: TargetSeries },
    /// Explicit version bump for tracks that do not auto-finalize
    Finalize { series: TargetSeries },
    /// Children may be started together; all must finish before the next
    /// sibling of this group
    ConcurrencyGroup { steps: Vec<Step> },
}

impl StepKind {
    fn describe(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::InstallBinaries { version } => {
                write!(f, "install binaries at version {version}")
            }
            StepKind::StartCluster => write!(f, "start cluster"),
            StepKind::RestartNode { node, version } => {
                write!(f, "restart node {node} with binary version {version}")
            }
            StepKind::WaitForAcknowledgment { series } => {
                write!(
                    f,
                    "wait for all nodes to acknowledge cluster version \
                     {series}"
                )
            }
            StepKind::SetClusterSetting { name, value } => {
                write!(f, "set cluster setting {name} = {value}")
            }
            StepKind::RunHook { name, category } => {
                write!(f, "run {name:?} hook ({category})")
            }
            StepKind::StartTenant { name } => {
                write!(f, "start tenant {name:?}")
            }
            StepKind::PreventAutoUpgrade { series } => {
                write!(f, "prevent auto-upgrade past cluster version {series}")
            }
            StepKind::AllowAutoUpgrade { series } => {
                write!(f, "allow auto-upgrade past cluster version {series}")
            }
            StepKind::Finalize { series } => {
                write!(f, "finalize upgrade to cluster version {series}")
            }
            StepKind::ConcurrencyGroup { .. } => write!(f, "run concurrently"),
        }
    }
}

/// One node in the plan forest
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub id: StepId,
    pub label: StageLabel,
    /// Executor-facing start offset relative to the enclosing group; never a
    /// wait performed at generation time
    pub delay: Option<Duration>,
    pub kind: StepKind,
}

/// An immutable, fully-ordered upgrade test plan
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    seed: u64,
    num_nodes: usize,
    mode: DeploymentMode,
    path: UpgradePath,
    steps: Vec<Step>,
}

impl Plan {
    pub(crate) fn new(
        seed: u64,
        num_nodes: usize,
        mode: DeploymentMode,
        path: UpgradePath,
        steps: Vec<Step>,
    ) -> Self {
        Plan { seed, num_nodes, mode, path, steps }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    pub fn upgrade_path(&self) -> &UpgradePath {
        &self.path
    }

    /// Top-level steps (concurrency groups count as one step here)
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Every step in pre-order, including concurrency groups and their
    /// members
    pub fn iter_flat(&self) -> impl Iterator<Item = &Step> {
        fn walk<'a>(steps: &'a [Step], out: &mut Vec<&'a Step>) {
            for step in steps {
                out.push(step);
                if let StepKind::ConcurrencyGroup { steps } = &step.kind {
                    walk(steps, out);
                }
            }
        }
        let mut flat = Vec::new();
        walk(&self.steps, &mut flat);
        flat.into_iter()
    }

    pub fn step_count(&self) -> usize {
        self.iter_flat().count()
    }

    /// Stable tree-formatted transcript of this plan
    pub fn display(&self) -> PlanDisplay<'_> {
        PlanDisplay { plan: self }
    }
}

/// Wrapper implementing the transcript rendering of a [`Plan`]
pub struct PlanDisplay<'a> {
    plan: &'a Plan,
}

impl fmt::Display for PlanDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plan = self.plan;
        writeln!(f, "mixed-version upgrade test plan")?;
        writeln!(f, "seed:          {}", plan.seed)?;
        writeln!(f, "nodes:         {}", plan.num_nodes)?;
        writeln!(f, "deployment:    {}", plan.mode)?;
        writeln!(
            f,
            "upgrade path:  {}",
            plan.path.versions().iter().join(" -> ")
        )?;
        writeln!(f)?;
        render_steps(f, &plan.steps, 0)
    }
}

fn render_steps(
    f: &mut fmt::Formatter<'_>,
    steps: &[Step],
    depth: usize,
) -> fmt::Result {
    for step in steps {
        write!(f, "{:indent$}", "", indent = depth * 4)?;
        write!(f, "{}: [{}] ", step.id, step.label)?;
        step.kind.describe(f)?;
        if let Some(delay) = step.delay {
            write!(f, " (start after {})", format_delay(delay))?;
        }
        writeln!(f)?;
        if let StepKind::ConcurrencyGroup { steps } = &step.kind {
            render_steps(f, steps, depth + 1)?;
        }
    }
    Ok(())
}

fn format_delay(delay: Duration) -> String {
    let secs = delay.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
