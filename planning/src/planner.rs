// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The plan generator
//!
//! [`Planner::new`] validates a [`TestDescription`] up front; after that,
//! [`Planner::plan`] cannot fail.  Generation is single-threaded and
//! deterministic: the only mutable state is the step builder and the seeded
//! RNG, both exclusively owned by the one generation run, and every random
//! decision is drawn in a fixed order.

use crate::errors::PlanError;
use crate::hooks::{Hook, HookCategory, HookContext, HookRegistry};
use crate::input::{DeploymentMode, TestDescription};
use crate::plan::{Plan, Step, StepId, StepKind};
use crate::rng::{PlannerRng, RollbackPolicy};
use crate::stage::{StageLabel, StageTracker, Track, UpgradeStage};
use crate::versions::{
    resolve_upgrade_path, TargetSeries, TargetVersion, Transition,
    UpgradePath,
};
use slog::{Logger, debug, info, o};
use std::time::Duration;

/// Cluster settings applied when a separate-process tenant is started
const TENANT_SETUP_SETTINGS: [(&str, &str); 2] = [
    ("kv.tenant_rate_limiter.rate_limit", "-1"),
    ("server.secondary_tenants.authorization.mode", "allow-all"),
];

pub struct Planner<'a> {
    log: Logger,
    description: &'a TestDescription,
    registry: HookRegistry<'a>,
    workloads: Vec<&'a Hook>,
    path: UpgradePath,
    rng: PlannerRng,
    builder: StepBuilder,
}

impl<'a> Planner<'a> {
    /// Validates `description` and prepares a generation run
    ///
    /// Every [`PlanError`] this system can produce is raised here, before a
    /// single step exists.
    pub fn new(
        log: &Logger,
        description: &'a TestDescription,
    ) -> Result<Planner<'a>, PlanError> {
        if description.get_nodes() == 0 {
            return Err(PlanError::ZeroNodes);
        }
        let path = resolve_upgrade_path(
            description.get_predecessors(),
            description.get_num_upgrades(),
        )?;
        if let RollbackPolicy::WithProbability(p) =
            description.get_rollback_policy()
        {
            if !(0.0..=1.0).contains(&p) {
                return Err(PlanError::InvalidRollbackProbability {
                    value: p,
                });
            }
        }
        if description.get_deployment_mode()
            == DeploymentMode::SeparateProcess
            && description.get_tenant_name().is_none()
        {
            return Err(PlanError::MissingTenantName);
        }

        let mut registry = HookRegistry::new();
        for hook in description.get_hooks() {
            registry.register(hook)?;
        }
        let workloads = description
            .get_workloads()
            .iter()
            .map(|name| registry.workload(name))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Planner {
            log: log.new(o!("component" => "planner")),
            description,
            registry,
            workloads,
            path,
            rng: PlannerRng::from_seed(description.get_seed()),
            builder: StepBuilder::new(),
        })
    }

    /// Generates the plan; infallible once validation has passed
    pub fn plan(mut self) -> Plan {
        info!(
            self.log, "generating upgrade plan";
            "seed" => self.description.get_seed(),
            "nodes" => self.description.get_nodes(),
            "mode" => %self.description.get_deployment_mode(),
            "transitions" => self.path.num_transitions(),
        );

        self.emit_initial_setup();

        let transitions: Vec<Transition> = self.path.transitions().collect();
        let policy = self.description.get_rollback_policy();
        for transition in &transitions {
            let rollback = self.rng.decide_rollback(transition.index, policy);
            debug!(
                self.log, "rollback decision";
                "transition" => transition.index,
                "rollback" => rollback,
            );
            // The tenant only upgrades through transitions it was already
            // running before; a tenant started after this transition's
            // system pass first upgrades on the next one.
            let tenant_ready = self.builder.tenant.is_some();
            self.upgrade_pass(Track::System, transition, rollback);
            if self.separate_process() && tenant_ready {
                self.upgrade_pass(Track::Tenant, transition, rollback);
            }
            self.maybe_start_tenant(transition.to.series());
        }

        let plan = Plan::new(
            self.description.get_seed(),
            self.description.get_nodes(),
            self.description.get_deployment_mode(),
            self.path,
            self.builder.steps,
        );
        verify_ordering(&plan);
        info!(
            self.log, "generated upgrade plan";
            "steps" => plan.step_count(),
        );
        plan
    }

    fn separate_process(&self) -> bool {
        self.description.get_deployment_mode()
            == DeploymentMode::SeparateProcess
    }

    /// Install + first start + first acknowledgment, tenant setup when the
    /// tenant exists from the beginning, and the one-shot startup/background
    /// concurrency group
    fn emit_initial_setup(&mut self) {
        let initial = self.path.initial_version();
        self.builder.push(StepKind::InstallBinaries { version: initial });
        self.builder.push(StepKind::StartCluster);
        self.builder.push(StepKind::WaitForAcknowledgment {
            series: initial.series(),
        });
        self.maybe_start_tenant(initial.series());

        let ctx = HookContext { to: &initial, track: Track::System };
        let startup = self.registry.eligible(HookCategory::Startup, &ctx);
        let workload_names: Vec<String> = self
            .workloads
            .iter()
            .map(|hook| hook.name().to_string())
            .collect();
        if startup.is_empty() && workload_names.is_empty() {
            return;
        }

        let startup_names: Vec<String> =
            startup.iter().map(|hook| hook.name().to_string()).collect();
        // The group itself is labeled with the stage of its first member.
        if startup_names.is_empty() {
            self.builder.enter(Track::System, UpgradeStage::Background);
        } else {
            self.builder.enter(Track::System, UpgradeStage::OnStartup);
        }
        self.builder.push_group(|builder| {
            for name in startup_names {
                builder.push(StepKind::RunHook {
                    name,
                    category: HookCategory::Startup,
                });
            }
            if !workload_names.is_empty() {
                builder.enter(Track::System, UpgradeStage::Background);
                // Workloads get no terminal wait: they persist for the
                // remainder of the plan.
                for name in workload_names {
                    builder.push(StepKind::RunHook {
                        name,
                        category: HookCategory::Background,
                    });
                }
            }
        });
    }

    /// Starts the tenant track once the system track has acknowledged
    /// `acked`, if the description calls for it
    fn maybe_start_tenant(&mut self, acked: TargetSeries) {
        if !self.separate_process() || self.builder.tenant.is_some() {
            return;
        }
        if let Some(threshold) =
            self.description.get_tenant_separation_series()
        {
            if !acked.at_least(&threshold) {
                return;
            }
        }
        let name = self
            .description
            .get_tenant_name()
            .expect("validated in Planner::new")
            .to_string();
        info!(self.log, "starting tenant track"; "tenant" => &name);
        self.builder.enter(Track::System, UpgradeStage::TenantSetup);
        self.builder.tenant = Some(StageTracker::new(Track::Tenant));
        self.builder.enter(Track::Tenant, UpgradeStage::TenantSetup);
        self.builder.push(StepKind::StartTenant { name });
        for (setting, value) in TENANT_SETUP_SETTINGS {
            self.builder.push(StepKind::SetClusterSetting {
                name: setting.to_string(),
                value: value.to_string(),
            });
        }
    }

    /// One track's full pass over one transition
    ///
    /// Both tracks run exactly this routine, which is what keeps their
    /// ordering invariants identical.
    fn upgrade_pass(
        &mut self,
        track: Track,
        transition: &Transition,
        rollback: bool,
    ) {
        let ctx = HookContext { to: &transition.to, track };
        let mixed = self.registry.eligible(HookCategory::MixedVersion, &ctx);
        let finalized = self
            .registry
            .eligible(HookCategory::AfterUpgradeFinalized, &ctx);
        debug!(
            self.log, "transition pass";
            "transition" => transition.index,
            "track" => %track,
            "from" => %transition.from,
            "to" => %transition.to,
            "rollback" => rollback,
            "mixed_version_hooks" => mixed.len(),
        );

        if track == Track::Tenant {
            self.builder.enter(Track::System, UpgradeStage::UpgradingTenant);
        }
        let first_round_stage = if rollback {
            UpgradeStage::TemporaryUpgrade
        } else {
            UpgradeStage::LastUpgrade
        };
        self.builder.enter(track, first_round_stage);
        self.builder.push(StepKind::PreventAutoUpgrade {
            series: transition.from.series(),
        });

        self.restart_round(transition.to, &mixed);
        if rollback {
            self.builder.enter(track, UpgradeStage::RollbackUpgrade);
            self.restart_round(transition.from, &mixed);
            self.builder.enter(track, UpgradeStage::LastUpgrade);
            self.restart_round(transition.to, &mixed);
        }

        self.builder.enter(track, UpgradeStage::Finalizing);
        self.builder.push(StepKind::AllowAutoUpgrade {
            series: transition.from.series(),
        });
        if track == Track::Tenant {
            // Tenants do not auto-finalize; the version bump is explicit.
            self.builder.push(StepKind::Finalize {
                series: transition.to.series(),
            });
        }
        self.builder.push(StepKind::WaitForAcknowledgment {
            series: transition.to.series(),
        });

        self.builder.enter(track, UpgradeStage::AfterUpgradeFinished);
        for hook in finalized {
            self.builder.push(StepKind::RunHook {
                name: hook.name().to_string(),
                category: HookCategory::AfterUpgradeFinalized,
            });
        }
    }

    /// One restart round: every node once, in a fresh random permutation,
    /// with eligible mixed-version hooks grouped concurrently with the
    /// restarts the RNG assigns them to
    fn restart_round(&mut self, to: TargetVersion, hooks: &[&'a Hook]) {
        let num_nodes = self.description.get_nodes();
        let permutation = self.rng.node_permutation(num_nodes);
        let positions = self.rng.interleave(hooks.len(), num_nodes);
        let delays: Vec<Duration> =
            hooks.iter().map(|_| self.rng.hook_delay()).collect();
        debug!(
            self.log, "restart round";
            "to" => %to,
            "permutation" => ?permutation,
            "hook_positions" => ?positions,
        );

        for (restart_index, node) in permutation.into_iter().enumerate() {
            let restart = StepKind::RestartNode { node, version: to };
            let concurrent: Vec<(String, Duration)> = positions
                .iter()
                .enumerate()
                .filter(|(_, position)| **position == restart_index)
                .map(|(hook_index, _)| {
                    (hooks[hook_index].name().to_string(), delays[hook_index])
                })
                .collect();
            if concurrent.is_empty() {
                self.builder.push(restart);
            } else {
                self.builder.push_group(|builder| {
                    builder.push(restart);
                    for (name, delay) in concurrent {
                        let delay =
                            if delay.is_zero() { None } else { Some(delay) };
                        builder.push_delayed(
                            StepKind::RunHook {
                                name,
                                category: HookCategory::MixedVersion,
                            },
                            delay,
                        );
                    }
                });
            }
        }
    }
}

/// Owns the growing step forest, the per-track stage trackers, and the
/// sequence-number counter
struct StepBuilder {
    steps: Vec<Step>,
    next_id: u32,
    system: StageTracker,
    tenant: Option<StageTracker>,
}

impl StepBuilder {
    fn new() -> Self {
        StepBuilder {
            steps: Vec::new(),
            next_id: 1,
            system: StageTracker::new(Track::System),
            tenant: None,
        }
    }

    fn label(&self) -> StageLabel {
        StageLabel {
            system: self.system.current(),
            tenant: self.tenant.as_ref().map(|tracker| tracker.current()),
        }
    }

    fn enter(&mut self, track: Track, stage: UpgradeStage) {
        match track {
            Track::System => self.system.enter(stage),
            Track::Tenant => self
                .tenant
                .as_mut()
                .expect("tenant track must be started before it is entered")
                .enter(stage),
        }
    }

    fn next_step_id(&mut self) -> StepId {
        let id = StepId(self.next_id);
        self.next_id += 1;
        id
    }

    fn push(&mut self, kind: StepKind) {
        self.push_delayed(kind, None);
    }

    fn push_delayed(&mut self, kind: StepKind, delay: Option<Duration>) {
        let id = self.next_step_id();
        let label = self.label();
        self.steps.push(Step { id, label, delay, kind });
    }

    /// Emits a concurrency group whose members are pushed by `build`
    ///
    /// The group receives its own sequence number before its members, so
    /// numbering stays pre-order.
    fn push_group(&mut self, build: impl FnOnce(&mut Self)) {
        let id = self.next_step_id();
        let label = self.label();
        let parent = std::mem::take(&mut self.steps);
        build(self);
        let members = std::mem::replace(&mut self.steps, parent);
        assert!(!members.is_empty(), "refusing to emit an empty group");
        self.steps.push(Step {
            id,
            label,
            delay: None,
            kind: StepKind::ConcurrencyGroup { steps: members },
        });
    }
}

/// Sanity-checks the gating order of a sealed plan
///
/// A violation here is a planner bug, not a runtime fault: generation is
/// pure, so the only way to trip these assertions is to have emitted steps
/// out of order.
fn verify_ordering(plan: &Plan) {
    let mut gate_held = false;
    let mut restarts_since_gate = 0usize;
    let mut ack_pending = false;
    let mut any_gate_seen = false;

    for step in plan.iter_flat() {
        match &step.kind {
            StepKind::PreventAutoUpgrade { .. } => {
                assert!(!gate_held, "nested auto-upgrade gate at {}", step.id);
                assert!(
                    !ack_pending,
                    "new gate before acknowledgment at {}",
                    step.id
                );
                gate_held = true;
                any_gate_seen = true;
                restarts_since_gate = 0;
            }
            StepKind::RestartNode { .. } => {
                assert!(
                    gate_held,
                    "restart outside an auto-upgrade gate at {}",
                    step.id
                );
                restarts_since_gate += 1;
            }
            StepKind::AllowAutoUpgrade { .. } => {
                assert!(gate_held, "allow without prevent at {}", step.id);
                assert!(
                    restarts_since_gate > 0,
                    "allow with no restarts at {}",
                    step.id
                );
                gate_held = false;
                ack_pending = true;
            }
            StepKind::WaitForAcknowledgment { .. } => {
                // The initial acknowledgment precedes any gating.
                assert!(
                    ack_pending || !any_gate_seen,
                    "acknowledgment with no preceding allow at {}",
                    step.id
                );
                ack_pending = false;
            }
            _ => (),
        }
    }
    assert!(!gate_held, "plan ended with the auto-upgrade gate held");
    assert!(!ack_pending, "plan ended with an unacknowledged transition");
}
