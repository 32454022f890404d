// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Upgrade phase tracking
//!
//! Every step in a plan is labeled with the phase each track was in when the
//! step was emitted.  The tracker is driven only by explicit planner calls;
//! an illegal phase move is a planner defect and panics rather than being
//! silently patched.

use std::fmt;
use strum::{Display, EnumIter};

/// One of the two process groups a step can apply to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Track {
    System,
    Tenant,
}

/// The phase of one track's upgrade timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum UpgradeStage {
    /// Initial install and cluster start
    Init,
    /// One-shot startup hooks, right after the first acknowledgment
    OnStartup,
    /// Background workloads that persist for the rest of the plan
    Background,
    /// Starting the separate-process tenant and its cluster settings
    TenantSetup,
    /// First upgrade round of a transition that will roll back
    TemporaryUpgrade,
    /// Downgrade round of a rollback excursion
    RollbackUpgrade,
    /// The authoritative upgrade round of a transition
    LastUpgrade,
    /// Auto-upgrade re-enabled; migrations run and the version is finalized
    Finalizing,
    /// System-track label while the tenant track runs its own pass
    UpgradingTenant,
    /// After-upgrade-finalized hooks for a completed transition
    AfterUpgradeFinished,
}

impl UpgradeStage {
    /// Whether a tracker may move from `self` to `next`
    ///
    /// The relation covers both tracks; a move outside it means the planner
    /// emitted steps out of order.
    fn permits(&self, next: UpgradeStage) -> bool {
        use UpgradeStage::*;
        match self {
            Init => matches!(
                next,
                OnStartup | Background | TenantSetup | TemporaryUpgrade
                    | LastUpgrade
            ),
            OnStartup => matches!(
                next,
                Background | TenantSetup | TemporaryUpgrade | LastUpgrade
            ),
            Background => {
                matches!(next, TenantSetup | TemporaryUpgrade | LastUpgrade)
            }
            TenantSetup => matches!(
                next,
                OnStartup | Background | TemporaryUpgrade | LastUpgrade
                    | UpgradingTenant
            ),
            TemporaryUpgrade => matches!(next, RollbackUpgrade),
            RollbackUpgrade => matches!(next, LastUpgrade),
            LastUpgrade => matches!(next, Finalizing),
            Finalizing => matches!(next, AfterUpgradeFinished),
            AfterUpgradeFinished => matches!(
                next,
                TemporaryUpgrade | LastUpgrade | TenantSetup | UpgradingTenant
            ),
            UpgradingTenant => {
                matches!(next, TemporaryUpgrade | LastUpgrade)
            }
        }
    }
}

/// Tracks the current [`UpgradeStage`] of one track
///
/// Holds no concurrency and does no work of its own; it only validates the
/// moves the planner asks for.
#[derive(Debug, Clone)]
pub struct StageTracker {
    track: Track,
    current: UpgradeStage,
}

impl StageTracker {
    pub fn new(track: Track) -> Self {
        StageTracker { track, current: UpgradeStage::Init }
    }

    pub fn current(&self) -> UpgradeStage {
        self.current
    }

    /// Moves the tracker to `stage`
    ///
    /// Entering the current stage again is a no-op.  An illegal move panics:
    /// stage progression is a pure function of planner state, so a bad move
    /// can only be a planner bug.
    pub fn enter(&mut self, stage: UpgradeStage) {
        if stage == self.current {
            return;
        }
        assert!(
            self.current.permits(stage),
            "illegal stage move on {} track: {} -> {}",
            self.track,
            self.current,
            stage,
        );
        self.current = stage;
    }
}

/// The per-track phase snapshot attached to every step
///
/// `tenant` is `None` until a tenant track exists (always, in shared-process
/// deployments).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageLabel {
    pub system: UpgradeStage,
    pub tenant: Option<UpgradeStage>,
}

impl fmt::Display for StageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "system:{}", self.system)?;
        if let Some(tenant) = &self.tenant {
            write!(f, ";tenant:{tenant}")?;
        }
        Ok(())
    }
}
