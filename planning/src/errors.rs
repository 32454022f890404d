// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Errors raised while validating a test description
//!
//! All of these are reported by [`Planner::new`](crate::planner::Planner)
//! before a single step has been emitted.  Once validation passes, plan
//! generation itself cannot fail.

use crate::hooks::HookCategory;
use crate::versions::Version;
use slog_error_chain::SlogInlineError;

#[derive(Debug, thiserror::Error, SlogInlineError)]
pub enum PlanError {
    #[error("predecessor version list is empty")]
    NoPredecessors,

    #[error(
        "predecessor versions must be strictly ascending \
         ({previous} appears before {next})"
    )]
    PredecessorsNotAscending { previous: Version, next: Version },

    #[error(
        "{requested} upgrades requested but only {available} \
         predecessor version(s) available"
    )]
    InsufficientPredecessors { requested: usize, available: usize },

    #[error("cluster must have at least one node")]
    ZeroNodes,

    #[error("hook {name:?} was referenced but never registered")]
    UnknownHook { name: String },

    #[error("hook {name:?} registered twice in category {category}")]
    DuplicateHook { name: String, category: HookCategory },

    #[error("separate-process deployment requires a tenant name")]
    MissingTenantName,

    #[error("rollback probability {value} is not within [0, 1]")]
    InvalidRollbackProbability { value: f64 },
}
