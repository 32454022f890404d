// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test-plan generation for mixed-version rolling upgrades
//!
//! This crate turns a declarative [`TestDescription`] (predecessor versions,
//! an upgrade count, a deployment mode, hook registrations, and a seed) into
//! an immutable [`Plan`]: a partially-ordered forest of steps modeling the
//! real upgrade protocol, including auto-upgrade gating, per-node restart
//! rounds, version-acknowledgment barriers, optional rollback excursions,
//! and tenant/system track separation.  The same description and seed always
//! produce a byte-identical plan.
//!
//! Executing a plan (restarting real binaries, running SQL, invoking hook
//! bodies) is a separate concern; the only contract with an executor is the
//! [`Plan`] value itself.

mod errors;
pub mod hooks;
pub mod input;
pub mod plan;
pub mod planner;
pub mod rng;
pub mod stage;
pub mod versions;

pub use errors::PlanError;
pub use input::{DeploymentMode, TestDescription};
pub use plan::Plan;
pub use planner::Planner;
