// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! User-supplied hook callbacks, cataloged by category
//!
//! The registry only answers "which hooks are eligible here, in declared
//! order".  When and how eligible hooks actually run is decided by the
//! planner via its seeded RNG; declaration order is nothing more than a
//! deterministic tie-break.

use crate::errors::PlanError;
use crate::stage::Track;
use crate::versions::TargetVersion;
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    Serialize,
    Deserialize,
)]
pub enum HookCategory {
    /// Runs once, right after the initial install is acknowledged
    #[strum(serialize = "on-startup")]
    #[serde(rename = "on-startup")]
    Startup,
    /// Runs while the cluster is mid-upgrade, concurrent with a restart
    #[strum(serialize = "in-mixed-version")]
    #[serde(rename = "in-mixed-version")]
    MixedVersion,
    /// Runs after a transition has finalized and been acknowledged
    #[strum(serialize = "after-upgrade-finalized")]
    #[serde(rename = "after-upgrade-finalized")]
    AfterUpgradeFinalized,
    /// A workload that persists for the remainder of the plan
    #[strum(serialize = "background")]
    #[serde(rename = "background")]
    Background,
}

/// The context a hook's applicability predicate is evaluated against
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    /// The version the current transition is moving to
    pub to: &'a TargetVersion,
    pub track: Track,
}

pub type HookPredicate =
    Box<dyn Fn(&HookContext<'_>) -> bool + Send + Sync>;

/// A named user callback
///
/// The predicate, when present, limits which versions/tracks the hook is
/// eligible for; hooks without one are always eligible.
#[derive(Debug)]
pub struct Hook {
    name: String,
    category: HookCategory,
    predicate: Option<DebugIgnore<HookPredicate>>,
}

impl Hook {
    pub fn new(name: impl Into<String>, category: HookCategory) -> Self {
        Hook { name: name.into(), category, predicate: None }
    }

    pub fn with_predicate(
        name: impl Into<String>,
        category: HookCategory,
        predicate: HookPredicate,
    ) -> Self {
        Hook {
            name: name.into(),
            category,
            predicate: Some(DebugIgnore(predicate)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> HookCategory {
        self.category
    }

    fn applies(&self, ctx: &HookContext<'_>) -> bool {
        match &self.predicate {
            Some(predicate) => (predicate.0)(ctx),
            None => true,
        }
    }
}

/// Catalog of registered hooks, preserving declaration order
///
/// The registry borrows the hooks it catalogs, so one set of registrations
/// can back any number of plan generations.
#[derive(Debug, Default)]
pub struct HookRegistry<'a> {
    hooks: IndexMap<(HookCategory, &'a str), &'a Hook>,
}

impl<'a> HookRegistry<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hook; the (category, name) pair must be unique
    pub fn register(&mut self, hook: &'a Hook) -> Result<(), PlanError> {
        let key = (hook.category, hook.name.as_str());
        if self.hooks.contains_key(&key) {
            return Err(PlanError::DuplicateHook {
                name: hook.name.clone(),
                category: hook.category,
            });
        }
        self.hooks.insert(key, hook);
        Ok(())
    }

    /// The hooks in `category` whose predicates accept `ctx`, in declaration
    /// order
    pub fn eligible(
        &self,
        category: HookCategory,
        ctx: &HookContext<'_>,
    ) -> Vec<&'a Hook> {
        self.hooks
            .values()
            .filter(|hook| hook.category == category && hook.applies(ctx))
            .copied()
            .collect()
    }

    /// Whether any category has a hook named `name`
    pub fn contains(&self, name: &str) -> bool {
        self.hooks.values().any(|hook| hook.name == name)
    }

    /// Looks up a background workload by name
    pub fn workload(&self, name: &str) -> Result<&'a Hook, PlanError> {
        self.hooks
            .get(&(HookCategory::Background, name))
            .copied()
            .ok_or_else(|| PlanError::UnknownHook { name: name.to_string() })
    }
}
