// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Versions, version series, and upgrade path resolution

use crate::errors::PlanError;
use std::fmt;
use std::str::FromStr;

/// A released version of the database under test ("21.2.11")
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Version { major, minor, patch }
    }

    /// The release series this version belongs to ("21.2")
    ///
    /// Cluster-version acknowledgment is expressed on the series, not the
    /// patch release: every node running any 21.2.x binary reports cluster
    /// version "21.2".
    pub fn series(&self) -> Series {
        Series { major: self.major, minor: self.minor }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix('v').unwrap_or(s);
        let mut parts = trimmed.splitn(3, '.');
        let mut next = || {
            parts
                .next()
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or_else(|| ParseVersionError(s.to_string()))
        };
        let (major, minor, patch) = (next()?, next()?, next()?);
        Ok(Version { major, minor, patch })
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("invalid version string {0:?} (expected \"major.minor.patch\")")]
pub struct ParseVersionError(String);

/// A release series ("21.2"): the granularity of cluster-version gates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Series {
    pub major: u32,
    pub minor: u32,
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for Series {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, '.');
        let mut next = || {
            parts
                .next()
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or_else(|| ParseVersionError(s.to_string()))
        };
        let (major, minor) = (next()?, next()?);
        Ok(Series { major, minor })
    }
}

/// A binary version a node can run: either a released predecessor or the
/// build under test
///
/// `Current` sorts after every released predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetVersion {
    Predecessor(Version),
    Current,
}

impl TargetVersion {
    /// The series this target acknowledges once every node runs it
    pub fn series(&self) -> TargetSeries {
        match self {
            TargetVersion::Predecessor(v) => TargetSeries::Series(v.series()),
            TargetVersion::Current => TargetSeries::Current,
        }
    }

    /// Whether this target is at least `version` (`Current` always is)
    pub fn at_least(&self, version: &Version) -> bool {
        match self {
            TargetVersion::Predecessor(v) => v >= version,
            TargetVersion::Current => true,
        }
    }
}

impl PartialOrd for TargetVersion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TargetVersion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use TargetVersion::*;
        match (self, other) {
            (Predecessor(a), Predecessor(b)) => a.cmp(b),
            (Predecessor(_), Current) => std::cmp::Ordering::Less,
            (Current, Predecessor(_)) => std::cmp::Ordering::Greater,
            (Current, Current) => std::cmp::Ordering::Equal,
        }
    }
}

impl fmt::Display for TargetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetVersion::Predecessor(v) => v.fmt(f),
            TargetVersion::Current => write!(f, "current"),
        }
    }
}

/// The series counterpart of [`TargetVersion`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetSeries {
    Series(Series),
    Current,
}

impl TargetSeries {
    pub fn at_least(&self, series: &Series) -> bool {
        match self {
            TargetSeries::Series(s) => s >= series,
            TargetSeries::Current => true,
        }
    }
}

impl fmt::Display for TargetSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSeries::Series(s) => s.fmt(f),
            TargetSeries::Current => write!(f, "current"),
        }
    }
}

/// One move along the upgrade path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Position along the path, starting at 0
    pub index: usize,
    pub from: TargetVersion,
    pub to: TargetVersion,
}

/// The resolved sequence of versions a test run steps through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradePath {
    versions: Vec<TargetVersion>,
}

impl UpgradePath {
    /// The version the cluster is installed at before any upgrades
    pub fn initial_version(&self) -> TargetVersion {
        self.versions[0]
    }

    pub fn num_transitions(&self) -> usize {
        self.versions.len() - 1
    }

    pub fn versions(&self) -> &[TargetVersion] {
        &self.versions
    }

    /// Consecutive (from, to) pairs along the path
    pub fn transitions(&self) -> impl Iterator<Item = Transition> + '_ {
        self.versions.windows(2).enumerate().map(|(index, pair)| {
            Transition { index, from: pair[0], to: pair[1] }
        })
    }
}

/// Resolves a predecessor list and upgrade count into an [`UpgradePath`]
///
/// The path is the last `num_upgrades` predecessors followed by
/// [`TargetVersion::Current`], so it always contains exactly `num_upgrades`
/// transitions and the final transition always targets the build under test.
pub fn resolve_upgrade_path(
    predecessors: &[Version],
    num_upgrades: usize,
) -> Result<UpgradePath, PlanError> {
    if predecessors.is_empty() {
        return Err(PlanError::NoPredecessors);
    }
    for pair in predecessors.windows(2) {
        if pair[0] >= pair[1] {
            return Err(PlanError::PredecessorsNotAscending {
                previous: pair[0],
                next: pair[1],
            });
        }
    }
    if num_upgrades == 0 || num_upgrades > predecessors.len() {
        return Err(PlanError::InsufficientPredecessors {
            requested: num_upgrades,
            available: predecessors.len(),
        });
    }

    let versions = predecessors[predecessors.len() - num_upgrades..]
        .iter()
        .map(|v| TargetVersion::Predecessor(*v))
        .chain(std::iter::once(TargetVersion::Current))
        .collect();
    Ok(UpgradePath { versions })
}
