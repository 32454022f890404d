// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! TOML test configuration for the CLI
//!
//! A [`TestConfig`] is the on-disk mirror of
//! [`ratchet_planning::TestDescription`]; hook predicates are expressed as
//! an optional minimum version.

use camino::{Utf8Path, Utf8PathBuf};
use ratchet_planning::hooks::{Hook, HookCategory};
use ratchet_planning::input::DeploymentMode;
use ratchet_planning::rng::RollbackPolicy;
use ratchet_planning::versions::{ParseVersionError, Series, Version};
use ratchet_planning::TestDescription;
use serde::{Deserialize, Serialize};
use slog_error_chain::SlogInlineError;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TestConfig {
    pub nodes: usize,
    pub deployment_mode: DeploymentMode,
    /// Ascending release versions preceding the build under test
    pub predecessors: Vec<String>,
    pub num_upgrades: Option<usize>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub rollback_policy: RollbackPolicy,
    pub tenant_name: Option<String>,
    pub tenant_separation_series: Option<String>,
    #[serde(default)]
    pub hooks: Vec<HookConfig>,
    #[serde(default)]
    pub workloads: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct HookConfig {
    pub name: String,
    pub category: HookCategory,
    /// When set, the hook is only eligible for transitions whose target is
    /// at least this version
    pub min_version: Option<String>,
}

impl TestConfig {
    /// Load a `TestConfig` from the given TOML file
    pub fn from_file<P: AsRef<Utf8Path>>(
        path: P,
    ) -> Result<TestConfig, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|error| {
            ConfigError::Io { error, path: path.to_owned() }
        })?;
        toml::from_str(&data).map_err(|error| ConfigError::Parse {
            error,
            path: path.to_owned(),
        })
    }

    /// Builds the planner input this configuration describes
    pub fn to_description(&self) -> Result<TestDescription, ConfigError> {
        let predecessors = self
            .predecessors
            .iter()
            .map(|raw| raw.parse::<Version>())
            .collect::<Result<Vec<_>, _>>()?;

        let mut desc = TestDescription::new();
        desc.nodes(self.nodes)
            .deployment_mode(self.deployment_mode)
            .predecessors(predecessors)
            .seed(self.seed)
            .rollback_policy(self.rollback_policy);
        if let Some(num_upgrades) = self.num_upgrades {
            desc.num_upgrades(num_upgrades);
        }
        if let Some(name) = &self.tenant_name {
            desc.tenant_name(name);
        }
        if let Some(raw) = &self.tenant_separation_series {
            desc.tenant_separation_series(raw.parse::<Series>()?);
        }
        for hook in &self.hooks {
            desc.add_hook(hook.to_hook()?);
        }
        for workload in &self.workloads {
            desc.add_workload(workload);
        }
        Ok(desc)
    }
}

impl HookConfig {
    fn to_hook(&self) -> Result<Hook, ConfigError> {
        match &self.min_version {
            None => Ok(Hook::new(&self.name, self.category)),
            Some(raw) => {
                let min = raw.parse::<Version>()?;
                Ok(Hook::with_predicate(
                    &self.name,
                    self.category,
                    Box::new(move |ctx| ctx.to.at_least(&min)),
                ))
            }
        }
    }
}

#[derive(Debug, Error, SlogInlineError)]
pub enum ConfigError {
    #[error("failed to read config file: {path}")]
    Io {
        #[source]
        error: std::io::Error,
        path: Utf8PathBuf,
    },
    #[error("failed to parse config file: {path}")]
    Parse {
        #[source]
        error: toml::de::Error,
        path: Utf8PathBuf,
    },
    #[error("invalid version in config")]
    InvalidVersion(#[from] ParseVersionError),
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    const EXAMPLE: &str = r#"
        nodes = 4
        deployment-mode = "separate-process"
        predecessors = ["21.2.11", "22.1.8"]
        seed = 1234
        rollback-policy = "always"
        tenant-name = "acme"
        tenant-separation-series = "22.1"
        workloads = ["bank"]

        [[hooks]]
        name = "bank"
        category = "background"

        [[hooks]]
        name = "h1"
        category = "in-mixed-version"
        min-version = "22.1.0"
    "#;

    #[test]
    fn example_config_round_trips_to_description() {
        let config: TestConfig = toml::from_str(EXAMPLE).unwrap();
        assert_eq!(config.nodes, 4);
        assert_eq!(config.rollback_policy, RollbackPolicy::Always);
        let desc = config.to_description().unwrap();
        assert_eq!(desc.get_nodes(), 4);
        assert_eq!(
            desc.get_deployment_mode(),
            DeploymentMode::SeparateProcess
        );
        assert_eq!(desc.get_tenant_name(), Some("acme"));
        assert_eq!(desc.get_num_upgrades(), 2);
        assert_eq!(desc.get_hooks().len(), 2);
        assert_eq!(desc.get_workloads(), ["bank".to_string()]);
    }

    #[test]
    fn probability_policy_parses() {
        let raw = r#"
            nodes = 1
            deployment-mode = "shared-process"
            predecessors = ["22.1.8"]
            rollback-policy = { with-probability = 0.25 }
        "#;
        let config: TestConfig = toml::from_str(raw).unwrap();
        assert_eq!(
            config.rollback_policy,
            RollbackPolicy::WithProbability(0.25)
        );
        // Unset policy falls back to the default.
        let raw = r#"
            nodes = 1
            deployment-mode = "shared-process"
            predecessors = ["22.1.8"]
        "#;
        let config: TestConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.rollback_policy, RollbackPolicy::default());
    }

    #[test]
    fn bad_version_string_is_rejected() {
        let raw = r#"
            nodes = 1
            deployment-mode = "shared-process"
            predecessors = ["not-a-version"]
        "#;
        let config: TestConfig = toml::from_str(raw).unwrap();
        assert!(matches!(
            config.to_description(),
            Err(ConfigError::InvalidVersion(_))
        ));
    }

    #[test]
    fn from_file_reports_missing_and_malformed() {
        let err = TestConfig::from_file("/nonexistent/ratchet.toml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));

        let mut file = camino_tempfile::NamedUtf8TempFile::new().unwrap();
        file.write_all(b"this is not toml = = =").unwrap();
        let err = TestConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
