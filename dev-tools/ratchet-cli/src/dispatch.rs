// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use ratchet_planning::Planner;
use strum::IntoEnumIterator;
use swrite::{swriteln, SWrite};

use crate::config::TestConfig;
use ratchet_planning::hooks::HookCategory;

/// Ratchet upgrade-test planner app.
#[derive(Debug, Parser)]
#[command(version)]
pub struct RatchetApp {
    #[clap(subcommand)]
    subcommand: RatchetCommand,
}

impl RatchetApp {
    /// Executes the app.
    pub fn exec(self, log: &slog::Logger) -> Result<()> {
        match self.subcommand {
            RatchetCommand::Generate(opts) => opts.exec(log),
            RatchetCommand::Hooks(opts) => opts.exec(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum RatchetCommand {
    /// Generate a plan from a test config and print its transcript.
    Generate(GenerateOpts),
    /// List the hooks a test config registers, by category.
    Hooks(HooksOpts),
}

#[derive(Debug, Args)]
struct GenerateOpts {
    /// Path to the TOML test configuration
    #[clap(long)]
    config: Utf8PathBuf,
    /// Override the seed from the configuration
    #[clap(long)]
    seed: Option<u64>,
}

impl GenerateOpts {
    fn exec(self, log: &slog::Logger) -> Result<()> {
        let config = TestConfig::from_file(&self.config)?;
        let mut desc = config.to_description()?;
        if let Some(seed) = self.seed {
            desc.seed(seed);
        }
        let plan = Planner::new(log, &desc)?.plan();
        print!("{}", plan.display());
        Ok(())
    }
}

#[derive(Debug, Args)]
struct HooksOpts {
    /// Path to the TOML test configuration
    #[clap(long)]
    config: Utf8PathBuf,
}

impl HooksOpts {
    fn exec(self) -> Result<()> {
        let config = TestConfig::from_file(&self.config)?;
        let mut report = String::new();
        for category in HookCategory::iter() {
            let hooks: Vec<_> = config
                .hooks
                .iter()
                .filter(|hook| hook.category == category)
                .collect();
            swriteln!(report, "{} ({} registered)", category, hooks.len());
            for hook in hooks {
                match &hook.min_version {
                    Some(min) => swriteln!(
                        report,
                        "    {} (min version {})",
                        hook.name,
                        min
                    ),
                    None => swriteln!(report, "    {}", hook.name),
                }
            }
        }
        swriteln!(report, "workloads: {}", config.workloads.join(", "));
        print!("{report}");
        Ok(())
    }
}
