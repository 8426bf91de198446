// SPDX-License-Identifier: BUSL-1.1
//! # Config Subcommand
//!
//! Shows the configuration a registry would be built from, after file or
//! environment resolution and validation.

use anyhow::{Context, Result};
use clap::Args;
use didreg_state::RegistryConfig;

/// Arguments for the `didreg config` subcommand.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Only validate; print nothing on success.
    #[arg(long)]
    pub check: bool,

    /// Print as JSON instead of YAML.
    #[arg(long)]
    pub json: bool,
}

/// Execute the config subcommand.
pub fn run_config(args: &ConfigArgs, config: &RegistryConfig) -> Result<u8> {
    config.validate().context("configuration is invalid")?;
    if args.check {
        tracing::info!(admin = %config.admin, grants = config.grants.len(), "configuration valid");
        return Ok(0);
    }
    print!("{}", render(config, args.json)?);
    Ok(0)
}

fn render(config: &RegistryConfig, json: bool) -> Result<String> {
    if json {
        let mut out = serde_json::to_string_pretty(config).context("serializing config")?;
        out.push('\n');
        Ok(out)
    } else {
        serde_yaml::to_string(config).context("serializing config")
    }
}
