// SPDX-License-Identifier: BUSL-1.1
//! # didreg-cli: Command-Line Interface for the DID Registry
//!
//! Provides the `didreg` binary. The registry itself is in-memory, so the
//! CLI works on scripts: a YAML file of operations is replayed against a
//! fresh registry and every outcome is checked against its expectation.
//!
//! ## Subcommands
//!
//! - `didreg replay <script.yaml>`: Run a script, report per-step outcomes,
//!   final metrics, and reconciliation.
//! - `didreg config`: Print or check the effective registry configuration.
//!
//! ```bash
//! didreg replay onboarding.yaml --audit-out audit.json
//! didreg --config registry.yaml config --check
//! ```

pub mod config_cmd;
pub mod replay;

use std::path::Path;

use anyhow::{Context, Result};
use didreg_state::RegistryConfig;

/// Resolve the base configuration: a YAML file if one was given, otherwise
/// the `DIDREG_*` environment variables.
pub fn load_config(path: Option<&Path>) -> Result<RegistryConfig> {
    match path {
        Some(path) => RegistryConfig::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => RegistryConfig::from_env().context("loading config from environment"),
    }
}
