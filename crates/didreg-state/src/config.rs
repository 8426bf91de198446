// SPDX-License-Identifier: BUSL-1.1
//! Registry configuration.
//!
//! Loaded from environment variables or a YAML file. Principals are kept as
//! strings here and validated when the registry is built, so a typo in a
//! config file surfaces as a [`ConfigError`] naming the field.

use std::path::Path;

use didreg_core::{Principal, Role, ValidationError};
use serde::{Deserialize, Serialize};

/// An initial role assignment applied at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: Role,
    pub principal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Principal that receives the admin role at bootstrap.
    pub admin: String,
    /// Additional grants applied after bootstrap.
    pub grants: Vec<RoleGrant>,
    /// Maximum audit records retained in memory.
    pub audit_capacity: usize,
    /// Mirror audit events to `tracing`.
    pub audit_to_tracing: bool,
    /// Start with mutations paused.
    pub start_paused: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            admin: "admin".to_string(),
            grants: Vec::new(),
            audit_capacity: 10_000,
            audit_to_tracing: true,
            start_paused: false,
        }
    }
}

impl RegistryConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `DIDREG_ADMIN` (default: `admin`)
    /// - `DIDREG_AUDIT_CAPACITY` (default: 10000)
    /// - `DIDREG_AUDIT_LOG` (default: true)
    /// - `DIDREG_START_PAUSED` (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`RegistryConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            admin: lookup("DIDREG_ADMIN").unwrap_or(defaults.admin),
            grants: Vec::new(),
            audit_capacity: match lookup("DIDREG_AUDIT_CAPACITY") {
                Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    var: "DIDREG_AUDIT_CAPACITY".to_string(),
                    value: raw,
                })?,
                None => defaults.audit_capacity,
            },
            audit_to_tracing: env_bool(&lookup, "DIDREG_AUDIT_LOG", defaults.audit_to_tracing)?,
            start_paused: env_bool(&lookup, "DIDREG_START_PAUSED", defaults.start_paused)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Check every field without building anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audit_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                var: "audit_capacity".to_string(),
                value: "0".to_string(),
            });
        }
        self.admin_principal()?;
        self.grant_principals()?;
        Ok(())
    }

    pub fn admin_principal(&self) -> Result<Principal, ConfigError> {
        Principal::new(self.admin.as_str()).map_err(|source| ConfigError::InvalidPrincipal {
            field: "admin".to_string(),
            source,
        })
    }

    pub fn grant_principals(&self) -> Result<Vec<(Role, Principal)>, ConfigError> {
        self.grants
            .iter()
            .enumerate()
            .map(|(i, grant)| {
                Principal::new(grant.principal.as_str())
                    .map(|p| (grant.role, p))
                    .map_err(|source| ConfigError::InvalidPrincipal {
                        field: format!("grants[{i}].principal"),
                        source,
                    })
            })
            .collect()
    }
}

fn env_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                var: var.to_string(),
                value: raw,
            }),
        },
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid principal in {field}: {source}")]
    InvalidPrincipal {
        field: String,
        source: ValidationError,
    },
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: String, value: String },
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
