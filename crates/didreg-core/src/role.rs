// SPDX-License-Identifier: BUSL-1.1
//! # Roles
//!
//! The five registry capabilities. Roles are disjoint: holding `Admin` does
//! not imply `Issuer`. A principal may hold any subset.

use serde::{Deserialize, Serialize};

/// A registry capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Grants and revokes roles, transfers status list control, pauses.
    Admin,
    /// Sets KYC flags on identities.
    Registrar,
    /// Issues, revokes, and restores credentials; creates and publishes
    /// status lists.
    Issuer,
    /// Read-only privileged queries.
    Auditor,
    /// Pauses and unpauses the registry.
    Emergency,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::Registrar,
        Role::Issuer,
        Role::Auditor,
        Role::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Registrar => "registrar",
            Self::Issuer => "issuer",
            Self::Auditor => "auditor",
            Self::Emergency => "emergency",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown role {s:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_str_matches_serde() {
        for role in Role::ALL {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.as_str()));
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("ISSUER".parse::<Role>().unwrap(), Role::Issuer);
        assert_eq!("emergency".parse::<Role>().unwrap(), Role::Emergency);
        assert!("root".parse::<Role>().is_err());
    }
}
