// SPDX-License-Identifier: BUSL-1.1
//! # Replay Subcommand
//!
//! Replays a YAML script of registry operations against a fresh in-memory
//! registry. Each step names an operation, the calling principal, and
//! optionally the error code it is expected to fail with. A step whose
//! outcome differs from its expectation is a mismatch.
//!
//! ```yaml
//! config:
//!   admin: root
//!   grants:
//!     - { role: issuer, principal: uni }
//! steps:
//!   - { op: create_identity, caller: alice, key: alice, document: "{}" }
//!   - { op: issue_credential, caller: uni, id: C1, subject: bob,
//!       hash: "0x…", expect: SUBJECT_NOT_FOUND }
//! ```
//!
//! After the last step the registry is reconciled and its audit chain
//! verified. The exit code is 0 only if every step matched, the counters
//! reconcile, and the chain verifies.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use didreg_core::{CredentialId, Hash32, ListId, Principal, RegistryError, Role};
use didreg_state::{Reconciliation, Registry, RegistryConfig, SystemMetrics};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Arguments for the `didreg replay` subcommand.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Path to the YAML script.
    pub script: PathBuf,

    /// Print the full report as JSON instead of one line per step.
    #[arg(long)]
    pub json: bool,

    /// Write the retained audit records to this file as JSON.
    #[arg(long)]
    pub audit_out: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Overrides the configuration from `--config` or the environment.
    #[serde(default)]
    pub config: Option<RegistryConfig>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub caller: Option<Principal>,
    /// Error code the step must fail with. Absent means it must succeed.
    #[serde(default)]
    pub expect: Option<String>,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Action {
    CreateIdentity { key: Principal, document: String },
    UpdateDocument { key: Principal, document: String },
    SetKycStatus { key: Principal, verified: bool },
    IssueCredential { id: CredentialId, subject: Principal, hash: Hash32 },
    RevokeCredential { id: CredentialId, subject: Principal, reason: String },
    RestoreCredential { id: CredentialId, subject: Principal, reason: String },
    CreateList {
        list_id: ListId,
        uri: String,
        hash: Hash32,
        size: u64,
        purpose: Hash32,
    },
    Publish {
        list_id: ListId,
        version: u64,
        uri: String,
        hash: Hash32,
    },
    TransferListController { list_id: ListId, new_controller: Principal },
    GrantRole { role: Role, account: Principal },
    RevokeRole { role: Role, account: Principal },
    RenounceRole { role: Role },
    Pause,
    Unpause,
    GetIdentityInfo { key: Principal },
    GetIdentityCredentials { subject: Principal },
    GetCredentialRevocation { id: CredentialId },
    VerifyCredential { id: CredentialId, hash: Hash32 },
    GetList { list_id: ListId },
    GetSystemMetrics,
}

impl Step {
    fn caller(&self) -> Result<&Principal> {
        match &self.caller {
            Some(caller) => Ok(caller),
            None => bail!("{} requires a caller", self.action.name()),
        }
    }
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateIdentity { .. } => "create_identity",
            Self::UpdateDocument { .. } => "update_document",
            Self::SetKycStatus { .. } => "set_kyc_status",
            Self::IssueCredential { .. } => "issue_credential",
            Self::RevokeCredential { .. } => "revoke_credential",
            Self::RestoreCredential { .. } => "restore_credential",
            Self::CreateList { .. } => "create_list",
            Self::Publish { .. } => "publish",
            Self::TransferListController { .. } => "transfer_list_controller",
            Self::GrantRole { .. } => "grant_role",
            Self::RevokeRole { .. } => "revoke_role",
            Self::RenounceRole { .. } => "renounce_role",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
            Self::GetIdentityInfo { .. } => "get_identity_info",
            Self::GetIdentityCredentials { .. } => "get_identity_credentials",
            Self::GetCredentialRevocation { .. } => "get_credential_revocation",
            Self::VerifyCredential { .. } => "verify_credential",
            Self::GetList { .. } => "get_list",
            Self::GetSystemMetrics => "get_system_metrics",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Ok,
    Err { code: String, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub op: &'static str,
    pub outcome: StepOutcome,
    pub expected: Option<String>,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub steps: Vec<StepReport>,
    pub metrics: SystemMetrics,
    pub reconciliation: Reconciliation,
    pub audit_records: usize,
    pub chain_verified: bool,
}

impl ReplayReport {
    pub fn mismatches(&self) -> usize {
        self.steps.iter().filter(|s| !s.matched).count()
    }

    pub fn passed(&self) -> bool {
        self.mismatches() == 0 && self.reconciliation.is_consistent() && self.chain_verified
    }
}

/// Execute the replay subcommand.
pub fn run_replay(args: &ReplayArgs, base: &RegistryConfig) -> Result<u8> {
    let script = load_script(&args.script)?;
    let (registry, report) = replay(&script, base)?;

    if let Some(path) = &args.audit_out {
        write_audit(&registry, path)?;
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serializing report")?
        );
    } else {
        print_report(&report);
    }

    if report.passed() {
        Ok(0)
    } else {
        tracing::warn!(mismatches = report.mismatches(), "replay did not pass");
        Ok(2)
    }
}

pub fn load_script(path: &Path) -> Result<Script> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading script {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parsing script {}", path.display()))
}

/// Run every step of `script` against a new registry.
///
/// Registry errors are outcomes, not failures of the replay. Only malformed
/// steps and configuration problems return `Err`.
pub fn replay(script: &Script, base: &RegistryConfig) -> Result<(Registry, ReplayReport)> {
    let config = script.config.as_ref().unwrap_or(base);
    let registry = Registry::from_config(config).context("building registry")?;
    tracing::info!(steps = script.steps.len(), admin = %config.admin, "replaying script");

    let mut steps = Vec::with_capacity(script.steps.len());
    for (index, step) in script.steps.iter().enumerate() {
        let result = execute(&registry, step).with_context(|| format!("step {index}"))?;
        let (outcome, output) = match result {
            Ok(value) => (StepOutcome::Ok, Some(value)),
            Err(e) => (
                StepOutcome::Err {
                    code: e.code().to_string(),
                    message: e.to_string(),
                },
                None,
            ),
        };
        let matched = match (&outcome, &step.expect) {
            (StepOutcome::Ok, None) => true,
            (StepOutcome::Err { code, .. }, Some(want)) => code == want,
            _ => false,
        };
        tracing::debug!(index, op = step.action.name(), matched, "step done");
        steps.push(StepReport {
            index,
            op: step.action.name(),
            outcome,
            expected: step.expect.clone(),
            matched,
            output,
        });
    }

    let (audit_records, chain_verified) = match registry.audit_trail() {
        Some(trail) => (trail.len(), trail.verify_chain().is_ok()),
        None => (0, true),
    };
    let report = ReplayReport {
        steps,
        metrics: registry.get_system_metrics(),
        reconciliation: registry.reconcile(),
        audit_records,
        chain_verified,
    };
    Ok((registry, report))
}

fn execute(registry: &Registry, step: &Step) -> Result<Result<Value, RegistryError>> {
    match &step.action {
        Action::CreateIdentity { key, document } => {
            to_value(registry.create_identity(step.caller()?, key, document.as_str()))
        }
        Action::UpdateDocument { key, document } => {
            to_value(registry.update_document(step.caller()?, key, document.as_str()))
        }
        Action::SetKycStatus { key, verified } => {
            to_value(registry.set_kyc_status(step.caller()?, key, *verified))
        }
        Action::IssueCredential { id, subject, hash } => {
            to_value(registry.issue_credential(step.caller()?, id, subject, *hash))
        }
        Action::RevokeCredential {
            id,
            subject,
            reason,
        } => to_value(registry.revoke_credential(step.caller()?, id, subject, reason.as_str())),
        Action::RestoreCredential {
            id,
            subject,
            reason,
        } => to_value(registry.restore_credential(step.caller()?, id, subject, reason.as_str())),
        Action::CreateList {
            list_id,
            uri,
            hash,
            size,
            purpose,
        } => to_value(registry.create_list(step.caller()?, list_id, uri.as_str(), *hash, *size, *purpose)),
        Action::Publish {
            list_id,
            version,
            uri,
            hash,
        } => to_value(registry.publish(step.caller()?, list_id, *version, uri.as_str(), *hash)),
        Action::TransferListController {
            list_id,
            new_controller,
        } => to_value(registry.transfer_list_controller(step.caller()?, list_id, new_controller)),
        Action::GrantRole { role, account } => {
            to_value(registry.grant_role(step.caller()?, *role, account))
        }
        Action::RevokeRole { role, account } => {
            to_value(registry.revoke_role(step.caller()?, *role, account))
        }
        Action::RenounceRole { role } => to_value(registry.renounce_role(step.caller()?, *role)),
        Action::Pause => to_value(registry.pause(step.caller()?)),
        Action::Unpause => to_value(registry.unpause(step.caller()?)),
        Action::GetIdentityInfo { key } => to_value(registry.get_identity_info(key)),
        Action::GetIdentityCredentials { subject } => {
            to_value(Ok(registry.get_identity_credentials(subject)))
        }
        Action::GetCredentialRevocation { id } => {
            to_value(registry.get_credential_revocation(id))
        }
        Action::VerifyCredential { id, hash } => to_value(Ok(registry.verify_credential(id, hash))),
        Action::GetList { list_id } => to_value(registry.get_list(list_id)),
        Action::GetSystemMetrics => to_value(Ok(registry.get_system_metrics())),
    }
}

fn to_value<T: Serialize>(result: Result<T, RegistryError>) -> Result<Result<Value, RegistryError>> {
    match result {
        Ok(value) => Ok(Ok(serde_json::to_value(value).context("serializing step output")?)),
        Err(e) => Ok(Err(e)),
    }
}

fn write_audit(registry: &Registry, path: &Path) -> Result<()> {
    let records = registry
        .audit_trail()
        .map(|trail| trail.records())
        .unwrap_or_default();
    let json = serde_json::to_string_pretty(&records).context("serializing audit records")?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), records = records.len(), "audit records written");
    Ok(())
}

fn print_report(report: &ReplayReport) {
    for step in &report.steps {
        let status = if step.matched { "OK  " } else { "FAIL" };
        let detail = match (&step.outcome, &step.expected) {
            (StepOutcome::Ok, None) => String::new(),
            (StepOutcome::Ok, Some(want)) => format!(": expected {want}, got success"),
            (StepOutcome::Err { code, .. }, Some(want)) if code == want => {
                format!(" -> {code} (expected)")
            }
            (StepOutcome::Err { code, message }, _) => format!(": {code}: {message}"),
        };
        println!("{status} [{}] {}{detail}", step.index, step.op);
    }

    let m = &report.metrics;
    println!(
        "Metrics: identities={} verified={} credentials={} revoked={} operations={}",
        m.total_identities,
        m.total_verified_identities,
        m.total_credentials,
        m.total_revoked_credentials,
        m.total_operations
    );
    if report.reconciliation.is_consistent() {
        println!("Reconciliation: consistent");
    } else {
        println!("Reconciliation: {} discrepancies", report.reconciliation.discrepancies.len());
        for d in &report.reconciliation.discrepancies {
            println!("  - {d}");
        }
    }
    println!(
        "Audit: {} records, chain {}",
        report.audit_records,
        if report.chain_verified { "verified" } else { "BROKEN" }
    );
    println!(
        "{} steps, {} mismatches",
        report.steps.len(),
        report.mismatches()
    );
}
