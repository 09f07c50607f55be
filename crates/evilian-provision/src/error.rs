//! Error taxonomy for a provisioning run

use std::fmt;

use thiserror::Error;

/// Why operator input was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Range is not a dotted quad with an optional `/0`..`/32` suffix
    #[error("invalid network range '{0}': expected a dotted-quad IPv4 address with an optional /0-/32 prefix")]
    InvalidRange(String),
    /// Project name is empty or contains characters outside letters, digits and hyphens
    #[error("invalid project name '{0}': only letters, digits and hyphens are allowed")]
    InvalidName(String),
}

/// A failed call against the cloud control plane
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("control plane error [{code}]: {message}")]
pub struct ControlPlaneError {
    /// Provider error code, or the CLI exit code when none is reported
    pub code: String,
    /// Human-readable message from the provider
    pub message: String,
}

impl ControlPlaneError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Whether an exhausted wait aborts the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Gates correctness: the run aborts
    Hard,
    /// Advisory: logged, the run continues
    Soft,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hard => f.write_str("hard"),
            Self::Soft => f.write_str("soft"),
        }
    }
}

/// Errors that abort a provisioning run
///
/// Variants raised after the VM exists carry the resource group and VM name so
/// the operator can inspect what was left behind. Nothing is ever deleted
/// automatically.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(
        "resource group '{resource_group}' already exists; choose a different project name or delete it first"
    )]
    Precondition { resource_group: String },

    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    #[error("timed out waiting for {what} after {attempts} attempts ({severity}) in {resource_group}/{vm_name}")]
    ConvergenceTimeout {
        what: String,
        attempts: u32,
        severity: Severity,
        resource_group: String,
        vm_name: String,
    },

    #[error("bootstrap script failed during {phase} on {resource_group}/{vm_name} (exit status {exit_status})")]
    RemoteScriptFailure {
        phase: String,
        exit_status: i32,
        output: String,
        resource_group: String,
        vm_name: String,
    },
}

impl ProvisionError {
    /// Attach resource identifiers to a control-plane failure raised after creation
    pub fn in_resources(self, resource_group: &str, vm_name: &str) -> Self {
        match self {
            Self::ControlPlane(err) => Self::ControlPlane(ControlPlaneError {
                code: err.code,
                message: format!("{} (resource group {resource_group}, vm {vm_name})", err.message),
            }),
            other => other,
        }
    }
}

pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;
