//! Bootstrap step definitions
//!
//! Each step implements the [`Step`] trait and renders to idempotent bash.

mod command;
mod dpkg;
mod file;
mod package;
mod verify;

pub use command::RunCommand;
pub use dpkg::{RepairPackageManager, WaitForPackageLocks, package_manager_busy_check};
pub use file::WriteFile;
pub use package::{InstallPackages, SigningKey};
pub use verify::VerifyAnyBinary;

/// A single bootstrap step
///
/// All steps must be:
/// - **Idempotent**: Safe to run multiple times
/// - **Describable**: Have a human-readable description
/// - **Renderable**: Can output bash commands
pub trait Step: Send + Sync {
    /// Human-readable description of what this step does
    fn description(&self) -> &str;

    /// Render as idempotent bash commands
    fn to_bash(&self) -> Vec<String>;

    /// Check command to determine if step is already satisfied.
    ///
    /// If `Some(cmd)` is returned and the command succeeds (exit 0),
    /// the step will be skipped. If `None`, the step always runs.
    fn check_command(&self) -> Option<String>;
}

/// Quote a value for safe use inside single-quoted shell words
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}
