//! Post-install verification steps

use super::Step;

/// Fail unless at least one of the given binaries resolves on `PATH`
#[derive(Debug, Clone)]
pub struct VerifyAnyBinary {
    pub binaries: Vec<String>,
    description: String,
}

impl VerifyAnyBinary {
    pub fn new(binaries: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let binaries: Vec<String> = binaries.into_iter().map(Into::into).collect();
        let description = format!("Verify one of {} is installed", binaries.join(", "));
        Self {
            binaries,
            description,
        }
    }

    fn any_resolves(&self) -> String {
        self.binaries
            .iter()
            .map(|b| format!("command -v {b} >/dev/null 2>&1"))
            .collect::<Vec<_>>()
            .join(" || ")
    }
}

impl Step for VerifyAnyBinary {
    fn description(&self) -> &str {
        &self.description
    }

    fn to_bash(&self) -> Vec<String> {
        // Only reached when the check failed: none of the binaries exist.
        vec![format!(
            "echo 'none of [{}] found on PATH after install' >&2; exit 1",
            self.binaries.join(" ")
        )]
    }

    fn check_command(&self) -> Option<String> {
        if self.binaries.is_empty() {
            return None;
        }
        Some(self.any_resolves())
    }
}
