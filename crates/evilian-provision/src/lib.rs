//! Evilian Provision - Pentest VM Provisioning Library
//!
//! This crate holds everything a provisioning run needs that is not a
//! terminal or a cloud CLI: input validation, resource naming, firewall rule
//! sets, credential generation, convergence polling, the idempotent bootstrap
//! script, and the orchestrator that sequences them.
//!
//! # Architecture
//!
//! - [`request`]: operator input and its validation
//! - [`naming`] and [`network`]: pure derivations from a validated request
//! - [`ControlPlane`]: port to the cloud; the CLI implements it on top of `az`
//! - [`poll`]: bounded query-sleep-repeat loop used by every wait point
//! - [`Step`], [`steps`], [`BootstrapScript`]: guarded bootstrap steps
//! - [`render`]: turns a [`BootstrapScript`] into a bash script
//! - [`Orchestrator`]: the run state machine
//!
//! # Example
//!
//! ```ignore
//! use evilian_provision::{KeepAll, Orchestrator, RawRequest};
//!
//! let raw = RawRequest {
//!     range: "203.0.113.5/32".into(),
//!     project_name: "lab".into(),
//!     ..RawRequest::default()
//! };
//! let vm = Orchestrator::new(&cloud, &reporter, &KeepAll).run(&raw)?;
//! println!("{}@{}", vm.credential.username, vm.public_ip);
//! ```

pub mod config;
pub mod control_plane;
pub mod credential;
pub mod error;
pub mod executor;
pub mod naming;
pub mod network;
pub mod orchestrator;
pub mod poll;
pub mod render;
pub mod request;
pub mod script;
pub mod steps;

pub use config::BootstrapConfig;
pub use control_plane::{ControlPlane, RemoteOutput, VmSpec};
pub use credential::VmCredential;
pub use error::{ControlPlaneError, ProvisionError, Severity, ValidationError};
pub use executor::{ExecutionResult, ProgressMarker, RemoteBootstrapExecutor, parse_progress_marker};
pub use naming::ResourceNameSet;
pub use network::FirewallRule;
pub use orchestrator::{
    CleanupPrompt, KeepAll, Orchestrator, ProgressReporter, ProvisionedVm, RunPlan, RunState,
    WaitPlan,
};
pub use render::{BashRenderer, Renderer};
pub use request::{ProvisioningRequest, RawRequest};
pub use script::BootstrapScript;
pub use steps::Step;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{
        InstallPackages, RepairPackageManager, RunCommand, SigningKey, VerifyAnyBinary,
        WaitForPackageLocks, WriteFile,
    };

    fn render(verbose: bool) -> String {
        let script = BootstrapScript::rolling_conversion(&BootstrapConfig::default());
        let Ok(text) = BashRenderer::new().verbose(verbose).render(&script);
        text
    }

    #[test]
    fn test_install_packages_checks_dpkg_state() {
        let step = InstallPackages::new(["curl", "gnupg"]);
        let bash = step.to_bash();
        let check = step.check_command().unwrap();

        assert!(bash[0].contains("install -y"));
        assert!(bash[0].contains("curl gnupg"));
        assert!(check.contains("dpkg-query"));
        assert!(check.contains("install ok installed"));
    }

    #[test]
    fn test_signing_key_is_atomic() {
        let step = SigningKey::kali();
        let bash = step.to_bash();

        assert!(bash[0].contains("gpg --dearmor"));
        assert!(bash[0].contains(".gpg.tmp && mv -f"));
        assert_eq!(
            step.check_command(),
            Some("[ -s /usr/share/keyrings/kali-archive-keyring.gpg ]".into())
        );
    }

    #[test]
    fn test_write_file_uses_checksum() {
        let step = WriteFile::new("/etc/apt/sources.list", "deb http://example/ rolling main")
            .with_permissions("0644");

        let bash = step.to_bash();
        let check = step.check_command().unwrap();

        assert!(bash.iter().any(|c| c.contains("EVILIAN_EOF")));
        assert!(check.contains("sha256sum"));
        assert!(check.contains(&step.content_hash()));
    }

    #[test]
    fn test_run_command_with_unless() {
        let step = RunCommand::new("Create directory", "mkdir /test").unless("[ -d /test ]");

        assert_eq!(step.to_bash(), vec!["mkdir /test".to_string()]);
        assert_eq!(step.check_command(), Some("[ -d /test ]".into()));
    }

    #[test]
    fn test_repair_and_lock_wait_are_guarded() {
        let repair = RepairPackageManager::new();
        assert!(repair.to_bash().iter().any(|c| c.contains("dpkg --configure -a")));
        assert!(repair.check_command().unwrap().contains("dpkg --audit"));

        let wait = WaitForPackageLocks::new(10, 60);
        let bash = wait.to_bash().join("\n");
        assert!(bash.contains("sleep 10"));
        assert!(bash.contains("60"));
        assert!(bash.contains("exit 1"));
    }

    #[test]
    fn test_verify_fails_when_nothing_resolves() {
        let step = VerifyAnyBinary::new(["msfconsole", "nmap"]);
        let check = step.check_command().unwrap();

        assert!(check.contains("command -v msfconsole"));
        assert!(check.contains("|| command -v nmap"));
        assert!(step.to_bash().join("\n").contains("exit 1"));
    }

    #[test]
    fn test_rolling_conversion_step_order() {
        let script = BootstrapScript::rolling_conversion(&BootstrapConfig::default());
        let descriptions = script.descriptions();

        assert_eq!(descriptions.len(), 9);
        let position = |needle: &str| {
            descriptions
                .iter()
                .position(|d| d.contains(needle))
                .unwrap_or_else(|| panic!("no step matching '{needle}' in {descriptions:?}"))
        };

        assert!(position("key fetch toolchain") < position("signing key"));
        assert!(position("signing key") < position("Replace package sources"));
        assert!(position("Back up and disable") < position("Replace package sources"));
        assert!(position("Replace package sources") < position("Refresh package index"));
        assert!(position("Refresh package index") < position("kali-linux-headless"));
        assert_eq!(position("Verify"), descriptions.len() - 1);
    }

    #[test]
    fn test_every_state_changing_step_is_guarded() {
        let script = BootstrapScript::rolling_conversion(&BootstrapConfig::default());
        let unguarded: Vec<&str> = script
            .steps
            .iter()
            .filter(|s| s.check_command().is_none())
            .map(|s| s.description())
            .collect();

        // Index refresh is cheap and always safe to repeat
        assert_eq!(unguarded, vec!["Refresh package index"]);
    }

    #[test]
    fn test_sources_point_at_rolling_repo() {
        let config = BootstrapConfig::default();
        let sources = config.sources_list();

        assert!(sources.contains("kali-rolling"));
        assert!(sources.contains(&config.keyring_path));
        assert!(render(false).contains(sources.trim_end()));
    }

    #[test]
    fn test_bash_renderer_verbose() {
        let script = render(true);

        assert!(script.starts_with("#!/usr/bin/env bash"));
        assert!(script.contains("set -euo pipefail"));
        assert!(script.contains("EVILIAN_STEP:START"));
        assert!(script.contains("EVILIAN_STEP:DONE"));
        assert!(script.contains("EVILIAN_STEP:SKIP"));
        assert!(script.contains("EVILIAN_STEP:FAIL"));
        assert!(script.contains("EVILIAN_STEP:COMPLETE:9"));
    }

    #[test]
    fn test_bash_renderer_quiet() {
        let script = render(false);

        assert!(script.contains("set -euo pipefail"));
        assert!(!script.contains("EVILIAN_STEP"));
        assert_eq!(script.matches("STEP_NUM=").count(), 10);
    }

    #[test]
    fn test_heredoc_terminator_is_not_indented() {
        let script = render(false);
        assert!(script.lines().any(|l| l == "EVILIAN_EOF"));
    }

    #[test]
    fn test_custom_toolset_flows_into_script() {
        let config = BootstrapConfig::builder()
            .toolset(["nmap", "sqlmap"])
            .verify_binaries(["sqlmap"])
            .build();
        let script = BootstrapScript::rolling_conversion(&config);
        let Ok(text) = BashRenderer::new().render(&script);

        assert!(text.contains("nmap sqlmap"));
        assert!(text.contains("command -v sqlmap"));
        assert!(!text.contains("kali-linux-headless"));
    }
}
