//! Azure provider
//!
//! Uses the `az` CLI. Requires:
//! ```sh
//! az login
//! ```
//! Every invocation gets `AZURE_CONFIG_DIR` set explicitly so the login
//! session is shared with other tools instead of copied per run.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use evilian_provision::control_plane::CpResult;
use evilian_provision::{ControlPlane, ControlPlaneError, FirewallRule, RemoteOutput, VmSpec};
use serde::Deserialize;
use tracing::{debug, info};

/// Trailing line the wrapped script prints with its exit status
const EXIT_MARKER: &str = "__EVILIAN_EXIT__=";
/// Where the wrapped script parks the real one inside the VM
const REMOTE_SCRIPT_PATH: &str = "/tmp/evilian-bootstrap.sh";

/// Exit status reported when the exit marker is missing from the output
const UNKNOWN_EXIT: i32 = -1;

/// Azure control plane (via az CLI)
pub struct AzureCli {
    config_dir: PathBuf,
}

impl AzureCli {
    pub fn new(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("az");
        cmd.env("AZURE_CONFIG_DIR", &self.config_dir)
            .env("AZURE_CORE_ONLY_SHOW_ERRORS", "true")
            .env("AZURE_CORE_NO_COLOR", "true");
        cmd
    }

    /// Run `az` and return trimmed stdout
    fn az(&self, args: &[&str]) -> CpResult<String> {
        debug!(args = ?args, "az");
        let output = self.command().args(args).output().map_err(|e| {
            ControlPlaneError::new(
                "AzNotRunnable",
                format!("failed to run az: {e} (is the Azure CLI installed?)"),
            )
        })?;
        check(&output)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn az_tsv(&self, args: &[&str], query: &str) -> CpResult<String> {
        let mut full = args.to_vec();
        full.extend(["--query", query, "-o", "tsv"]);
        self.az(&full)
    }
}

/// Map a failed `az` call to a control-plane error
///
/// `az` prints `Code: X` and `Message: Y` lines for service errors; anything
/// else is reported with the process exit code.
fn check(output: &Output) -> CpResult<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(parse_az_error(&stderr, output.status.code()))
}

fn parse_az_error(stderr: &str, exit_code: Option<i32>) -> ControlPlaneError {
    let field = |name: &str| {
        stderr
            .lines()
            .find_map(|l| l.trim().strip_prefix(name))
            .map(|v| v.trim().to_string())
    };

    let code = field("Code:").unwrap_or_else(|| match exit_code {
        Some(c) => format!("exit {c}"),
        None => "signal".to_string(),
    });
    let message = field("Message:").unwrap_or_else(|| {
        stderr
            .trim()
            .trim_start_matches("ERROR:")
            .trim()
            .to_string()
    });
    ControlPlaneError::new(code, message)
}

impl ControlPlane for AzureCli {
    fn group_exists(&self, name: &str) -> CpResult<bool> {
        let out = self.az(&["group", "exists", "--name", name])?;
        Ok(out == "true")
    }

    fn list_tagged_groups(&self, tag_key: &str, tag_value: &str) -> CpResult<Vec<String>> {
        let tag = format!("{tag_key}={tag_value}");
        let out = self.az_tsv(&["group", "list", "--tag", &tag], "[].name")?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    fn delete_group(&self, name: &str, no_wait: bool) -> CpResult<()> {
        let mut args = vec!["group", "delete", "--name", name, "--yes"];
        if no_wait {
            args.push("--no-wait");
        }
        info!(group = name, no_wait, "deleting resource group");
        self.az(&args).map(drop)
    }

    fn create_group(&self, name: &str, region: &str, tags: &[(String, String)]) -> CpResult<()> {
        let tags: Vec<String> = tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let mut args = vec!["group", "create", "--name", name, "--location", region, "--tags"];
        args.extend(tags.iter().map(String::as_str));
        args.extend(["-o", "none"]);
        info!(group = name, region, "creating resource group");
        self.az(&args).map(drop)
    }

    fn create_nsg(&self, name: &str, group: &str, region: &str) -> CpResult<()> {
        info!(nsg = name, group, "creating network security group");
        self.az(&[
            "network", "nsg", "create", "--resource-group", group, "--name", name, "--location",
            region, "-o", "none",
        ])
        .map(drop)
    }

    fn create_rule(&self, group: &str, nsg: &str, rule: &FirewallRule) -> CpResult<()> {
        let priority = rule.priority.to_string();
        let direction = rule.direction.to_string();
        let access = rule.access.to_string();
        let protocol = rule.protocol.to_string();

        let mut args = vec![
            "network",
            "nsg",
            "rule",
            "create",
            "--resource-group",
            group,
            "--nsg-name",
            nsg,
            "--name",
            &rule.name,
            "--priority",
            &priority,
            "--direction",
            &direction,
            "--access",
            &access,
            "--protocol",
            &protocol,
            "--source-port-ranges",
            "*",
            "--destination-address-prefixes",
            "*",
            "--source-address-prefixes",
        ];
        args.extend(rule.source_ranges.iter().map(String::as_str));
        args.push("--destination-port-ranges");
        args.extend(rule.destination_ports.iter().map(String::as_str));
        args.extend(["-o", "none"]);

        debug!(rule = %rule.name, priority = rule.priority, "creating nsg rule");
        self.az(&args).map(drop)
    }

    fn create_vm(&self, spec: &VmSpec) -> CpResult<String> {
        info!(vm = %spec.name, size = %spec.size, image = %spec.image, "creating vm");
        self.az_tsv(
            &[
                "vm",
                "create",
                "--resource-group",
                &spec.resource_group,
                "--name",
                &spec.name,
                "--location",
                &spec.region,
                "--image",
                &spec.image,
                "--size",
                &spec.size,
                "--nsg",
                &spec.nsg_name,
                "--public-ip-sku",
                "Standard",
                "--authentication-type",
                "password",
                "--admin-username",
                &spec.admin_username,
                "--admin-password",
                &spec.admin_password,
            ],
            "publicIpAddress",
        )
    }

    fn get_power_state(&self, group: &str, vm: &str) -> CpResult<String> {
        self.az_tsv(
            &["vm", "get-instance-view", "--resource-group", group, "--name", vm],
            "instanceView.statuses[?starts_with(code, 'PowerState/')].displayStatus | [0]",
        )
    }

    fn get_agent_status(&self, group: &str, vm: &str) -> CpResult<String> {
        self.az_tsv(
            &["vm", "get-instance-view", "--resource-group", group, "--name", vm],
            "instanceView.vmAgent.statuses[0].displayStatus",
        )
    }

    fn restart_vm(&self, group: &str, vm: &str) -> CpResult<()> {
        info!(vm, "restarting vm");
        self.az(&["vm", "restart", "--resource-group", group, "--name", vm])
            .map(drop)
    }

    fn get_public_ip(&self, group: &str, vm: &str) -> CpResult<String> {
        self.az_tsv(
            &["vm", "show", "--show-details", "--resource-group", group, "--name", vm],
            "publicIps",
        )
    }

    fn run_remote_script(&self, group: &str, vm: &str, script: &str) -> CpResult<RemoteOutput> {
        let spill = |e: std::io::Error| {
            ControlPlaneError::new("LocalIo", format!("failed to stage script: {e}"))
        };
        let file = tempfile::Builder::new()
            .prefix("evilian-run-")
            .suffix(".sh")
            .tempfile()
            .map_err(spill)?;
        fs::write(file.path(), wrap_script(script)).map_err(spill)?;
        let scripts_arg = format!("@{}", file.path().display());

        let out = self.az(&[
            "vm",
            "run-command",
            "invoke",
            "--resource-group",
            group,
            "--name",
            vm,
            "--command-id",
            "RunShellScript",
            "--scripts",
            &scripts_arg,
            "-o",
            "json",
        ])?;

        let parsed: RunCommandResult = serde_json::from_str(&out).map_err(|e| {
            ControlPlaneError::new("BadResponse", format!("unexpected run-command output: {e}"))
        })?;
        let message = parsed
            .value
            .into_iter()
            .find_map(|s| s.message)
            .unwrap_or_default();
        let remote = parse_run_command_message(&message);
        debug!(exit_status = remote.exit_status, "run-command finished");
        Ok(remote)
    }
}

#[derive(Debug, Deserialize)]
struct RunCommandResult {
    #[serde(default)]
    value: Vec<InstanceViewStatus>,
}

#[derive(Debug, Deserialize)]
struct InstanceViewStatus {
    message: Option<String>,
}

/// Run the script in its own shell and echo its exit status last
///
/// run-command reports no exit status, and `set -e` inside the script must
/// not take the marker line down with it.
fn wrap_script(script: &str) -> String {
    format!(
        "cat > {REMOTE_SCRIPT_PATH} << '__EVILIAN_SCRIPT__'\n\
         {script}\n\
         __EVILIAN_SCRIPT__\n\
         bash {REMOTE_SCRIPT_PATH}\n\
         rc=$?\n\
         rm -f {REMOTE_SCRIPT_PATH}\n\
         echo \"{EXIT_MARKER}$rc\"\n\
         exit 0\n"
    )
}

/// Split a run-command message into stdout, stderr and the echoed exit status
///
/// Message shape: `Enable succeeded: \n[stdout]\n...\n[stderr]\n...`.
fn parse_run_command_message(message: &str) -> RemoteOutput {
    let (stdout, stderr) = match message.split_once("[stdout]\n") {
        Some((_, rest)) => match rest.split_once("[stderr]\n") {
            Some((out, err)) => (out, err),
            None => (rest, ""),
        },
        None => match message.split_once("[stderr]\n") {
            Some((_, err)) => ("", err),
            None => (message, ""),
        },
    };

    let mut exit_status = UNKNOWN_EXIT;
    let kept: Vec<&str> = stdout
        .lines()
        .filter(|line| match line.trim().strip_prefix(EXIT_MARKER) {
            Some(code) => {
                exit_status = code.trim().parse().unwrap_or(UNKNOWN_EXIT);
                false
            }
            None => true,
        })
        .collect();

    RemoteOutput {
        exit_status,
        stdout: kept.join("\n").trim_end().to_string(),
        stderr: stderr.trim_end().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message_with_exit_marker() {
        let message = "Enable succeeded: \n[stdout]\nEVILIAN_STEP:DONE:1:Repair\nidle\n__EVILIAN_EXIT__=0\n\n[stderr]\nW: warning\n";
        let out = parse_run_command_message(message);

        assert_eq!(out.exit_status, 0);
        assert_eq!(out.stdout, "EVILIAN_STEP:DONE:1:Repair\nidle");
        assert_eq!(out.stderr, "W: warning");
        assert!(out.success());
    }

    #[test]
    fn test_parse_message_nonzero_exit() {
        let message = "Enable succeeded: \n[stdout]\nEVILIAN_STEP:FAIL:8:Verify\n__EVILIAN_EXIT__=1\n[stderr]\nnone of [msfconsole nmap] found\n";
        let out = parse_run_command_message(message);

        assert_eq!(out.exit_status, 1);
        assert!(!out.stdout.contains(EXIT_MARKER));
        assert!(out.stderr.contains("msfconsole"));
    }

    #[test]
    fn test_parse_message_without_marker_is_failure() {
        let out = parse_run_command_message("Enable succeeded: \n[stdout]\npartial\n");
        assert_eq!(out.exit_status, UNKNOWN_EXIT);
        assert!(!out.success());
    }

    #[test]
    fn test_wrap_script_reports_exit_status() {
        let wrapped = wrap_script("#!/usr/bin/env bash\nset -euo pipefail\nfalse");

        assert!(wrapped.contains("<< '__EVILIAN_SCRIPT__'\n#!/usr/bin/env bash\n"));
        assert!(wrapped.contains("\nfalse\n__EVILIAN_SCRIPT__\n"));
        assert!(wrapped.contains(&format!("echo \"{EXIT_MARKER}$rc\"")));
        assert!(wrapped.trim_end().ends_with("exit 0"));
    }

    #[test]
    fn test_parse_az_error_fields() {
        let stderr = "ERROR: (ResourceGroupNotFound) Resource group 'x' could not be found.\nCode: ResourceGroupNotFound\nMessage: Resource group 'x' could not be found.\n";
        let err = parse_az_error(stderr, Some(3));

        assert_eq!(err.code, "ResourceGroupNotFound");
        assert_eq!(err.message, "Resource group 'x' could not be found.");
    }

    #[test]
    fn test_parse_az_error_plain() {
        let err = parse_az_error("ERROR: Please run 'az login' to setup account.\n", Some(1));

        assert_eq!(err.code, "exit 1");
        assert_eq!(err.message, "Please run 'az login' to setup account.");
    }

    #[test]
    fn test_run_command_json_shape() {
        let json = r#"{"value":[{"code":"ProvisioningState/succeeded","displayStatus":"Provisioning succeeded","level":"Info","message":"Enable succeeded: \n[stdout]\nidle\n__EVILIAN_EXIT__=0\n\n[stderr]\n","time":null}]}"#;
        let parsed: RunCommandResult = serde_json::from_str(json).unwrap();
        let message = parsed.value.into_iter().find_map(|s| s.message).unwrap();
        let out = parse_run_command_message(&message);

        assert_eq!(out.stdout, "idle");
        assert_eq!(out.exit_status, 0);
    }
}
