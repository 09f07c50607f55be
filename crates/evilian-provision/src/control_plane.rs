//! Control-plane port
//!
//! The orchestrator only talks to the cloud through [`ControlPlane`]. The CLI
//! ships an implementation backed by the `az` command; tests use stubs.

use crate::error::ControlPlaneError;
use crate::network::FirewallRule;

/// Parameters for VM creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmSpec {
    pub resource_group: String,
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    pub nsg_name: String,
    pub admin_username: String,
    pub admin_password: String,
}

/// Output of a script run through the VM's command channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOutput {
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RemoteOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

pub type CpResult<T> = Result<T, ControlPlaneError>;

/// Synchronous cloud control-plane operations
///
/// Every call either completes or fails with a [`ControlPlaneError`]. There is
/// no retry at this layer.
pub trait ControlPlane {
    fn group_exists(&self, name: &str) -> CpResult<bool>;

    /// Names of resource groups carrying the tag `key=value`
    fn list_tagged_groups(&self, tag_key: &str, tag_value: &str) -> CpResult<Vec<String>>;

    /// Delete a resource group; with `no_wait` the call returns before deletion finishes
    fn delete_group(&self, name: &str, no_wait: bool) -> CpResult<()>;

    fn create_group(&self, name: &str, region: &str, tags: &[(String, String)]) -> CpResult<()>;

    fn create_nsg(&self, name: &str, group: &str, region: &str) -> CpResult<()>;

    fn create_rule(&self, group: &str, nsg: &str, rule: &FirewallRule) -> CpResult<()>;

    /// Create the VM and return its public IP
    fn create_vm(&self, spec: &VmSpec) -> CpResult<String>;

    /// Display power state, e.g. `VM running`
    fn get_power_state(&self, group: &str, vm: &str) -> CpResult<String>;

    /// Guest agent display status, e.g. `Ready`
    fn get_agent_status(&self, group: &str, vm: &str) -> CpResult<String>;

    fn restart_vm(&self, group: &str, vm: &str) -> CpResult<()>;

    fn get_public_ip(&self, group: &str, vm: &str) -> CpResult<String>;

    /// Run a shell script inside the VM and wait for it to finish
    fn run_remote_script(&self, group: &str, vm: &str, script: &str) -> CpResult<RemoteOutput>;
}
