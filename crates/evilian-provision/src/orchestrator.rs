//! Provisioning run orchestration
//!
//! A run is strictly sequential: every remote effect is observed through
//! polling before the next step starts. Nothing is ever deleted on failure;
//! whatever exists when a run aborts is left for the operator to inspect.

use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::BootstrapConfig;
use crate::control_plane::{ControlPlane, VmSpec};
use crate::credential::VmCredential;
use crate::error::{ProvisionError, Result, Severity};
use crate::executor::{ExecutionResult, RemoteBootstrapExecutor};
use crate::naming::{CREATED_BY_TAG, ResourceNameSet, group_tags};
use crate::network::{FirewallRule, default_rules};
use crate::poll::{Attempts, PollCondition, PollOutcome, poll};
use crate::request::{ProvisioningRequest, RawRequest};
use crate::script::BootstrapScript;
use crate::steps::package_manager_busy_check;

/// Power state reported once the VM is up
pub const POWER_RUNNING: &str = "VM running";
/// Guest agent status once it accepts commands
pub const AGENT_READY: &str = "Ready";

const IDLE: &str = "idle";

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Validating,
    PreflightCheck,
    GroupCreated,
    NetworkConfigured,
    VmCreated,
    WaitingRunning(u8),
    WaitingAgent(u8),
    WaitingPkgIdle,
    Bootstrapping,
    Settling,
    Rebooting,
    ReinstallRetry,
    Reporting,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validating => f.write_str("validating input"),
            Self::PreflightCheck => f.write_str("pre-flight check"),
            Self::GroupCreated => f.write_str("resource group created"),
            Self::NetworkConfigured => f.write_str("network configured"),
            Self::VmCreated => f.write_str("vm created"),
            Self::WaitingRunning(pass) => write!(f, "waiting for running state (pass {pass})"),
            Self::WaitingAgent(pass) => write!(f, "waiting for guest agent (pass {pass})"),
            Self::WaitingPkgIdle => f.write_str("waiting for package manager"),
            Self::Bootstrapping => f.write_str("bootstrapping"),
            Self::Settling => f.write_str("settling"),
            Self::Rebooting => f.write_str("rebooting"),
            Self::ReinstallRetry => f.write_str("re-running install"),
            Self::Reporting => f.write_str("reporting"),
            Self::Done => f.write_str("done"),
        }
    }
}

/// Progress events emitted during a run
///
/// Sync trait so the library stays free of any UI dependency.
pub trait ProgressReporter {
    /// A run-state transition
    fn state(&self, state: RunState);
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
    /// Show a finished bootstrap run
    fn bootstrap_output(&self, phase: &str, result: &ExecutionResult) {
        let _ = (phase, result);
    }
}

/// Decides which leftover resource groups from earlier runs to delete
pub trait CleanupPrompt {
    /// Return the subset of `groups` to delete; empty keeps them all
    fn select_for_deletion(&self, groups: &[String]) -> Vec<String>;
}

/// Never deletes anything
pub struct KeepAll;

impl CleanupPrompt for KeepAll {
    fn select_for_deletion(&self, _groups: &[String]) -> Vec<String> {
        Vec::new()
    }
}

/// Interval and attempt bound of every wait point
#[derive(Debug, Clone)]
pub struct WaitPlan {
    pub power_state: PollCondition,
    pub agent_ready: PollCondition,
    pub package_idle: PollCondition,
    /// Fixed pause between the first bootstrap and the reboot
    pub settle: Duration,
}

impl Default for WaitPlan {
    fn default() -> Self {
        let interval = Duration::from_secs(10);
        Self {
            power_state: PollCondition::new(
                "VM running state",
                interval,
                Attempts::Unbounded { warn_every: 30 },
            ),
            agent_ready: PollCondition::new("guest agent", interval, Attempts::Limited(60)),
            package_idle: PollCondition::new(
                "package manager to go idle",
                interval,
                Attempts::Limited(30),
            ),
            settle: Duration::from_secs(30),
        }
    }
}

impl WaitPlan {
    /// Every wait at zero interval with the given bound; for tests
    pub fn immediate(max_attempts: u32) -> Self {
        let limited = |what: &str| {
            PollCondition::new(what, Duration::ZERO, Attempts::Limited(max_attempts))
        };
        Self {
            power_state: limited("VM running state"),
            agent_ready: limited("guest agent"),
            package_idle: limited("package manager to go idle"),
            settle: Duration::ZERO,
        }
    }
}

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct ProvisionedVm {
    pub request: ProvisioningRequest,
    pub names: ResourceNameSet,
    pub rules: Vec<FirewallRule>,
    pub credential: VmCredential,
    pub public_ip: String,
}

/// Plan of a run before anything remote happens
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub request: ProvisioningRequest,
    pub names: ResourceNameSet,
    pub rules: Vec<FirewallRule>,
}

impl RunPlan {
    /// Validate input and derive names and rules; no I/O
    pub fn prepare(raw: &RawRequest) -> Result<Self> {
        let request = ProvisioningRequest::validate(raw)?;
        let names = ResourceNameSet::derive(&request.project_name);
        let rules = default_rules(&request.allowed_range);
        Ok(Self {
            request,
            names,
            rules,
        })
    }
}

/// Drives one provisioning run against a control plane
pub struct Orchestrator<'a, C: ControlPlane, R: ProgressReporter, P: CleanupPrompt> {
    control_plane: &'a C,
    reporter: &'a R,
    prompt: &'a P,
    waits: WaitPlan,
    bootstrap: BootstrapConfig,
}

impl<'a, C: ControlPlane, R: ProgressReporter, P: CleanupPrompt> Orchestrator<'a, C, R, P> {
    pub fn new(control_plane: &'a C, reporter: &'a R, prompt: &'a P) -> Self {
        Self {
            control_plane,
            reporter,
            prompt,
            waits: WaitPlan::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }

    pub fn with_waits(mut self, waits: WaitPlan) -> Self {
        self.waits = waits;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: BootstrapConfig) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    fn enter(&self, state: RunState) {
        info!(state = %state, "run state");
        self.reporter.state(state);
    }

    /// Validate, provision, bootstrap twice around a reboot, and report
    pub fn run(&self, raw: &RawRequest) -> Result<ProvisionedVm> {
        self.enter(RunState::Validating);
        let plan = RunPlan::prepare(raw)?;

        self.enter(RunState::PreflightCheck);
        self.preflight(&plan.names)?;

        self.create_network(&plan)?;

        let credential = VmCredential::generate();
        let public_ip = self.create_vm(&plan, &credential)?;

        let group = plan.names.resource_group.clone();
        let vm_name = plan.names.vm_name.clone();
        self.converge(plan, credential, public_ip)
            .map_err(|e| e.in_resources(&group, &vm_name))
    }

    fn preflight(&self, names: &ResourceNameSet) -> Result<()> {
        let (key, value) = CREATED_BY_TAG;
        let leftovers = self.control_plane.list_tagged_groups(key, value)?;
        if !leftovers.is_empty() {
            self.reporter.warn(&format!(
                "{} resource group(s) from earlier runs: {}",
                leftovers.len(),
                leftovers.join(", ")
            ));
            for group in self.prompt.select_for_deletion(&leftovers) {
                self.reporter.step(&format!("Deleting {group} in the background..."));
                self.control_plane.delete_group(&group, true)?;
                self.reporter.success(&format!("Deletion of {group} started"));
            }
        }

        if self.control_plane.group_exists(&names.resource_group)? {
            return Err(ProvisionError::Precondition {
                resource_group: names.resource_group.clone(),
            });
        }
        Ok(())
    }

    fn create_network(&self, plan: &RunPlan) -> Result<()> {
        let names = &plan.names;
        let region = &plan.request.region;

        self.reporter
            .step(&format!("Creating resource group {}...", names.resource_group));
        self.control_plane.create_group(
            &names.resource_group,
            region,
            &group_tags(&plan.request.project_name),
        )?;
        self.reporter
            .success(&format!("Resource group {} created", names.resource_group));
        self.enter(RunState::GroupCreated);

        self.reporter
            .step(&format!("Creating security group {}...", names.nsg_name));
        self.control_plane
            .create_nsg(&names.nsg_name, &names.resource_group, region)?;
        for rule in &plan.rules {
            self.reporter.step(&format!(
                "Adding rule {} (priority {})...",
                rule.name, rule.priority
            ));
            self.control_plane
                .create_rule(&names.resource_group, &names.nsg_name, rule)?;
        }
        self.reporter.success(&format!(
            "Security group {} configured with {} rules",
            names.nsg_name,
            plan.rules.len()
        ));
        self.enter(RunState::NetworkConfigured);
        Ok(())
    }

    fn create_vm(&self, plan: &RunPlan, credential: &VmCredential) -> Result<String> {
        let names = &plan.names;
        let spec = VmSpec {
            resource_group: names.resource_group.clone(),
            name: names.vm_name.clone(),
            region: plan.request.region.clone(),
            size: plan.request.vm_size.clone(),
            image: plan.request.image_reference.clone(),
            nsg_name: names.nsg_name.clone(),
            admin_username: credential.username.clone(),
            admin_password: credential.password.clone(),
        };

        self.reporter.step(&format!(
            "Creating VM {} ({}, {})...",
            names.vm_name, spec.size, spec.image
        ));
        let ip = self.control_plane.create_vm(&spec)?;
        self.reporter.success(&format!("VM {} created", names.vm_name));
        self.enter(RunState::VmCreated);
        Ok(ip)
    }

    fn converge(
        &self,
        plan: RunPlan,
        credential: VmCredential,
        created_ip: String,
    ) -> Result<ProvisionedVm> {
        let names = &plan.names;
        let group = names.resource_group.as_str();
        let vm = names.vm_name.as_str();
        let script = BootstrapScript::rolling_conversion(&self.bootstrap);
        let executor = RemoteBootstrapExecutor::new(self.control_plane, group, vm);

        self.wait_ready(names, 1)?;

        self.enter(RunState::WaitingPkgIdle);
        self.wait_package_idle(names)?;

        self.enter(RunState::Bootstrapping);
        self.reporter.step("Converting package sources and installing toolset...");
        self.bootstrap_once(&executor, &script, "initial install", names)?;

        self.enter(RunState::Settling);
        self.reporter.step(&format!(
            "Letting the VM settle for {}s...",
            self.waits.settle.as_secs()
        ));
        thread::sleep(self.waits.settle);
        self.reporter.success("Settled");

        self.enter(RunState::Rebooting);
        self.reporter.step(&format!("Restarting {vm}..."));
        self.control_plane.restart_vm(group, vm)?;
        self.reporter.success(&format!("{vm} restarted"));

        self.wait_ready(names, 2)?;

        self.enter(RunState::ReinstallRetry);
        self.reporter.step("Re-running install after reboot...");
        self.bootstrap_once(&executor, &script, "post-reboot install", names)?;

        self.enter(RunState::Reporting);
        let public_ip = match self.control_plane.get_public_ip(group, vm)? {
            ip if ip.trim().is_empty() => created_ip,
            ip => ip.trim().to_string(),
        };

        self.enter(RunState::Done);
        Ok(ProvisionedVm {
            request: plan.request,
            names: plan.names,
            rules: plan.rules,
            credential,
            public_ip,
        })
    }

    /// One bootstrap run; a non-zero exit aborts with the VM left in place
    fn bootstrap_once(
        &self,
        executor: &RemoteBootstrapExecutor<'_, C>,
        script: &BootstrapScript,
        phase: &str,
        names: &ResourceNameSet,
    ) -> Result<()> {
        let result = executor.run(script)?;
        self.reporter.bootstrap_output(phase, &result);
        if !result.succeeded {
            warn!(phase, exit_status = result.exit_status, "bootstrap failed");
            return Err(ProvisionError::RemoteScriptFailure {
                phase: phase.to_string(),
                exit_status: result.exit_status,
                output: result.output,
                resource_group: names.resource_group.clone(),
                vm_name: names.vm_name.clone(),
            });
        }
        self.reporter.success(&format!("Bootstrap ({phase}) finished"));
        Ok(())
    }

    /// Hard waits: running power state, then guest agent
    fn wait_ready(&self, names: &ResourceNameSet, pass: u8) -> Result<()> {
        let group = names.resource_group.as_str();
        let vm = names.vm_name.as_str();

        self.enter(RunState::WaitingRunning(pass));
        self.hard_wait(names, &self.waits.power_state, POWER_RUNNING, || {
            self.control_plane.get_power_state(group, vm)
        })?;

        self.enter(RunState::WaitingAgent(pass));
        self.hard_wait(names, &self.waits.agent_ready, AGENT_READY, || {
            self.control_plane.get_agent_status(group, vm)
        })
    }

    fn hard_wait<Q>(
        &self,
        names: &ResourceNameSet,
        condition: &PollCondition,
        target: &str,
        query: Q,
    ) -> Result<()>
    where
        Q: FnMut() -> crate::control_plane::CpResult<String>,
    {
        self.reporter
            .step(&format!("Waiting for {} ('{target}')...", condition.what));
        match poll(condition, query, |status| status.trim() == target)? {
            PollOutcome::Satisfied { attempts, .. } => {
                self.reporter.success(&format!(
                    "{} reached '{target}' after {attempts} check(s)",
                    condition.what
                ));
                Ok(())
            }
            PollOutcome::Exhausted { last, attempts } => {
                self.reporter.warn(&format!(
                    "{} still '{}' after {attempts} checks",
                    condition.what,
                    last.unwrap_or_default().trim()
                ));
                Err(ProvisionError::ConvergenceTimeout {
                    what: condition.what.clone(),
                    attempts,
                    severity: Severity::Hard,
                    resource_group: names.resource_group.clone(),
                    vm_name: names.vm_name.clone(),
                })
            }
        }
    }

    /// Soft wait: the script waits on locks itself, so exhaustion only warns
    fn wait_package_idle(&self, names: &ResourceNameSet) -> Result<()> {
        let group = names.resource_group.as_str();
        let vm = names.vm_name.as_str();
        let probe = package_idle_probe();
        let condition = &self.waits.package_idle;

        self.reporter.step(&format!("Waiting for {}...", condition.what));
        let outcome = poll(
            condition,
            || {
                self.control_plane
                    .run_remote_script(group, vm, &probe)
                    .map(|out| out.stdout.trim().to_string())
            },
            |status| status == IDLE,
        )?;

        match outcome {
            PollOutcome::Satisfied { .. } => self.reporter.success("Package manager is idle"),
            PollOutcome::Exhausted { attempts, .. } => {
                warn!(attempts, severity = %Severity::Soft, "package manager still busy");
                self.reporter.warn(&format!(
                    "Package manager still busy after {attempts} checks, continuing anyway"
                ));
            }
        }
        Ok(())
    }
}

/// Script printing `idle` or `busy` depending on the package-manager locks
pub fn package_idle_probe() -> String {
    format!(
        "if {}; then echo busy; else echo {IDLE}; fi",
        package_manager_busy_check()
    )
}
