//! Remote bootstrap execution
//!
//! Pushes a rendered [`BootstrapScript`] through the VM's command channel and
//! reports success or failure from the exit status alone. The progress
//! markers in the output are parsed for display only.

use tracing::{debug, info};

use crate::control_plane::{ControlPlane, CpResult};
use crate::render::{BashRenderer, Renderer, STEP_MARKER};
use crate::script::BootstrapScript;

/// Outcome of one bootstrap run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub succeeded: bool,
    pub exit_status: i32,
    /// Combined stdout and stderr, for display
    pub output: String,
}

impl ExecutionResult {
    /// Progress markers found in the output, in order
    pub fn markers(&self) -> Vec<ProgressMarker> {
        self.output.lines().filter_map(parse_progress_marker).collect()
    }
}

/// Runs the bootstrap script on one VM
pub struct RemoteBootstrapExecutor<'a, C: ControlPlane + ?Sized> {
    control_plane: &'a C,
    resource_group: &'a str,
    vm_name: &'a str,
}

impl<'a, C: ControlPlane + ?Sized> RemoteBootstrapExecutor<'a, C> {
    pub fn new(control_plane: &'a C, resource_group: &'a str, vm_name: &'a str) -> Self {
        Self {
            control_plane,
            resource_group,
            vm_name,
        }
    }

    /// Render and run the script; a control-plane failure is an error, a
    /// non-zero script exit is a failed result
    pub fn run(&self, script: &BootstrapScript) -> CpResult<ExecutionResult> {
        let Ok(text) = BashRenderer::new().verbose(true).render(script);
        self.run_text(&text)
    }

    /// Run already-rendered script text
    pub fn run_text(&self, text: &str) -> CpResult<ExecutionResult> {
        info!(
            resource_group = self.resource_group,
            vm = self.vm_name,
            bytes = text.len(),
            "running bootstrap script"
        );
        let remote = self
            .control_plane
            .run_remote_script(self.resource_group, self.vm_name, text)?;
        debug!(exit_status = remote.exit_status, "bootstrap script finished");

        let mut output = remote.stdout;
        if !remote.stderr.trim().is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&remote.stderr);
        }

        Ok(ExecutionResult {
            succeeded: remote.exit_status == 0,
            exit_status: remote.exit_status,
            output,
        })
    }
}

/// Progress marker types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressMarker {
    Start { step: usize, desc: String },
    Done { step: usize, desc: String },
    Skip { step: usize, desc: String },
    Fail { step: usize, desc: String },
    Complete { total: usize },
}

/// Parse a progress marker from a line
///
/// Format: `EVILIAN_STEP:ACTION:step_num:description`
pub fn parse_progress_marker(line: &str) -> Option<ProgressMarker> {
    let clean = line.trim();
    let rest = clean.strip_prefix(STEP_MARKER)?.strip_prefix(':')?;

    let parts: Vec<&str> = rest.splitn(3, ':').collect();
    if parts.len() < 2 {
        return None;
    }

    let action = parts[0];
    let step: usize = parts[1].parse().ok()?;
    let desc = parts.get(2).unwrap_or(&"").to_string();

    match action {
        "START" => Some(ProgressMarker::Start { step, desc }),
        "DONE" => Some(ProgressMarker::Done { step, desc }),
        "SKIP" => Some(ProgressMarker::Skip { step, desc }),
        "FAIL" => Some(ProgressMarker::Fail { step, desc }),
        "COMPLETE" => Some(ProgressMarker::Complete { total: step }),
        _ => None,
    }
}
