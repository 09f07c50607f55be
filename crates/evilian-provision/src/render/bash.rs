//! Bash script renderer

use std::convert::Infallible;
use std::fmt::Write as _;

use crate::BootstrapScript;
use crate::steps::shell_quote;

use super::Renderer;

/// Prefix of the progress lines emitted by verbose scripts
///
/// Format: `EVILIAN_STEP:ACTION:step_num:description`, where ACTION is one of
/// `START`, `DONE`, `SKIP`, `FAIL`, or `COMPLETE` (with the step count).
pub const STEP_MARKER: &str = "EVILIAN_STEP";

/// Renders a bootstrap script as a single `set -euo pipefail` bash script
///
/// Each step is wrapped in its check command: when the check succeeds the
/// step is skipped, which is what makes re-runs cheap and safe.
#[derive(Debug, Clone, Default)]
pub struct BashRenderer {
    verbose: bool,
}

impl BashRenderer {
    /// Create a new bash renderer
    pub fn new() -> Self {
        Self { verbose: false }
    }

    /// Emit progress markers around every step
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn marker(&self, out: &mut String, action: &str, indent: &str) {
        if self.verbose {
            let _ = writeln!(
                out,
                "{indent}echo \"{STEP_MARKER}:{action}:${{STEP_NUM}}:${{STEP_DESC}}\""
            );
        }
    }
}

impl Renderer for BashRenderer {
    type Output = String;
    type Error = Infallible;

    fn render(&self, script: &BootstrapScript) -> Result<String, Self::Error> {
        let mut out = String::new();
        let total = script.steps.len();

        let _ = writeln!(out, "#!/usr/bin/env bash");
        let _ = writeln!(out, "# evilian bootstrap script v{}", script.version);
        let _ = writeln!(out, "set -euo pipefail");
        let _ = writeln!(out, "export DEBIAN_FRONTEND=noninteractive");
        let _ = writeln!(out, "STEP_NUM=0");
        let _ = writeln!(out, "STEP_DESC=''");
        if self.verbose {
            let _ = writeln!(
                out,
                "trap 'rc=$?; if [ \"$rc\" -ne 0 ]; then echo \"{STEP_MARKER}:FAIL:${{STEP_NUM}}:${{STEP_DESC}}\"; fi' EXIT"
            );
        }

        for (idx, step) in script.steps.iter().enumerate() {
            let num = idx + 1;
            let _ = writeln!(out);
            let _ = writeln!(out, "# Step {num}/{total}: {}", step.description());
            let _ = writeln!(out, "STEP_NUM={num}");
            let _ = writeln!(out, "STEP_DESC={}", shell_quote(step.description()));

            let commands = step.to_bash();
            if let Some(check) = step.check_command() {
                let _ = writeln!(out, "if {check}; then");
                self.marker(&mut out, "SKIP", "    ");
                let _ = writeln!(out, "else");
                self.marker(&mut out, "START", "    ");
                for cmd in &commands {
                    // Multi-line commands may carry heredocs, which must not be indented.
                    if cmd.contains('\n') {
                        let _ = writeln!(out, "{cmd}");
                    } else {
                        let _ = writeln!(out, "    {cmd}");
                    }
                }
                self.marker(&mut out, "DONE", "    ");
                let _ = writeln!(out, "fi");
            } else {
                self.marker(&mut out, "START", "");
                for cmd in &commands {
                    let _ = writeln!(out, "{cmd}");
                }
                self.marker(&mut out, "DONE", "");
            }
        }

        let _ = writeln!(out);
        if self.verbose {
            let _ = writeln!(out, "echo \"{STEP_MARKER}:COMPLETE:{total}\"");
        }
        Ok(out)
    }
}
