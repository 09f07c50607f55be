//! Terminal progress output and prompts

use std::cell::RefCell;
use std::time::Duration;

use comfy_table::{Cell, Color, Table, presets::UTF8_FULL_CONDENSED};
use console::{Emoji, style};
use dialoguer::MultiSelect;
use evilian_provision::{
    CleanupPrompt, ExecutionResult, ProgressMarker, ProgressReporter, RunState,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
static LOOKING_GLASS: Emoji<'_, '_> = Emoji("🔍 ", "");
static REPEAT: Emoji<'_, '_> = Emoji("🔁 ", "");

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Spinner-per-step console reporter
///
/// `step` starts a spinner, `success` and `warn` finish it.
#[derive(Default)]
pub struct ConsoleProgress {
    current: RefCell<Option<ProgressBar>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn finish_with(&self, line: String) {
        match self.current.borrow_mut().take() {
            Some(spinner) => spinner.finish_with_message(line),
            None => println!("{line}"),
        }
    }

    /// Clear whatever spinner is still running
    pub fn finish(&self) {
        if let Some(spinner) = self.current.borrow_mut().take() {
            spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for ConsoleProgress {
    fn state(&self, state: RunState) {
        let header = match state {
            RunState::PreflightCheck => format!("{LOOKING_GLASS}Pre-flight check"),
            RunState::GroupCreated => format!("{GEAR}Network"),
            RunState::VmCreated => format!("{ROCKET}Waiting for the VM"),
            RunState::Bootstrapping => format!("{GEAR}Bootstrap"),
            RunState::Rebooting => format!("{REPEAT}Reboot and retry"),
            _ => return,
        };
        self.finish();
        println!("\n{} {header}\n", style("▸").blue().bold());
    }

    fn step(&self, message: &str) {
        let previous = self.current.replace(Some(spinner(message.to_string())));
        if let Some(previous) = previous {
            previous.finish_and_clear();
        }
    }

    fn success(&self, message: &str) {
        self.finish_with(format!("{} {message}", style("✓").green()));
    }

    fn warn(&self, message: &str) {
        self.finish_with(format!("{} {message}", style("!").yellow()));
    }

    fn bootstrap_output(&self, phase: &str, result: &ExecutionResult) {
        let markers = result.markers();
        let total = markers
            .iter()
            .find_map(|m| match m {
                ProgressMarker::Complete { total } => Some(*total),
                _ => None,
            })
            .or_else(|| {
                markers
                    .iter()
                    .filter_map(|m| match m {
                        ProgressMarker::Start { step, .. }
                        | ProgressMarker::Done { step, .. }
                        | ProgressMarker::Skip { step, .. }
                        | ProgressMarker::Fail { step, .. } => Some(*step),
                        ProgressMarker::Complete { .. } => None,
                    })
                    .max()
            })
            .unwrap_or(0);

        // Spinner of the running script
        self.finish();
        println!("  {}", style(phase).dim());
        for marker in markers {
            match marker {
                ProgressMarker::Done { step, desc } => {
                    println!("  [{step}/{total}] {} {desc}", style("v").green());
                }
                ProgressMarker::Skip { step, desc } => {
                    println!(
                        "  [{step}/{total}] {} {desc} {}",
                        style("o").yellow(),
                        style("(skipped)").dim()
                    );
                }
                ProgressMarker::Fail { step, desc } => {
                    println!("  [{step}/{total}] {} {desc}", style("x").red());
                }
                ProgressMarker::Start { .. } | ProgressMarker::Complete { .. } => {}
            }
        }
    }
}

/// Lets the operator pick leftover resource groups to delete
///
/// Non-interactive pickers keep everything.
pub struct CleanupPicker {
    interactive: bool,
}

impl CleanupPicker {
    pub fn new(interactive: bool) -> Self {
        Self { interactive }
    }
}

impl CleanupPrompt for CleanupPicker {
    fn select_for_deletion(&self, groups: &[String]) -> Vec<String> {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec![
            Cell::new("#").fg(Color::Cyan),
            Cell::new("Resource group").fg(Color::Cyan),
        ]);
        for (idx, group) in groups.iter().enumerate() {
            table.add_row(vec![Cell::new(idx + 1), Cell::new(group)]);
        }
        println!("{table}");

        if !self.interactive {
            println!(
                "  {} keeping them (non-interactive)",
                style("->").dim()
            );
            return Vec::new();
        }

        let picked = MultiSelect::new()
            .with_prompt("Delete which of these? (space to select, enter to confirm)")
            .items(groups)
            .interact();

        match picked {
            Ok(indices) => indices.into_iter().map(|i| groups[i].clone()).collect(),
            Err(err) => {
                warn!(error = %err, "cleanup prompt failed, keeping all groups");
                Vec::new()
            }
        }
    }
}
