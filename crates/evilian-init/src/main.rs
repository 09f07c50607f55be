//! Evilian Init - Azure Pentest VM Provisioning
//!
//! Creates a resource group, locked-down network security group and Debian VM
//! on Azure, converts the VM to Kali rolling, installs the toolset, and hands
//! the operator a one-off login.

mod progress;
mod providers;
mod session;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use std::{env, fs};

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Cell, Color, Table, presets::UTF8_FULL_CONDENSED};
use console::{Emoji, style};
use evilian_provision::{
    BashRenderer, BootstrapConfig, BootstrapScript, Orchestrator, ProvisionError, RawRequest,
    Renderer, RunPlan, WaitPlan,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use progress::{CleanupPicker, ConsoleProgress};
use providers::AzureCli;

static LOOKING_GLASS: Emoji<'_, '_> = Emoji("🔍 ", "");
static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");

const DEFAULT_SETTLE_SECS: u64 = 30;

/// Configuration file structure
/// Path: ~/.config/evilian/init.toml (XDG-style)
#[derive(Debug, Default, Serialize, Deserialize)]
struct Config {
    #[serde(default)]
    vm: VmConfig,
    #[serde(default)]
    bootstrap: BootstrapSection,
    #[serde(default)]
    session: SessionConfig,
    #[serde(default)]
    azure: AzureConfig,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct VmConfig {
    region: Option<String>,
    size: Option<String>,
    image: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BootstrapSection {
    toolset: Option<Vec<String>>,
    /// Binaries checked after install; at least one must resolve
    verify: Option<Vec<String>>,
    settle_secs: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionConfig {
    connect: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AzureConfig {
    config_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(
    name = "evilian-init",
    version,
    about = "Provision a Kali rolling pentest VM on Azure"
)]
struct Args {
    /// Operator source range allowed on the admin port (e.g. 203.0.113.5/32)
    #[arg(required_unless_present = "show_config")]
    range: Option<String>,

    /// Project name; letters, digits and hyphens
    #[arg(required_unless_present = "show_config")]
    project_name: Option<String>,

    /// Azure region (e.g. westeurope)
    #[arg(long)]
    region: Option<String>,

    /// VM size (e.g. `Standard_B2s`)
    #[arg(long)]
    vm_size: Option<String>,

    /// Image URN
    #[arg(long)]
    image: Option<String>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print connection details only, never open a session
    #[arg(long)]
    no_connect: bool,

    /// Skip prompts; leftover resource groups are never deleted
    #[arg(short, long)]
    yes: bool,

    /// Validate and show names, rules and the bootstrap script without touching Azure
    #[arg(long)]
    dry_run: bool,

    /// Show config file path and exit
    #[arg(long)]
    show_config: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Resolved configuration (config file + CLI args + env vars merged)
struct ResolvedConfig {
    request: RawRequest,
    bootstrap: BootstrapConfig,
    settle: Duration,
    connect: bool,
    azure_config_dir: PathBuf,
}

fn config_path() -> PathBuf {
    env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("evilian")
        .join("init.toml")
}

/// Shared Azure CLI login directory, so concurrent runs reuse one session
fn default_azure_config_dir() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".azure")
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let path = path.cloned().unwrap_or_else(config_path);

    if path.exists() {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    } else {
        Ok(Config::default())
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("EVILIAN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{CROSS}{} {err:#}", style("Error:").red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    if args.show_config {
        let path = args.config.clone().unwrap_or_else(config_path);
        println!("{FOLDER} Config: {}", path.display());
        if path.exists() {
            println!("  {CHECK} exists");
        } else {
            println!("  {} not found (will use defaults)", style("!").yellow());
        }
        return Ok(());
    }

    let file_config = load_config(args.config.as_ref())?;
    let resolved = resolve_config(args, &file_config);
    let plan = RunPlan::prepare(&resolved.request)?;

    print_banner();
    print_plan_table(&plan, &resolved);
    print_rules_table(&plan);

    if args.dry_run {
        println!("\n{} Dry run - nothing created", style("i").cyan());
        print_script_preview(&resolved.bootstrap);
        return Ok(());
    }

    let interactive = !args.yes && console::Term::stdout().is_term();
    let cloud = AzureCli::new(resolved.azure_config_dir.clone());
    let reporter = ConsoleProgress::new();
    let picker = CleanupPicker::new(interactive);
    let waits = WaitPlan {
        settle: resolved.settle,
        ..WaitPlan::default()
    };

    let outcome = Orchestrator::new(&cloud, &reporter, &picker)
        .with_waits(waits)
        .with_bootstrap(resolved.bootstrap.clone())
        .run(&resolved.request);
    reporter.finish();

    let vm = match outcome {
        Ok(vm) => vm,
        Err(err) => {
            print_failure_hint(&err);
            return Err(err.into());
        }
    };

    session::report(&vm, resolved.connect && !args.no_connect);
    Ok(())
}

/// Priority: CLI args > env vars > config file > defaults
fn resolve_config(args: &Args, config: &Config) -> ResolvedConfig {
    let request = RawRequest {
        range: args.range.clone().unwrap_or_default(),
        project_name: args.project_name.clone().unwrap_or_default(),
        region: args
            .region
            .clone()
            .or_else(|| env::var("EVILIAN_REGION").ok())
            .or_else(|| config.vm.region.clone()),
        vm_size: args
            .vm_size
            .clone()
            .or_else(|| env::var("EVILIAN_VM_SIZE").ok())
            .or_else(|| config.vm.size.clone()),
        image: args
            .image
            .clone()
            .or_else(|| env::var("EVILIAN_IMAGE").ok())
            .or_else(|| config.vm.image.clone()),
    };

    ResolvedConfig {
        request,
        bootstrap: resolve_bootstrap(&config.bootstrap),
        settle: Duration::from_secs(config.bootstrap.settle_secs.unwrap_or(DEFAULT_SETTLE_SECS)),
        connect: config.session.connect.unwrap_or(true),
        azure_config_dir: env::var_os("AZURE_CONFIG_DIR")
            .map(PathBuf::from)
            .or_else(|| config.azure.config_dir.clone())
            .unwrap_or_else(default_azure_config_dir),
    }
}

/// Custom toolsets without a `verify` list are verified by their own package names
fn resolve_bootstrap(section: &BootstrapSection) -> BootstrapConfig {
    let mut bootstrap = BootstrapConfig::builder();
    let toolset = section.toolset.clone().filter(|t| !t.is_empty());
    let verify = section
        .verify
        .clone()
        .filter(|v| !v.is_empty())
        .or_else(|| toolset.clone());

    if let Some(toolset) = toolset {
        bootstrap = bootstrap.toolset(toolset);
    }
    if let Some(verify) = verify {
        bootstrap = bootstrap.verify_binaries(verify);
    }
    bootstrap.build()
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("╔═══════════════════════════════════════╗")
            .red()
            .bold()
    );
    println!(
        "{}",
        style("║     EVILIAN PENTEST VM PROVISIONING   ║")
            .red()
            .bold()
    );
    println!(
        "{}",
        style("╚═══════════════════════════════════════╝")
            .red()
            .bold()
    );
}

fn print_plan_table(plan: &RunPlan, resolved: &ResolvedConfig) {
    println!("\n{} Configuration\n", style("▸").blue().bold());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("Setting").fg(Color::Cyan),
        Cell::new("Value").fg(Color::Cyan),
    ]);

    let req = &plan.request;
    table.add_row(vec!["Project", &req.project_name]);
    table.add_row(vec!["Operator range", &req.allowed_range]);
    table.add_row(vec!["Region", &req.region]);
    table.add_row(vec!["Size", &req.vm_size]);
    table.add_row(vec!["Image", &req.image_reference]);
    table.add_row(vec!["Resource group", &plan.names.resource_group]);
    table.add_row(vec!["VM", &plan.names.vm_name]);
    table.add_row(vec!["Security group", &plan.names.nsg_name]);
    table.add_row(vec!["Toolset", &resolved.bootstrap.toolset.join(" ")]);
    table.add_row(vec!["Verify", &resolved.bootstrap.verify_binaries.join(" ")]);
    table.add_row(vec![
        "Azure config",
        &resolved.azure_config_dir.display().to_string(),
    ]);

    println!("{table}");
}

fn print_rules_table(plan: &RunPlan) {
    println!("\n{} Inbound rules\n", style("▸").blue().bold());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("Priority").fg(Color::Cyan),
        Cell::new("Name").fg(Color::Cyan),
        Cell::new("Access").fg(Color::Cyan),
        Cell::new("Sources").fg(Color::Cyan),
        Cell::new("Ports").fg(Color::Cyan),
    ]);

    for rule in &plan.rules {
        let sources = match rule.source_ranges.len() {
            0..=2 => rule.source_ranges.join(", "),
            n => format!("{} (+{} more)", rule.source_ranges[0], n - 1),
        };
        let access = if rule.is_catch_all() {
            Cell::new(rule.access.to_string()).fg(Color::Yellow)
        } else {
            Cell::new(rule.access.to_string())
        };
        table.add_row(vec![
            Cell::new(rule.priority),
            Cell::new(&rule.name),
            access,
            Cell::new(sources),
            Cell::new(rule.destination_ports.join(", ")),
        ]);
    }

    println!("{table}");
}

fn print_script_preview(config: &BootstrapConfig) {
    let script = BootstrapScript::rolling_conversion(config);
    let Ok(text) = BashRenderer::new().render(&script);

    println!("\n{LOOKING_GLASS} Bootstrap script:\n");
    for line in text.lines() {
        println!("  {}", style(line).dim());
    }
}

fn print_failure_hint(err: &ProvisionError) {
    match err {
        ProvisionError::RemoteScriptFailure { output, .. } => {
            println!("\n{} Last lines of script output:\n", style("▸").red());
            let lines: Vec<&str> = output.lines().collect();
            for line in &lines[lines.len().saturating_sub(25)..] {
                println!("  {}", style(line).dim());
            }
        }
        ProvisionError::ConvergenceTimeout { resource_group, .. } => {
            println!(
                "\n{} Resources were left in place. Remove them with: {}",
                style("!").yellow(),
                style(format!("az group delete --name {resource_group} --yes")).cyan()
            );
        }
        _ => {}
    }
}
