//! Connection details and the optional interactive session
//!
//! Nothing in here can fail the run: the VM exists whether or not the
//! operator connects right away.

use std::net::{TcpStream, ToSocketAddrs};
use std::process::{Command, Stdio};
use std::time::Duration;

use comfy_table::{Cell, Color, Table, presets::UTF8_FULL_CONDENSED};
use console::{Emoji, style};
use evilian_provision::network::ADMIN_PORT;
use evilian_provision::poll::{Attempts, PollCondition, PollOutcome, poll};
use evilian_provision::ProvisionedVm;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Admin-port reachability probe: 5 s between 12 attempts
fn probe_condition() -> PollCondition {
    PollCondition::new(
        format!("port {ADMIN_PORT}"),
        Duration::from_secs(5),
        Attempts::Limited(12),
    )
}

const SSH_OPTIONS: [&str; 6] = [
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "UserKnownHostsFile=/dev/null",
    "-o",
    "LogLevel=ERROR",
];

/// How the run hands the VM over to the operator
#[derive(Debug, PartialEq, Eq)]
enum Handoff {
    NotRequested,
    PortClosed,
    SessionFailed(String),
    SessionOpened,
}

impl Handoff {
    fn needs_manual_command(&self) -> bool {
        !matches!(self, Self::SessionOpened)
    }
}

/// Probe only when connecting, open a session only once the port answers
fn hand_off(
    connect: bool,
    port_ready: impl FnOnce() -> bool,
    session: impl FnOnce() -> Result<(), String>,
) -> Handoff {
    if !connect {
        return Handoff::NotRequested;
    }
    if !port_ready() {
        return Handoff::PortClosed;
    }
    match session() {
        Ok(()) => Handoff::SessionOpened,
        Err(reason) => Handoff::SessionFailed(reason),
    }
}

/// Print the login block, then connect if asked and reachable
pub fn report(vm: &ProvisionedVm, connect: bool) {
    print_success(vm);

    let handoff = hand_off(
        connect,
        || wait_for_admin_port(&vm.public_ip),
        || open_session(vm),
    );
    match &handoff {
        Handoff::PortClosed => println!(
            "{} Port {ADMIN_PORT} on {} is not answering yet",
            style("!").yellow(),
            vm.public_ip
        ),
        Handoff::SessionFailed(reason) => {
            println!("{} Could not open a session: {reason}", style("!").yellow());
        }
        Handoff::NotRequested | Handoff::SessionOpened => {}
    }
    if handoff.needs_manual_command() {
        print_manual_command(vm);
    }
}

fn print_success(vm: &ProvisionedVm) {
    println!();
    println!(
        "{}",
        style("╔═══════════════════════════════════════╗")
            .green()
            .bold()
    );
    println!(
        "{}",
        style("║              VM READY!                ║")
            .green()
            .bold()
    );
    println!(
        "{}",
        style("╚═══════════════════════════════════════╝")
            .green()
            .bold()
    );
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);

    let rows = [
        ("Public IP", vm.public_ip.as_str()),
        ("Username", vm.credential.username.as_str()),
        ("Password", vm.credential.password.as_str()),
        ("Resource group", vm.names.resource_group.as_str()),
        ("VM", vm.names.vm_name.as_str()),
        ("Security group", vm.names.nsg_name.as_str()),
        ("Region", vm.request.region.as_str()),
    ];
    for (key, value) in rows {
        table.add_row(vec![Cell::new(key).fg(Color::Cyan), Cell::new(value)]);
    }

    println!("{table}");
    println!(
        "  {} the password is shown only once and is not stored",
        style("->").dim()
    );
    println!();
    println!("{SPARKLE} Provisioning complete!");
}

fn print_manual_command(vm: &ProvisionedVm) {
    println!(
        "\nConnect with: {}",
        style(manual_command(&vm.credential.username, &vm.public_ip)).cyan()
    );
}

/// Command the operator can paste to log in
fn manual_command(username: &str, ip: &str) -> String {
    format!("ssh -o StrictHostKeyChecking=no {username}@{ip}")
}

fn wait_for_admin_port(ip: &str) -> bool {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Waiting for port {ADMIN_PORT} on {ip}..."));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let condition = probe_condition();
    let Ok(outcome) = poll(
        &condition,
        || Ok::<_, std::convert::Infallible>(port_open(ip, ADMIN_PORT)),
        |open| *open,
    );

    match outcome {
        PollOutcome::Satisfied { .. } => {
            spinner.finish_with_message(format!("{} Port {ADMIN_PORT} open", style("✓").green()));
            true
        }
        PollOutcome::Exhausted { attempts, .. } => {
            spinner.finish_with_message(format!(
                "{} Port {ADMIN_PORT} closed after {attempts} attempts",
                style("✗").red()
            ));
            false
        }
    }
}

fn port_open(ip: &str, port: u16) -> bool {
    let Ok(mut addrs) = (ip, port).to_socket_addrs() else {
        return false;
    };
    addrs.any(|addr| {
        let open = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).is_ok();
        debug!(%addr, open, "admin port probe");
        open
    })
}

fn tool_available(tool: &str, version_flag: &str) -> bool {
    Command::new(tool)
        .arg(version_flag)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// Program and arguments for an interactive login
///
/// With `sshpass` the password travels in `SSHPASS`, never on the command line.
fn session_command(username: &str, ip: &str, with_sshpass: bool) -> (String, Vec<String>) {
    let mut args: Vec<String> = SSH_OPTIONS.iter().map(ToString::to_string).collect();
    args.push(format!("{username}@{ip}"));

    if with_sshpass {
        let mut wrapped = vec!["-e".to_string(), "ssh".to_string()];
        wrapped.extend(args);
        ("sshpass".to_string(), wrapped)
    } else {
        ("ssh".to_string(), args)
    }
}

fn open_session(vm: &ProvisionedVm) -> Result<(), String> {
    if !tool_available("ssh", "-V") {
        return Err("ssh is not installed".into());
    }
    let with_sshpass = tool_available("sshpass", "-V");
    if !with_sshpass {
        println!(
            "{} sshpass not found; paste the password when ssh asks for it",
            style("i").cyan()
        );
    }

    let (program, args) = session_command(&vm.credential.username, &vm.public_ip, with_sshpass);
    println!("\n{} Opening session on {}...\n", style("▸").cyan(), vm.public_ip);

    let mut cmd = Command::new(&program);
    cmd.args(&args);
    if with_sshpass {
        cmd.env("SSHPASS", &vm.credential.password);
    }

    let status = cmd.status().map_err(|e| format!("failed to run {program}: {e}"))?;
    // 255 is ssh's own connection failure; other codes come from the remote shell
    if status.code() == Some(255) {
        return Err(format!("{program} exited with {status}"));
    }
    Ok(())
}
