//! Package-manager housekeeping steps

use super::Step;

/// Lock files held by apt/dpkg while a transaction runs
const LOCK_FILES: [&str; 4] = [
    "/var/lib/dpkg/lock-frontend",
    "/var/lib/dpkg/lock",
    "/var/lib/apt/lists/lock",
    "/var/cache/apt/archives/lock",
];

/// Shell condition that succeeds while apt, dpkg or unattended-upgrades is busy
///
/// Falls back to process inspection when `fuser` is not installed. Only an
/// actual `/usr/bin/unattended-upgrade` run counts; the long-lived
/// `unattended-upgrade-shutdown --wait-for-signal` helper does not.
pub fn package_manager_busy_check() -> String {
    let locks = LOCK_FILES.join(" ");
    format!(
        "{{ command -v fuser >/dev/null 2>&1 && fuser {locks} >/dev/null 2>&1; }} \
         || pgrep -x apt-get >/dev/null 2>&1 \
         || pgrep -x dpkg >/dev/null 2>&1 \
         || pgrep -f '/usr/bin/unattended-upgrade( |$)' >/dev/null 2>&1"
    )
}

/// Finish any dpkg transaction left half-done by an interrupted run
#[derive(Debug, Clone)]
pub struct RepairPackageManager {
    description: String,
}

impl RepairPackageManager {
    pub fn new() -> Self {
        Self {
            description: "Repair interrupted package transactions".into(),
        }
    }
}

impl Default for RepairPackageManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for RepairPackageManager {
    fn description(&self) -> &str {
        &self.description
    }

    fn to_bash(&self) -> Vec<String> {
        vec![
            "dpkg --configure -a".into(),
            "apt-get -o DPkg::Lock::Timeout=600 install -f -y".into(),
        ]
    }

    fn check_command(&self) -> Option<String> {
        // `dpkg --audit` prints nothing when every package is fully configured
        Some("[ -z \"$(dpkg --audit 2>/dev/null)\" ]".into())
    }
}

/// Block until no other process holds the package-manager locks
#[derive(Debug, Clone)]
pub struct WaitForPackageLocks {
    /// Seconds between lock checks
    pub interval_secs: u32,
    /// Checks before giving up
    pub max_checks: u32,
    description: String,
}

impl WaitForPackageLocks {
    pub fn new(interval_secs: u32, max_checks: u32) -> Self {
        Self {
            interval_secs,
            max_checks,
            description: "Wait for package manager locks".into(),
        }
    }
}

impl Step for WaitForPackageLocks {
    fn description(&self) -> &str {
        &self.description
    }

    fn to_bash(&self) -> Vec<String> {
        vec![format!(
            r#"n=0
while {busy}; do
    n=$((n + 1))
    if [ "$n" -ge {max} ]; then
        echo "package manager still locked after {max} checks" >&2
        exit 1
    fi
    sleep {interval}
done"#,
            busy = package_manager_busy_check(),
            max = self.max_checks,
            interval = self.interval_secs,
        )]
    }

    fn check_command(&self) -> Option<String> {
        Some(format!("! {{ {}; }}", package_manager_busy_check()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::process::{Child, Command};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    use super::*;

    // Fake processes are visible to every test, so only one may exist at a time
    static PROCESS_TABLE: Mutex<()> = Mutex::new(());

    /// Background `sleep` whose argv[0] pretends to be `name`
    fn spawn_named(name: &str) -> Child {
        let child = Command::new("bash")
            .arg("-c")
            .arg(format!("exec -a {name} sleep 30"))
            .spawn()
            .unwrap();
        thread::sleep(Duration::from_millis(300));
        child
    }

    fn reports_busy() -> bool {
        Command::new("bash")
            .arg("-c")
            .arg(package_manager_busy_check())
            .status()
            .unwrap()
            .success()
    }

    #[test]
    fn test_shutdown_helper_does_not_count_as_busy() {
        let _guard = PROCESS_TABLE.lock().unwrap_or_else(|e| e.into_inner());
        let mut helper =
            spawn_named("/usr/share/unattended-upgrades/unattended-upgrade-shutdown");
        let busy = reports_busy();
        helper.kill().unwrap();
        helper.wait().unwrap();

        assert!(!busy);
    }

    #[test]
    fn test_running_upgrade_counts_as_busy() {
        if Command::new("pgrep").arg("-V").output().is_err() {
            return;
        }
        let _guard = PROCESS_TABLE.lock().unwrap_or_else(|e| e.into_inner());
        let mut upgrade = spawn_named("/usr/bin/unattended-upgrade");
        let busy = reports_busy();
        upgrade.kill().unwrap();
        upgrade.wait().unwrap();

        assert!(busy);
    }

    #[test]
    fn test_lock_wait_embeds_busy_check() {
        let step = WaitForPackageLocks::new(10, 60);
        let body = step.to_bash().join("\n");

        assert!(body.contains("unattended-upgrade( |$)"));
        assert!(body.contains("-ge 60"));
        assert!(body.contains("sleep 10"));
    }
}
