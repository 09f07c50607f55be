//! Bootstrap script - the ordered step sequence run inside the VM

use crate::config::BootstrapConfig;
use crate::steps::{
    InstallPackages, RepairPackageManager, RunCommand, SigningKey, Step, VerifyAnyBinary,
    WaitForPackageLocks, WriteFile,
};

/// Bumped whenever the generated step sequence changes
pub const SCRIPT_VERSION: u32 = 1;

const SOURCES_LIST: &str = "/etc/apt/sources.list";
const SOURCES_DIR: &str = "/etc/apt/sources.list.d";
const SOURCES_BACKUP_DIR: &str = "/etc/apt/sources.list.d.evilian-backup";

/// Versioned, ordered list of idempotent steps
///
/// Handed opaquely to the executor; render it with a
/// [`Renderer`](crate::render::Renderer) to get the script text.
pub struct BootstrapScript {
    pub version: u32,
    /// Ordered list of steps
    pub steps: Vec<Box<dyn Step>>,
}

impl BootstrapScript {
    /// Create a new empty script
    pub fn new() -> Self {
        Self {
            version: SCRIPT_VERSION,
            steps: vec![],
        }
    }

    /// Add a step to the script
    pub fn add_step<S: Step + 'static>(&mut self, step: S) {
        self.steps.push(Box::new(step));
    }

    /// Add a step fluently
    pub fn with_step<S: Step + 'static>(mut self, step: S) -> Self {
        self.add_step(step);
        self
    }

    /// Step descriptions in execution order
    pub fn descriptions(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.description()).collect()
    }

    /// Convert the VM to the configured rolling repository and install the toolset
    ///
    /// Used unchanged before and after the reboot; every step is guarded so a
    /// second run only redoes what is missing.
    pub fn rolling_conversion(config: &BootstrapConfig) -> Self {
        let mut script = Self::new();

        // =========================================================
        // Phase 1: Package manager health
        // =========================================================
        script.add_step(RepairPackageManager::new());
        script.add_step(WaitForPackageLocks::new(
            config.lock_interval_secs,
            config.lock_max_checks,
        ));

        // =========================================================
        // Phase 2: Key fetch toolchain and signing key
        // =========================================================
        script.add_step(
            InstallPackages::new(["ca-certificates", "curl", "gnupg"])
                .described("Install key fetch toolchain"),
        );
        script.add_step(SigningKey::new(&config.key_url, &config.keyring_path));

        // =========================================================
        // Phase 3: Switch package sources
        // =========================================================
        script.add_step(
            RunCommand::new(
                "Back up and disable distribution source files",
                format!(
                    "mkdir -p {SOURCES_BACKUP_DIR} && find {SOURCES_DIR} -maxdepth 1 -type f \\( -name '*.list' -o -name '*.sources' \\) -exec mv -f {{}} {SOURCES_BACKUP_DIR}/ \\;"
                ),
            )
            .unless(format!(
                "[ -z \"$(find {SOURCES_DIR} -maxdepth 1 -type f \\( -name '*.list' -o -name '*.sources' \\) 2>/dev/null)\" ]"
            )),
        );
        script.add_step(
            WriteFile::new(SOURCES_LIST, config.sources_list())
                .with_permissions("0644")
                .with_backup(".evilian.bak")
                .described("Replace package sources with rolling repository"),
        );

        // =========================================================
        // Phase 4: Index refresh and toolset
        // =========================================================
        script.add_step(RunCommand::new(
            "Refresh package index",
            "apt-get -o DPkg::Lock::Timeout=600 update",
        ));
        script.add_step(InstallPackages::new(config.toolset.clone()));

        // =========================================================
        // Phase 5: Verification
        // =========================================================
        script.add_step(VerifyAnyBinary::new(config.verify_binaries.clone()));

        script
    }
}

impl Default for BootstrapScript {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BootstrapScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapScript")
            .field("version", &self.version)
            .field("steps", &self.descriptions())
            .finish()
    }
}
