//! Configuration types for the bootstrap script

/// Default toolset metapackage
pub const DEFAULT_TOOLSET: &str = "kali-linux-headless";

/// What the bootstrap script converts the VM to
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Apt source line for the target rolling repository
    pub repo_line: String,
    /// URL of the repository signing key
    pub key_url: String,
    /// Keyring the key is stored in (referenced by `repo_line`)
    pub keyring_path: String,
    /// Packages installed after the switch
    pub toolset: Vec<String>,
    /// Binaries of which at least one must resolve after install
    pub verify_binaries: Vec<String>,
    /// Seconds between in-script lock checks
    pub lock_interval_secs: u32,
    /// In-script lock checks before the script gives up
    pub lock_max_checks: u32,
}

impl BootstrapConfig {
    /// Create a new config builder
    pub fn builder() -> BootstrapConfigBuilder {
        BootstrapConfigBuilder::default()
    }

    /// Content of `/etc/apt/sources.list` after the switch
    pub fn sources_list(&self) -> String {
        format!(
            "# Managed by evilian: original kept alongside as sources.list.evilian.bak\n{}\n",
            self.repo_line
        )
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            repo_line: "deb [signed-by=/usr/share/keyrings/kali-archive-keyring.gpg] http://http.kali.org/kali kali-rolling main contrib non-free non-free-firmware".into(),
            key_url: "https://archive.kali.org/archive-key.asc".into(),
            keyring_path: "/usr/share/keyrings/kali-archive-keyring.gpg".into(),
            toolset: vec![DEFAULT_TOOLSET.into()],
            verify_binaries: vec!["msfconsole".into(), "nmap".into()],
            lock_interval_secs: 10,
            lock_max_checks: 60,
        }
    }
}

/// Builder for `BootstrapConfig`, starting from the Kali rolling defaults
#[derive(Debug, Clone, Default)]
pub struct BootstrapConfigBuilder {
    config: BootstrapConfig,
}

impl BootstrapConfigBuilder {
    /// Set the repository source line
    pub fn repo_line(mut self, line: impl Into<String>) -> Self {
        self.config.repo_line = line.into();
        self
    }

    /// Set the signing key URL and keyring path
    pub fn signing_key(mut self, url: impl Into<String>, keyring: impl Into<String>) -> Self {
        self.config.key_url = url.into();
        self.config.keyring_path = keyring.into();
        self
    }

    /// Set the packages to install
    pub fn toolset(mut self, packages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.toolset = packages.into_iter().map(Into::into).collect();
        self
    }

    /// Set the binaries checked after install
    pub fn verify_binaries(mut self, binaries: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.verify_binaries = binaries.into_iter().map(Into::into).collect();
        self
    }

    /// Set the in-script lock wait
    pub fn lock_wait(mut self, interval_secs: u32, max_checks: u32) -> Self {
        self.config.lock_interval_secs = interval_secs;
        self.config.lock_max_checks = max_checks;
        self
    }

    /// Build the configuration
    pub fn build(self) -> BootstrapConfig {
        self.config
    }
}
