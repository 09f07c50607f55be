//! Package repository and installation steps

use super::Step;

/// Apt invocation that waits on the dpkg lock instead of failing
pub(crate) const APT_GET: &str = "apt-get -o DPkg::Lock::Timeout=600";

/// Archive signing key fetched into a dedicated keyring
#[derive(Debug, Clone)]
pub struct SigningKey {
    /// URL to the armored key
    pub key_url: String,
    /// Keyring path (e.g. "/usr/share/keyrings/kali-archive-keyring.gpg")
    pub keyring_path: String,
    description: String,
}

impl SigningKey {
    pub fn new(key_url: impl Into<String>, keyring_path: impl Into<String>) -> Self {
        let keyring_path = keyring_path.into();
        let description = format!("Install signing key {keyring_path}");
        Self {
            key_url: key_url.into(),
            keyring_path,
            description,
        }
    }

    /// Kali Linux archive key
    pub fn kali() -> Self {
        Self::new(
            "https://archive.kali.org/archive-key.asc",
            "/usr/share/keyrings/kali-archive-keyring.gpg",
        )
    }
}

impl Step for SigningKey {
    fn description(&self) -> &str {
        &self.description
    }

    fn to_bash(&self) -> Vec<String> {
        // Dearmor into a temp file first so a failed download never leaves a
        // truncated keyring behind.
        vec![format!(
            "curl -fsSL {url} | gpg --dearmor --yes -o {path}.tmp && mv -f {path}.tmp {path}",
            url = self.key_url,
            path = self.keyring_path
        )]
    }

    fn check_command(&self) -> Option<String> {
        Some(format!("[ -s {} ]", self.keyring_path))
    }
}

/// Install one or more apt packages non-interactively
#[derive(Debug, Clone)]
pub struct InstallPackages {
    /// Package names
    pub names: Vec<String>,
    description: String,
}

impl InstallPackages {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let description = format!("Install {}", names.join(" "));
        Self { names, description }
    }

    /// Override the description
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Step for InstallPackages {
    fn description(&self) -> &str {
        &self.description
    }

    fn to_bash(&self) -> Vec<String> {
        vec![format!(
            "{APT_GET} install -y -o Dpkg::Options::=--force-confdef -o Dpkg::Options::=--force-confold {}",
            self.names.join(" ")
        )]
    }

    fn check_command(&self) -> Option<String> {
        if self.names.is_empty() {
            return None;
        }
        // `dpkg -s` also succeeds for half-configured packages, so check the
        // full status string instead.
        Some(
            self.names
                .iter()
                .map(|name| {
                    format!(
                        "dpkg-query -W -f='${{Status}}' {name} 2>/dev/null | grep -q 'install ok installed'"
                    )
                })
                .collect::<Vec<_>>()
                .join(" && "),
        )
    }
}
