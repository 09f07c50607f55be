//! File management steps

use super::Step;
use sha2::{Digest, Sha256};

/// Atomically replace a file with the given content
///
/// The new content is written to a temp file next to the target and moved into
/// place. With a backup suffix, the original is copied aside once and never
/// overwritten by later runs.
#[derive(Debug, Clone)]
pub struct WriteFile {
    /// File path
    pub path: String,
    /// File content, always newline-terminated
    pub content: String,
    /// File permissions (e.g., "0644")
    pub permissions: Option<String>,
    /// Suffix for a one-time backup of the original (e.g., ".evilian.bak")
    pub backup_suffix: Option<String>,
    /// Description
    description: String,
}

impl WriteFile {
    /// Create a new file write step
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let mut content = content.into();
        if !content.ends_with('\n') {
            content.push('\n');
        }
        let description = format!("Write {path}");
        Self {
            path,
            content,
            permissions: None,
            backup_suffix: None,
            description,
        }
    }

    /// Set file permissions
    pub fn with_permissions(mut self, perms: impl Into<String>) -> Self {
        self.permissions = Some(perms.into());
        self
    }

    /// Keep a copy of the original file at `<path><suffix>`
    pub fn with_backup(mut self, suffix: impl Into<String>) -> Self {
        self.backup_suffix = Some(suffix.into());
        self
    }

    /// Override the description
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Compute SHA256 hash of content (hex-encoded)
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.content.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Generate a unique heredoc delimiter that won't appear in content
    fn heredoc_delimiter(&self) -> &'static str {
        if self.content.contains("EVILIAN_EOF") {
            if self.content.contains("__EVILIAN_FILE_END__") {
                "__FILE_CONTENT_END_MARKER__"
            } else {
                "__EVILIAN_FILE_END__"
            }
        } else {
            "EVILIAN_EOF"
        }
    }
}

impl Step for WriteFile {
    fn description(&self) -> &str {
        &self.description
    }

    fn to_bash(&self) -> Vec<String> {
        let mut cmds = vec![format!("mkdir -p \"$(dirname '{}')\"", self.path)];

        if let Some(suffix) = &self.backup_suffix {
            cmds.push(format!(
                "if [ -f '{path}' ] && [ ! -e '{path}{suffix}' ]; then cp -a '{path}' '{path}{suffix}'; fi",
                path = self.path
            ));
        }

        // The heredoc re-adds the final newline that `content` already ends with.
        let body = self.content.strip_suffix('\n').unwrap_or(&self.content);
        let delimiter = self.heredoc_delimiter();
        cmds.push(format!(
            "tmp=$(mktemp '{path}.XXXXXX')\ncat > \"$tmp\" << '{delimiter}'\n{body}\n{delimiter}",
            path = self.path
        ));

        if let Some(perms) = &self.permissions {
            cmds.push(format!("chmod {perms} \"$tmp\""));
        }

        cmds.push(format!("mv -f \"$tmp\" '{}'", self.path));
        cmds
    }

    fn check_command(&self) -> Option<String> {
        Some(format!(
            "[ -f '{path}' ] && [ \"$(sha256sum '{path}' | cut -d' ' -f1)\" = \"{hash}\" ]",
            path = self.path,
            hash = self.content_hash()
        ))
    }
}
