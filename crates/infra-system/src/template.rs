// Per-process file path templates (--logfile / --touchfile)

use std::fmt;
use std::path::PathBuf;

/// Token used in place of a worker's `queue-n` for the supervisor itself
pub const MASTER_TOKEN: &str = "master";

const PLACEHOLDER: &str = "{}";

/// A path in which `{}` stands for the process's token (`emails-2`, `master`).
/// A leading `~` is expanded to the home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate(String);

impl PathTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether each process gets its own file
    pub fn is_templated(&self) -> bool {
        self.0.contains(PLACEHOLDER)
    }

    /// Substitute `token`. A template without `{}` renders to itself.
    pub fn render(&self, token: &str) -> PathBuf {
        let filled = self.0.replace(PLACEHOLDER, token);
        PathBuf::from(shellexpand::tilde(&filled).into_owned())
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PathTemplate {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}
