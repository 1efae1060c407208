//! Concrete resources managed through the agent.
//!
//! Every resource implements [`converge::Resource`] against the agent API:
//! - `File` and `Directory` reconcile path properties with optimistic
//!   concurrency via entity tags and back their content up as archives
//! - `Command` executes a remote command and never rolls back

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

pub mod command;
pub mod directory;
pub mod file;

pub use command::{Command, CommandExecutionError, CommandOptions};
pub use directory::Directory;
pub use file::File;

/// Desired or observed existence of a file or directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// The state cannot be determined (or was never checked).
    #[default]
    Unknown,
    /// The resource does not exist.
    Absent,
    /// The resource exists.
    Present,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Unknown => "unknown",
            State::Absent => "absent",
            State::Present => "present",
        };
        f.write_str(s)
    }
}

impl FromStr for State {
    type Err = std::convert::Infallible;

    /// Anything unrecognised maps to [`State::Unknown`], which resource
    /// validation rejects.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "absent" => State::Absent,
            "present" => State::Present,
            _ => State::Unknown,
        })
    }
}

/// The write operation recorded by the most recent `apply`, consumed by
/// `rollback`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Operation {
    #[default]
    None,
    Create,
    Update,
    Delete,
}

/// Property values requested by the manifest. An unset field means "leave
/// whatever is there alone" — it neither counts as drift nor gets sent.
#[derive(Debug, Clone, Default)]
pub struct DesiredProperties {
    pub mode: Option<String>,
    pub owner: Option<String>,
    pub group: Option<String>,
}

impl DesiredProperties {
    /// Whether every requested field matches the observed values.
    pub(crate) fn matches(
        &self,
        mode: Option<&str>,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> bool {
        field_matches(&self.mode, mode)
            && field_matches(&self.owner, owner)
            && field_matches(&self.group, group)
    }

    /// Renders a git-style property diff under `diff -- <header>`. Empty
    /// when nothing differs.
    pub(crate) fn diff_against(
        &self,
        header: &str,
        mode: Option<&str>,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> String {
        let mut body = String::new();
        let mut compare = |name: &str, desired: &Option<String>, actual: Option<&str>| {
            if let Some(desired) = desired
                && actual != Some(desired.as_str())
            {
                let actual = actual.unwrap_or("");
                body.push_str(&format!("- {name}: {actual:?}\n+ {name}: {desired:?}\n"));
            }
        };

        compare("mode", &self.mode, mode);
        compare("owner", &self.owner, owner);
        compare("group", &self.group, group);

        if body.is_empty() {
            return String::new();
        }
        format!("diff -- {header}\n{body}")
    }
}

fn field_matches(desired: &Option<String>, actual: Option<&str>) -> bool {
    match desired {
        Some(desired) => actual == Some(desired.as_str()),
        None => true,
    }
}

/// Octal mode literal, e.g. `0644`.
pub(crate) fn is_valid_mode(mode: &str) -> bool {
    u32::from_str_radix(mode, 8).is_ok()
}

/// Backup artifacts are named after the managed path: leading slash
/// stripped, interior slashes replaced with dashes.
pub(crate) fn backup_slug(path: &str) -> String {
    path.trim_start_matches('/').replace('/', "-")
}
