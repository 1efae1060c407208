//! Wire models for the agent API.

use serde::{Deserialize, Serialize};

/// File properties as reported and accepted by the agent. Unset fields are
/// omitted on the wire; in requests an omitted field means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// SHA-256 of the content; reported by the agent, never sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Directory properties. Same shape as files, minus the checksum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandRequest {
    pub command: String,
    pub expected_exit_codes: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandResponse {
    pub exit_code: i64,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    /// Whether the exit code was one of the expected ones.
    pub success: bool,
}

/// Structured error body the agent attaches to failure responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorPayload {
    pub code: u16,
    #[serde(default)]
    pub message: String,
}
