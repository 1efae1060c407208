//! Error types for agent API calls.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The requested file or directory does not exist on the target host.
    #[error("resource not found")]
    NotFound,

    /// Structured error payload returned by the agent.
    #[error("agent error {code}: {message}")]
    Api { code: u16, message: String },

    /// The run was cancelled while a request was in flight.
    #[error("request cancelled")]
    Cancelled,

    /// A response that must carry an entity tag did not.
    #[error("response missing ETag header")]
    MissingEtag,

    #[error("invalid agent endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("agent request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl AgentError {
    /// The agent-reported status code, when one is known.
    pub fn code(&self) -> Option<u16> {
        match self {
            AgentError::Api { code, .. } => Some(*code),
            AgentError::NotFound => Some(404),
            _ => None,
        }
    }
}
