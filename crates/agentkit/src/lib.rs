//! # Agentkit
//!
//! Typed HTTP client for the axion agent's REST API (base path `/api/v1`).
//!
//! The agent exposes narrow primitives — file and directory property
//! management with optimistic concurrency via entity tags, command
//! execution, and content transfer as gzipped tar archives. This crate maps
//! them onto a small async client; it holds no policy, mirrors the wire
//! contract one method per operation and surfaces structured agent errors
//! as [`AgentError::Api`].
//!
//! Entity tags are opaque weak tags (`W/"<hex>"`); callers never parse
//! them, they only echo them back through `If-Match`.

pub mod client;
pub mod error;
pub mod models;

pub use client::{AgentClient, PutResult, Tagged};
pub use error::AgentError;
pub use models::{
    CommandRequest, CommandResponse, DirectoryProperties, ErrorPayload, FileProperties,
};
