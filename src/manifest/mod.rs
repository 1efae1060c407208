//! Manifest loaders.
//!
//! A manifest describes the desired resources; loaders turn one into the
//! resource specs the orchestrator consumes. Two surface syntaxes ship: a
//! declarative YAML document with variable substitution, and a scripted Lua
//! form. Dispatch is by file extension.

use std::path::Path;
use std::sync::Arc;

use agentkit::AgentClient;
use anyhow::{Result, bail};
use converge::ResourceSpec;

pub mod lua;
pub mod yaml;

/// Everything a loader needs to instantiate concrete resources.
pub struct LoaderContext {
    pub client: Arc<AgentClient>,
    pub backup_dir: std::path::PathBuf,
}

/// Parses a manifest file and returns resource specs in declaration order
/// (dependency ordering is the orchestrator's job).
pub trait Loader {
    fn load(&self, ctx: &LoaderContext, path: &Path) -> Result<Vec<ResourceSpec>>;
}

/// Picks a loader from the manifest file extension.
pub fn loader_for(path: &Path) -> Result<Box<dyn Loader>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("yaml") | Some("yml") => Ok(Box::new(yaml::YamlLoader)),
        Some("lua") => Ok(Box::new(lua::LuaLoader)),
        _ => bail!("unsupported manifest file extension: {}", path.display()),
    }
}

/// Convenience wrapper: dispatch and load in one call.
pub fn load(ctx: &LoaderContext, path: &Path) -> Result<Vec<ResourceSpec>> {
    loader_for(path)?.load(ctx, path)
}
