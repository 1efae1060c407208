//! CLI subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agentkit::AgentClient;
use anyhow::{Context, Result};
use converge::{
    EmojiReporter, NullReporter, Options, Orchestrator, PlainReporter, Reporter,
};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::manifest::{self, LoaderContext};

pub mod apply;
pub mod graph;
pub mod plan;

/// Shared state for a single CLI invocation.
pub struct App {
    pub config: Config,
    pub cancel: CancellationToken,
    pub plain: bool,
    pub quiet: bool,
}

impl App {
    pub fn reporter(&self) -> Box<dyn Reporter> {
        if self.quiet {
            Box::new(NullReporter)
        } else if self.plain {
            Box::new(PlainReporter)
        } else {
            Box::new(EmojiReporter)
        }
    }

    pub fn client(&self) -> Result<Arc<AgentClient>> {
        let client = AgentClient::new(&self.config.endpoint)
            .with_context(|| format!("invalid agent endpoint {:?}", self.config.endpoint))?;
        Ok(Arc::new(client))
    }
}

/// Loads the manifest and registers every spec with a fresh orchestrator.
pub(crate) fn build_orchestrator(
    app: &App,
    manifest_path: &Path,
    backup_dir: PathBuf,
    backup_enabled: bool,
) -> Result<Orchestrator> {
    let loader_ctx = LoaderContext {
        client: app.client()?,
        backup_dir,
    };
    let specs = manifest::load(&loader_ctx, manifest_path)?;

    let mut orchestrator = Orchestrator::new(Options {
        reporter: app.reporter(),
        backup_enabled,
        concurrency: app.config.concurrency,
    });
    for spec in specs {
        let name = spec.resource.name();
        orchestrator
            .add(spec)
            .with_context(|| format!("failed to add resource {name:?}"))?;
    }
    Ok(orchestrator)
}
