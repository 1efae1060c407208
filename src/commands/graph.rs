//! `axionctl graph` — render the manifest's dependency graph as DOT,
//! suitable for piping into `dot -Tsvg`.

use anyhow::{Context, Result};
use converge::Graph;

use super::App;
use crate::cli::GraphArgs;
use crate::manifest::{self, LoaderContext};

pub fn run(app: &App, args: &GraphArgs) -> Result<()> {
    let loader_ctx = LoaderContext {
        client: app.client()?,
        backup_dir: app.config.resolved_backup_dir(),
    };
    let specs = manifest::load(&loader_ctx, &args.manifest)?;

    let mut graph = Graph::new();
    for spec in &specs {
        graph.add_node(spec.id.clone());
    }
    for spec in &specs {
        for dep in &spec.dependencies {
            graph
                .add_edge_checked(dep, &[spec.id.as_str()])
                .with_context(|| {
                    format!("resource {:?} depends on unknown resource {dep:?}", spec.id)
                })?;
        }
    }

    graph.as_dot(&mut std::io::stdout(), "axion")?;
    Ok(())
}
