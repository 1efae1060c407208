//! `axionctl plan` — evaluate the manifest and show pending changes
//! without touching the target system.

use anyhow::{Result, bail};

use super::App;
use crate::cli::PlanArgs;
use crate::ui;

pub async fn run(app: &App, args: &PlanArgs) -> Result<()> {
    let backup_dir = app.config.resolved_backup_dir();
    let mut orchestrator = super::build_orchestrator(app, &args.manifest, backup_dir, false)?;

    let summary = orchestrator.run(&app.cancel, true).await;
    ui::print_summary(&summary, true);

    if let Some(err) = summary.fatal_error {
        return Err(err.into());
    }
    if !summary.success {
        bail!("plan failed");
    }
    Ok(())
}
