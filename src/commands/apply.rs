//! `axionctl apply` — converge the target system to the manifest.

use anyhow::{Context, Result, bail};
use colored::Colorize;
use dialoguer::Confirm;

use super::App;
use crate::cli::ApplyArgs;
use crate::{config, ui};

pub async fn run(app: &App, args: &ApplyArgs) -> Result<()> {
    let enable_backups = args.enable_backups || app.config.enable_backups;
    let backup_dir = args
        .backup_dir
        .clone()
        .unwrap_or_else(|| app.config.resolved_backup_dir());

    if enable_backups {
        config::validate_backup_dir(&backup_dir).context("invalid backup directory")?;
    }

    if !args.yes && !confirm(&app.config.endpoint)? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    let mut orchestrator =
        super::build_orchestrator(app, &args.manifest, backup_dir, enable_backups)?;

    let summary = orchestrator.run(&app.cancel, false).await;
    ui::print_summary(&summary, false);

    if let Some(err) = summary.fatal_error {
        return Err(err.into());
    }
    if !summary.success {
        bail!("apply failed");
    }
    Ok(())
}

fn confirm(endpoint: &str) -> Result<bool> {
    let confirmed = Confirm::new()
        .with_prompt(format!("Apply configuration to {endpoint}?"))
        .default(true)
        .interact()?;
    Ok(confirmed)
}
