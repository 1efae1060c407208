mod cli;
mod commands;
mod config;
mod manifest;
mod resource;
mod ui;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Command};
use commands::App;
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Map -v flags onto log levels
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = endpoint.clone();
    }

    // The first interrupt cancels the run; the engine stops at the next
    // resource boundary and surfaces the cancellation as the fatal error.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("interrupt received, cancelling the run");
                cancel.cancel();
            }
        });
    }

    let app = App {
        config,
        cancel,
        plain: cli.plain,
        quiet: cli.quiet,
    };

    match &cli.command {
        Command::Plan(args) => commands::plan::run(&app, args).await,
        Command::Apply(args) => commands::apply::run(&app, args).await,
        Command::Graph(args) => commands::graph::run(&app, args),
    }
}
