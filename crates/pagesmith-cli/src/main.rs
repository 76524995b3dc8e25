//! pagesmith CLI - open, edit and save site builder pages
//!
//! This is the main entry point for the pagesmith command-line interface.
//! Command implementations live in [`commands`], one module per command.

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use pagesmith_core::Config;

mod cli;
mod commands;
mod logging;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::initialize_logging(&cli) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match execute_command(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        },
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    Ok(config)
}

async fn execute_command(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let stdout = io::stdout().lock();

    match cli.command {
        Commands::Slug { title, unique } => {
            commands::print_slug(&title, unique, stdout)?;
        },

        Commands::Open {
            fixture,
            organization,
            page,
            write,
        } => {
            commands::open_page(
                &fixture,
                organization.as_deref(),
                page.as_deref(),
                write,
                config.manager,
                stdout,
            )
            .await?;
        },

        Commands::Edit(args) => {
            commands::edit_page(&args, config.session, stdout).await?;
        },
    }

    Ok(())
}
