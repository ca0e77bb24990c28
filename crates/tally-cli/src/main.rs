//! Tally CLI - record entries from the terminal
//!
//! Entries are written locally first and synchronized with the shared record
//! store whenever it is reachable.

mod cli;
mod commands;
mod error;


use clap::Parser;
use tally_core::config::EngineConfig;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::common::{open_session, parse_location, resolve_db_path};
use crate::commands::delete::run_delete;
use crate::commands::export::run_export;
use crate::commands::import::run_import;
use crate::commands::list::run_list;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tally=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env()?;
    let db_path = resolve_db_path(cli.db_path, &config);
    let session = open_session(&db_path, &config).await?;

    match cli.command {
        Commands::Add {
            name,
            lat,
            lon,
            accuracy,
        } => {
            let location = parse_location(lat, lon, accuracy)?;
            run_add(&name, location, &session.service).await?;
        }
        Commands::List { limit, json } => run_list(limit, json, &session.service)?,
        Commands::Delete { id } => run_delete(&id, &session.service).await?,
        Commands::Sync => run_sync(&session.service).await?,
        Commands::Status { json } => run_status(json, &session).await?,
        Commands::Watch => run_watch(&session, &config).await?,
        Commands::Export { format, output } => {
            run_export(format.into(), output.as_deref(), &session.service).await?;
        }
        Commands::Import { path } => run_import(&path, &session.service).await?,
    }

    Ok(())
}
