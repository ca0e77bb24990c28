use serde::Serialize;

use crate::commands::common::Session;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub state: String,
    pub remote_configured: bool,
    pub online: bool,
    pub visible: usize,
    pub pending: usize,
    pub tombstones: usize,
    pub schema_version: i32,
    pub db_path: Option<String>,
    pub last_error: Option<String>,
}

pub async fn collect_status(session: &Session) -> Result<StatusReport, CliError> {
    let service = &session.service;
    let store = service.store();
    let engine = service.engine();

    Ok(StatusReport {
        state: service.sync_state().label().to_string(),
        remote_configured: engine.is_some(),
        online: engine.is_some_and(|engine| engine.network().is_online()),
        visible: service.current_entries().len(),
        pending: store.pending_count().await?,
        tombstones: store.list_tombstones().await?.len(),
        schema_version: store.schema_version().await?,
        db_path: store.db_path().map(|path| path.display().to_string()),
        last_error: engine.and_then(|engine| engine.last_error()),
    })
}

pub async fn run_status(as_json: bool, session: &Session) -> Result<(), CliError> {
    let status = collect_status(session).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("State:      {}", status.state);
    if status.remote_configured {
        println!("Online:     {}", if status.online { "yes" } else { "no" });
    } else {
        println!("Remote:     not configured");
    }
    println!("Entries:    {}", status.visible);
    println!("Pending:    {}", status.pending);
    println!("Tombstones: {}", status.tombstones);
    if let Some(path) = &status.db_path {
        println!("Database:   {path} (schema v{})", status.schema_version);
    }
    if let Some(error) = &status.last_error {
        println!("Last error: {error}");
    }
    Ok(())
}
