use tally_core::config::EngineConfig;
use tally_core::sync::ReconciliationTrigger;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::commands::common::Session;
use crate::error::CliError;

/// Probe connectivity and run reconciliation cycles until Ctrl-C.
pub async fn run_watch(session: &Session, config: &EngineConfig) -> Result<(), CliError> {
    let (Some(engine), Some(probe)) = (session.service.engine(), session.probe.as_ref()) else {
        return Err(CliError::SyncNotConfigured);
    };

    let network = engine.network().clone();
    let trigger = ReconciliationTrigger::new(engine.clone(), config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    info!(
        sync_interval = ?config.sync_interval,
        probe_interval = ?config.probe_interval,
        "Watching; press Ctrl-C to stop"
    );

    let stop = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "Could not listen for Ctrl-C; stopping");
        }
        let _ = shutdown_tx.send(true);
    };

    tokio::join!(
        network.run_probe(probe, config.probe_interval, shutdown_rx.clone()),
        trigger.run(shutdown_rx),
        stop,
    );

    let pending = session.service.store().pending_count().await?;
    println!("Stopped; {pending} entries pending");
    Ok(())
}
