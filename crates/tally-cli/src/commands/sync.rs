use tally_core::sync::CycleOutcome;

use crate::commands::common::Service;
use crate::error::CliError;

pub async fn run_sync(service: &Service) -> Result<(), CliError> {
    if service.engine().is_none() {
        return Err(CliError::SyncNotConfigured);
    }

    match service.sync_now().await? {
        CycleOutcome::Completed(report) => println!("Sync completed: {report}"),
        CycleOutcome::AlreadyRunning => println!("Sync already in progress"),
        CycleOutcome::Offline => {
            let pending = service.store().pending_count().await?;
            println!("Offline; {pending} entries pending");
        }
    }
    Ok(())
}
