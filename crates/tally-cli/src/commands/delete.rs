use tally_core::services::Deletion;

use crate::commands::common::{parse_local_id, Service};
use crate::error::CliError;

pub async fn run_delete(id: &str, service: &Service) -> Result<(), CliError> {
    let local_id = parse_local_id(id)?;

    match service.delete_entry(local_id).await? {
        Deletion::Missing => return Err(CliError::EntryNotFound(local_id)),
        Deletion::Purged => println!("{local_id}"),
        Deletion::Tombstoned(_) => {
            if service.store().get(local_id).await?.is_some() {
                println!("{local_id} (remote delete pending)");
            } else {
                println!("{local_id}");
            }
        }
    }
    Ok(())
}
