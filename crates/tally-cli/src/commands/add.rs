use tally_core::Location;

use crate::commands::common::{normalize_name, Service};
use crate::error::CliError;

pub async fn run_add(
    name_parts: &[String],
    location: Option<Location>,
    service: &Service,
) -> Result<(), CliError> {
    let name = normalize_name(name_parts)?;
    let entry = service.submit_entry(&name, location).await?;

    if entry.synced {
        println!("{}", entry.local_id);
    } else {
        println!("{} (pending)", entry.local_id);
    }
    Ok(())
}
