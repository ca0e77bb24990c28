use std::path::Path;

use tally_core::export::parse_json_import;

use crate::commands::common::Service;
use crate::error::CliError;

pub async fn run_import(path: &Path, service: &Service) -> Result<(), CliError> {
    let payload = std::fs::read_to_string(path)?;
    let drafts = parse_json_import(&payload)?;
    let report = service.import(drafts).await?;

    println!(
        "Imported {} entries ({} uploaded, {} pending)",
        report.imported, report.uploaded, report.pending
    );
    Ok(())
}
