use std::path::Path;

use tally_core::export::{render_entries_export, suggested_export_file_name, ExportFormat};

use crate::commands::common::{now_ms, Service};
use crate::error::CliError;

pub async fn run_export(
    format: ExportFormat,
    output_path: Option<&Path>,
    service: &Service,
) -> Result<(), CliError> {
    let entries = service.store().list_visible(None).await?;
    let rendered = render_entries_export(&entries, format)?;

    if let Some(path) = output_path {
        let target = if path.is_dir() {
            path.join(suggested_export_file_name(format, now_ms()))
        } else {
            path.to_path_buf()
        };
        std::fs::write(&target, rendered)?;
        println!("{}", target.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}
