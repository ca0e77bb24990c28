use crate::commands::common::{
    entry_to_list_item, format_entry_lines, now_ms, EntryListItem, Service,
};
use crate::error::CliError;

pub fn run_list(limit: usize, as_json: bool, service: &Service) -> Result<(), CliError> {
    let mut entries = service.current_entries();
    entries.truncate(limit);
    let now = now_ms();

    if as_json {
        let json_items = entries
            .iter()
            .map(|entry| entry_to_list_item(entry, now))
            .collect::<Vec<EntryListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No entries recorded.");
        return Ok(());
    }

    for line in format_entry_lines(&entries, now) {
        println!("{line}");
    }
    Ok(())
}
