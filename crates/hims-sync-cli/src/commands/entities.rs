use hims_sync_core::Registry;

use crate::commands::common::format_entity_lines;
use crate::error::CliError;

/// Registered kinds come from the built-in catalog, no database needed.
pub fn run_entities(as_json: bool) -> Result<(), CliError> {
    let registry = Registry::standard();
    let schemas = registry.schemas().cloned().collect::<Vec<_>>();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&schemas)?);
    } else {
        for line in format_entity_lines(&schemas) {
            println!("{line}");
        }
    }

    Ok(())
}
