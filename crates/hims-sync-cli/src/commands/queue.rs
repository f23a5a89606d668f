use std::path::Path;

use crate::commands::common::{
    format_push_result_lines, format_status_lines, open_engine, require_option,
};
use crate::error::CliError;

pub async fn run_status(
    facility: Option<&str>,
    client: Option<&str>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let facility = require_option(facility, "--facility")?;
    let client = require_option(client, "--client")?;
    let engine = open_engine(db_path).await?;
    let summary = engine.status(facility, client).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for line in format_status_lines(&summary) {
            println!("{line}");
        }
    }

    Ok(())
}

pub async fn run_retry_failed(
    facility: Option<&str>,
    client: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let facility = require_option(facility, "--facility")?;
    let client = require_option(client, "--client")?;
    let engine = open_engine(db_path).await?;
    let count = engine.retry_failed(facility, client).await?;
    println!("Reset {count} failed change(s) to pending");
    Ok(())
}

pub async fn run_reprocess(
    facility: Option<&str>,
    client: Option<&str>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let facility = require_option(facility, "--facility")?;
    let client = require_option(client, "--client")?;
    let engine = open_engine(db_path).await?;
    let result = engine.reprocess_pending(facility, client).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for line in format_push_result_lines(&result) {
            println!("{line}");
        }
    }

    Ok(())
}
