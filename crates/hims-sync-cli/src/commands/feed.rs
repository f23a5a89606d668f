use std::path::Path;

use hims_sync_core::models::{PullRequest, PushBatch};

use crate::commands::common::{
    format_pull_lines, format_push_result_lines, open_engine, require_option,
};
use crate::error::CliError;

pub struct PullArgs {
    pub since: i64,
    pub entity_types: Vec<String>,
    pub limit: Option<usize>,
}

pub async fn run_pull(
    args: PullArgs,
    facility: Option<&str>,
    client: Option<&str>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let request = PullRequest {
        facility_id: require_option(facility, "--facility")?.to_string(),
        client_id: require_option(client, "--client")?.to_string(),
        since: args.since,
        entity_types: (!args.entity_types.is_empty()).then_some(args.entity_types),
        limit: args.limit,
    };

    let engine = open_engine(db_path).await?;
    let result = engine.pull(&request).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for line in format_pull_lines(&result, request.since) {
            println!("{line}");
        }
    }

    Ok(())
}

/// Read a push batch as a client would upload it.
pub fn read_batch(path: &Path) -> Result<PushBatch, CliError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub async fn run_push(
    file: &Path,
    user: Option<&str>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let user = require_option(user, "--user")?;
    let batch = read_batch(file)?;
    tracing::debug!(
        facility = %batch.facility_id,
        client = %batch.client_id,
        changes = batch.changes.len(),
        "pushing batch from file"
    );

    let engine = open_engine(db_path).await?;
    let result = engine.push(&batch, user).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for line in format_push_result_lines(&result) {
            println!("{line}");
        }
    }

    Ok(())
}
