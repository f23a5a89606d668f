use std::path::Path;

use hims_sync_core::models::{ConflictId, Payload, Resolution, ResolveRequest};

use crate::cli::ResolutionArg;
use crate::commands::common::{
    format_conflict_lines, format_sync_timestamp, open_engine, parse_payload, require_option,
};
use crate::error::CliError;

pub async fn run_conflicts(
    facility: Option<&str>,
    client: Option<&str>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let facility = require_option(facility, "--facility")?;
    let engine = open_engine(db_path).await?;
    let conflicts = engine.pending_conflicts(facility, client).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&conflicts)?);
    } else if conflicts.is_empty() {
        println!("No pending conflicts");
    } else {
        for line in format_conflict_lines(&conflicts) {
            println!("{line}");
        }
    }

    Ok(())
}

pub struct ResolveArgs<'a> {
    pub id: &'a str,
    pub resolution: ResolutionArg,
    pub payload: Option<&'a str>,
    pub payload_file: Option<&'a Path>,
    pub notes: Option<String>,
}

pub async fn run_resolve(
    args: ResolveArgs<'_>,
    user: Option<&str>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let user = require_option(user, "--user")?;
    let conflict_id = parse_conflict_id(args.id)?;
    let request = ResolveRequest {
        resolution: resolution_from_arg(args.resolution),
        resolved_payload: read_payload(args.payload, args.payload_file)?,
        notes: args.notes,
    };

    let engine = open_engine(db_path).await?;
    let conflict = engine
        .resolve_conflict(&conflict_id, &request, user)
        .await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&conflict)?);
    } else {
        println!(
            "Resolved {} as {} at {}",
            conflict.id,
            conflict.resolution,
            conflict
                .resolved_at
                .map_or_else(String::new, format_sync_timestamp)
        );
    }

    Ok(())
}

pub fn parse_conflict_id(raw: &str) -> Result<ConflictId, CliError> {
    raw.trim()
        .parse::<ConflictId>()
        .map_err(|_| CliError::InvalidConflictId(raw.to_string()))
}

pub const fn resolution_from_arg(arg: ResolutionArg) -> Resolution {
    match arg {
        ResolutionArg::ClientWins => Resolution::ClientWins,
        ResolutionArg::ServerWins => Resolution::ServerWins,
        ResolutionArg::Merged => Resolution::Merged,
        ResolutionArg::Manual => Resolution::Manual,
    }
}

fn read_payload(
    inline: Option<&str>,
    file: Option<&Path>,
) -> Result<Option<Payload>, CliError> {
    if let Some(raw) = inline {
        return parse_payload(raw).map(Some);
    }
    match file {
        Some(path) => parse_payload(&std::fs::read_to_string(path)?).map(Some),
        None => Ok(None),
    }
}
