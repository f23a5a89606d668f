//! hims-sync - Operator CLI for the offline sync queue
//!
//! Inspect queue health, work the conflict log, and replay push batches
//! against a local sync database.

mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::resolve_db_path;
use crate::commands::completions::run_completions;
use crate::commands::conflicts::{run_conflicts, run_resolve, ResolveArgs};
use crate::commands::entities::run_entities;
use crate::commands::feed::{run_pull, run_push, PullArgs};
use crate::commands::queue::{run_reprocess, run_retry_failed, run_status};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hims_sync=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let facility = cli.facility.as_deref();
    let client = cli.client.as_deref();
    let user = cli.user.as_deref();

    match cli.command {
        Commands::Status { json } => run_status(facility, client, json, &db_path).await,
        Commands::Conflicts { json } => run_conflicts(facility, client, json, &db_path).await,
        Commands::Resolve {
            id,
            resolution,
            payload,
            payload_file,
            notes,
            json,
        } => {
            let args = ResolveArgs {
                id: &id,
                resolution,
                payload: payload.as_deref(),
                payload_file: payload_file.as_deref(),
                notes,
            };
            run_resolve(args, user, json, &db_path).await
        }
        Commands::RetryFailed => run_retry_failed(facility, client, &db_path).await,
        Commands::Reprocess { json } => run_reprocess(facility, client, json, &db_path).await,
        Commands::Pull {
            since,
            entity_types,
            limit,
            json,
        } => {
            let args = PullArgs {
                since,
                entity_types,
                limit,
            };
            run_pull(args, facility, client, json, &db_path).await
        }
        Commands::Push { file, json } => run_push(&file, user, json, &db_path).await,
        Commands::Entities { json } => run_entities(json),
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
    }
}
