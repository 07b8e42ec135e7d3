use clap::Command;
use ghsync_core::{Context, GitHubClient, PgWarehouse, Result, SyncOrchestrator};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let _matches = Command::new("ghsync")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Incrementally replicate GitHub issues, comments and repository metadata into a SQL warehouse")
        .get_matches();

    let start_time = std::time::Instant::now();

    // Initialize context from environment
    let ctx = match Context::from_env() {
        Ok(ctx) => ctx,
        Err(err) => {
            error!("{}", err);
            std::process::exit(1);
        }
    };

    if ctx.ctx_out {
        info!("Context: {:?}", ctx);
    }

    // A bearer credential is the only hard requirement
    if let Err(err) = ctx.require_token() {
        error!("{}", err);
        std::process::exit(1);
    }

    info!("Starting GitHub ingestion for {} repositories...", ctx.repos.len());

    let warehouse = match PgWarehouse::connect(&ctx).await {
        Ok(warehouse) => warehouse,
        Err(err) => {
            error!("Failed to connect to warehouse: {}", err);
            std::process::exit(1);
        }
    };

    let client = GitHubClient::new(&ctx)?;
    let orchestrator = SyncOrchestrator::new(Arc::new(ctx), client, Arc::new(warehouse));

    let report = match orchestrator.run().await {
        Ok(report) => report,
        Err(err) => {
            error!("Run aborted: {}", err);
            std::process::exit(1);
        }
    };

    let elapsed = start_time.elapsed();
    info!("All jobs completed in {:?}", elapsed);
    info!("Statistics:");
    info!("  Repository metadata rows: {}", report.metadata_rows);
    info!("  Resource rows ingested: {}", report.total_rows());
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(stats) => info!(
                "  ✓ {} {}: {} rows, {} batches ({})",
                outcome.entity, outcome.resource, stats.rows_ingested, stats.batches, stats.mode
            ),
            Err(err) => error!("  ✗ {} {}: {}", outcome.entity, outcome.resource, err),
        }
    }

    if !report.is_success() {
        error!("{} of {} tasks failed", report.failed().count(), report.outcomes.len());
        std::process::exit(1);
    }

    Ok(())
}
