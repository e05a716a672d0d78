use anyhow::{Context, Result};
use std::env;
use std::sync::Arc;

use chart_ingest::telemetry::init_tracing;
use chart_ingest::{load_config, BatchRunner, HttpFeedClient, SqliteHistoryStore};
use tracing::{error, info};

/// Runs exactly one ingestion pass and exits, for schedulers such as cron,
/// Kubernetes CronJobs or ECS scheduled tasks.
///
/// Usage: `runner-container [CONFIG_PATH]`. Without a path the YAML config is
/// read from `CHART_INGEST_CONFIG`. `DRY_RUN=true` fetches and compares but
/// writes nothing.
///
/// Exits non-zero when the run aborts or when any source failed to ingest.
#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config_path = env::args().nth(1);
    let dry_run = env::var("DRY_RUN").map(|v| v == "true").unwrap_or(false);

    let config = match load_config(config_path.as_deref()).await {
        Ok(config) => config,
        Err(e) => {
            error!(phase = e.phase(), "A fatal error occurred: {}", e);
            return Err(e).context("Failed to load configuration");
        }
    };
    let store = SqliteHistoryStore::open(&config.database_path)
        .context("Failed to open history store")?;
    let client = HttpFeedClient::new(config.user_agent.as_deref())
        .context("Failed to build HTTP client")?;

    let runner = BatchRunner::new(config, Arc::new(client), store).with_dry_run(dry_run);

    let report = match runner.run().await {
        Ok(report) => report,
        Err(e) => {
            error!(phase = e.phase(), "A fatal error occurred: {}", e);
            return Err(e).context("Ingestion run aborted");
        }
    };

    info!(
        "Run complete: {} ingested, {} skipped, {} would ingest, {} failed",
        report.ingested, report.skipped, report.would_ingest, report.failed
    );

    if report.has_failures() {
        anyhow::bail!("{} source(s) failed: {}", report.failed, report.failures().join("; "));
    }
    Ok(())
}
