use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chart_ingest::telemetry::init_tracing;
use chart_ingest::{load_config, BatchReport, BatchRunner, HttpFeedClient, SqliteHistoryStore};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Invocation payload. Scheduled (EventBridge) events carry none of these
/// fields, so they run with the config from `CHART_INGEST_CONFIG`.
#[derive(Debug, Default, Deserialize)]
struct LambdaRequest {
    #[serde(default)]
    pub config_path: Option<String>,
    #[serde(default)]
    pub dry_run: Option<bool>,
}

#[derive(Debug, Serialize)]
struct LambdaResponse {
    pub status: String,
    pub runtime_seconds: f64,
    pub errors: Vec<String>,
    pub report: Option<BatchReport>,
}

impl LambdaResponse {
    fn from_result(result: anyhow::Result<BatchReport>, started: Instant) -> Self {
        let runtime_seconds = started.elapsed().as_secs_f64();
        match result {
            Ok(report) => {
                let status = if report.has_failures() { "partial" } else { "success" };
                LambdaResponse {
                    status: status.to_string(),
                    runtime_seconds,
                    errors: report.failures(),
                    report: Some(report),
                }
            }
            Err(e) => LambdaResponse {
                status: "error".to_string(),
                runtime_seconds,
                errors: vec![format!("{:#}", e)],
                report: None,
            },
        }
    }
}

async fn run_batch(request: &LambdaRequest) -> anyhow::Result<BatchReport> {
    let config = load_config(request.config_path.as_deref())
        .await
        .context("Failed to load configuration")?;
    let store = SqliteHistoryStore::open(&config.database_path)
        .context("Failed to open history store")?;
    let client = HttpFeedClient::new(config.user_agent.as_deref())
        .context("Failed to build HTTP client")?;

    let runner = BatchRunner::new(config, Arc::new(client), store)
        .with_dry_run(request.dry_run.unwrap_or(false));
    let report = runner.run().await.context("Ingestion run aborted")?;
    Ok(report)
}

async fn lambda_handler(event: LambdaEvent<LambdaRequest>) -> Result<LambdaResponse, Error> {
    let started = Instant::now();
    let request = event.payload;

    let result = run_batch(&request).await;
    if let Err(e) = &result {
        error!("Chart ingestion failed: {:#}", e);
    }

    let response = LambdaResponse::from_result(result, started);
    info!(status = %response.status, "Invocation finished");
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();
    lambda_runtime::run(service_fn(lambda_handler)).await
}
