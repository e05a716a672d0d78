use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::ingestor::SyncOutcome;
use crate::source::SourceId;

/// Used when `RUST_LOG` is unset; covers the library and both runner binaries.
const DEFAULT_FILTER: &str = "chart_ingest=info,runner_container=info,bootstrap=info";

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source_id: SourceId,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}

/// Per-source outcomes of one batch run, in processing order.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchReport {
    pub sources: Vec<SourceReport>,
    pub ingested: usize,
    pub skipped: usize,
    pub would_ingest: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn record(&mut self, source_id: SourceId, outcome: SyncOutcome) {
        match &outcome {
            SyncOutcome::Ingested { .. } => self.ingested += 1,
            SyncOutcome::Skipped { .. } => self.skipped += 1,
            SyncOutcome::WouldIngest { .. } => self.would_ingest += 1,
            SyncOutcome::Failed { .. } => self.failed += 1,
        }
        self.sources.push(SourceReport { source_id, outcome });
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn outcome(&self, source_id: &SourceId) -> Option<&SyncOutcome> {
        self.sources
            .iter()
            .find(|report| &report.source_id == source_id)
            .map(|report| &report.outcome)
    }

    /// Failure reasons, prefixed with their source.
    pub fn failures(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter_map(|report| match &report.outcome {
                SyncOutcome::Failed { reason } => Some(format!("{}: {}", report.source_id, reason)),
                _ => None,
            })
            .collect()
    }
}
