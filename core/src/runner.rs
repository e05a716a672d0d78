use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};

use crate::config::ChartConfig;
use crate::errors::{IngestionError, Result, StoreError};
use crate::ingestor::Ingestor;
use crate::source::fetcher::fetch_all;
use crate::source::{FeedClient, SourceId};
use crate::store::{HistoryStore, LastHistory};
use crate::telemetry::BatchReport;

/// Newest stored history per configured source.
pub type HistoryMap = BTreeMap<SourceId, LastHistory>;

/// Drives one complete pass: fetch every feed, load prior state, then ingest
/// source by source.
pub struct BatchRunner<C: ?Sized, S> {
    config: ChartConfig,
    client: Arc<C>,
    store: S,
    dry_run: bool,
}

impl<C, S> BatchRunner<C, S>
where
    C: FeedClient + ?Sized + 'static,
    S: HistoryStore,
{
    pub fn new(config: ChartConfig, client: Arc<C>, store: S) -> Self {
        Self {
            config,
            client,
            store,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs the batch once.
    ///
    /// A failed fetch or history lookup aborts the run before anything is
    /// written. Write failures only mark their own source as failed.
    pub async fn run(&self) -> Result<BatchReport> {
        let started = Instant::now();
        info!(
            sources = self.config.sources.len(),
            dry_run = self.dry_run,
            "Starting chart ingestion run"
        );

        let feeds = fetch_all(Arc::clone(&self.client), &self.config.sources).await?;
        let histories = self.load_histories()?;

        let ingestor = Ingestor::new(&self.store).dry_run(self.dry_run);
        let mut report = BatchReport::default();

        for source_id in self.config.sources.keys() {
            let (Some(snapshot), Some(last)) = (feeds.get(source_id), histories.get(source_id))
            else {
                // fetch_all and load_histories both cover every configured source.
                return Err(IngestionError::Generic(anyhow::anyhow!(
                    "no fetched state for source {source_id}"
                )));
            };
            let outcome = ingestor.sync_one(source_id, snapshot, last);
            report.record(source_id.clone(), outcome);
        }

        info!(
            ingested = report.ingested,
            skipped = report.skipped,
            would_ingest = report.would_ingest,
            failed = report.failed,
            "Chart ingestion run finished in {:?}",
            started.elapsed()
        );
        for failure in report.failures() {
            error!("Source failed: {}", failure);
        }

        Ok(report)
    }

    /// One lookup per configured source. `NotFound` is expected for new
    /// sources; any other store error is fatal.
    fn load_histories(&self) -> std::result::Result<HistoryMap, StoreError> {
        let mut histories = HistoryMap::new();
        for source_id in self.config.sources.keys() {
            let last = self.store.find_last_history(source_id)?;
            histories.insert(source_id.clone(), last);
        }
        Ok(histories)
    }
}
