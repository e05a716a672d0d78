use serde::Serialize;
use tracing::{error, info, warn};

use crate::change::{normalize, should_ingest, NEVER_UPDATED};
use crate::errors::StoreError;
use crate::source::{Snapshot, SourceId};
use crate::store::{History, HistoryStore, LastHistory, StoreTransaction};

/// What happened to one source during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The feed has not changed since the last stored history.
    Skipped { normalized_updated_at: String },
    /// A new history and all its resources were committed.
    Ingested { history: History, item_count: usize },
    /// Dry run: the feed changed but nothing was written.
    WouldIngest {
        normalized_updated_at: String,
        item_count: usize,
    },
    /// The write was rolled back; nothing from this snapshot is stored.
    Failed { reason: String },
}

/// Decides, per source, whether a snapshot is new and writes it atomically.
///
/// A failed write rolls back the whole snapshot (history and every resource)
/// and is reported as [`SyncOutcome::Failed`]; it never affects other sources.
pub struct Ingestor<'s, S> {
    store: &'s S,
    dry_run: bool,
}

impl<'s, S: HistoryStore> Ingestor<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn sync_one(
        &self,
        source_id: &SourceId,
        snapshot: &Snapshot,
        last: &LastHistory,
    ) -> SyncOutcome {
        let fetched = normalize(&snapshot.updated_at);
        let stored = match last {
            LastHistory::Found(history) => normalize(&history.normalized_updated_at),
            LastHistory::NotFound => NEVER_UPDATED.to_string(),
        };

        if !should_ingest(&fetched, &stored) {
            info!(source_id = %source_id, updated = %fetched, "Feed unchanged, skipping");
            return SyncOutcome::Skipped {
                normalized_updated_at: fetched,
            };
        }

        // Fixed-width timestamps compare correctly as strings.
        if last.history().is_some() && fetched < stored {
            warn!(
                source_id = %source_id,
                "Feed timestamp went backwards ({} -> {}), ingesting anyway",
                stored,
                fetched
            );
        }

        if self.dry_run {
            info!(source_id = %source_id, updated = %fetched, "Dry run, would ingest");
            return SyncOutcome::WouldIngest {
                normalized_updated_at: fetched,
                item_count: snapshot.items.len(),
            };
        }

        match self.write_snapshot(source_id, snapshot, &fetched) {
            Ok(history) => {
                info!(
                    source_id = %source_id,
                    history_id = history.id,
                    items = snapshot.items.len(),
                    "Ingested snapshot"
                );
                SyncOutcome::Ingested {
                    history,
                    item_count: snapshot.items.len(),
                }
            }
            Err(e) => {
                error!(source_id = %source_id, "Ingestion rolled back: {}", e);
                SyncOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Writes one history and its resources inside a single transaction.
    fn write_snapshot(
        &self,
        source_id: &SourceId,
        snapshot: &Snapshot,
        normalized_updated_at: &str,
    ) -> Result<History, StoreError> {
        let mut tx = self.store.begin()?;

        let written = Self::insert_rows(&mut tx, source_id, snapshot, normalized_updated_at);
        match written {
            Ok(history) => {
                tx.commit()?;
                Ok(history)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(source_id = %source_id, "{}", rollback_err);
                }
                Err(e)
            }
        }
    }

    fn insert_rows<T: StoreTransaction>(
        tx: &mut T,
        source_id: &SourceId,
        snapshot: &Snapshot,
        normalized_updated_at: &str,
    ) -> Result<History, StoreError> {
        let history = tx.create_history(source_id, normalized_updated_at, &snapshot.source_url)?;
        for item in &snapshot.items {
            tx.create_resource(history.id, item)?;
        }
        Ok(history)
    }
}
