pub mod sqlite;

use serde::Serialize;

use crate::errors::StoreError;
use crate::source::{Item, SourceId};

/// Header row of one ingested snapshot. Never updated after commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct History {
    pub id: i64,
    pub source_id: SourceId,
    pub normalized_updated_at: String,
    pub source_url: String,
}

/// One persisted chart entry; ordered by `id` within its history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: i64,
    pub history_id: i64,
    pub name: String,
    pub url: String,
    pub artwork_url: String,
    pub artist_name: String,
    pub artist_url: String,
    pub copyright: String,
}

/// A history together with (a prefix of) its resources, as read back by consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredSnapshot {
    pub history: History,
    pub resources: Vec<Resource>,
}

/// Result of looking up the newest history of a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastHistory {
    Found(History),
    NotFound,
}

impl LastHistory {
    pub fn history(&self) -> Option<&History> {
        match self {
            LastHistory::Found(history) => Some(history),
            LastHistory::NotFound => None,
        }
    }
}

/// Persistence of histories and their resources.
///
/// Every write goes through a [`StoreTransaction`] obtained from [`begin`];
/// nothing is visible to readers until that transaction commits.
///
/// [`begin`]: HistoryStore::begin
pub trait HistoryStore {
    type Tx<'a>: StoreTransaction
    where
        Self: 'a;

    fn find_last_history(&self, source_id: &SourceId) -> Result<LastHistory, StoreError>;

    fn begin(&self) -> Result<Self::Tx<'_>, StoreError>;
}

/// An open write transaction. Dropping it without `commit` rolls it back.
pub trait StoreTransaction {
    fn create_history(
        &mut self,
        source_id: &SourceId,
        normalized_updated_at: &str,
        source_url: &str,
    ) -> Result<History, StoreError>;

    fn create_resource(&mut self, history_id: i64, item: &Item) -> Result<(), StoreError>;

    fn commit(self) -> Result<(), StoreError>;

    fn rollback(self) -> Result<(), StoreError>;
}
