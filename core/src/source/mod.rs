pub mod fetcher;
pub mod http;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::errors::FetchError;

/// Key of one configured chart feed, e.g. `albums-top100`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One chart entry as published by a feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Item {
    pub artist_name: String,
    pub artist_url: String,
    #[serde(rename = "artworkUrl100")]
    pub artwork_url: String,
    pub copyright: String,
    pub name: String,
    pub url: String,
}

/// The decoded body of one feed response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Raw `feed.updated` value; RFC3339 or empty.
    pub updated_at: String,
    /// Canonical feed URL as reported in `feed.id`.
    pub source_url: String,
    pub items: Vec<Item>,
}

/// Every configured source's snapshot for one run.
pub type FeedMap = BTreeMap<SourceId, Snapshot>;

/// Wire shape of a feed response: `{ "feed": { "updated", "id", "results" } }`.
#[derive(Debug, Deserialize)]
pub(crate) struct FeedEnvelope {
    feed: FeedOutline,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FeedOutline {
    updated: String,
    id: String,
    results: Vec<Item>,
}

impl FeedEnvelope {
    pub(crate) fn into_snapshot(self) -> Snapshot {
        let FeedOutline {
            updated,
            id,
            results,
        } = self.feed;
        Snapshot {
            updated_at: updated,
            source_url: id,
            items: results,
        }
    }
}

/// Fetches the current snapshot of one feed.
///
/// Implementations must be shareable across the tasks of one fetch phase.
pub trait FeedClient: Send + Sync {
    fn fetch_snapshot<'a>(
        &'a self,
        source_id: &'a SourceId,
        url: &'a str,
    ) -> BoxFuture<'a, Result<Snapshot, FetchError>>;
}

impl<T> FeedClient for Arc<T>
where
    T: FeedClient + ?Sized,
{
    fn fetch_snapshot<'a>(
        &'a self,
        source_id: &'a SourceId,
        url: &'a str,
    ) -> BoxFuture<'a, Result<Snapshot, FetchError>> {
        (**self).fetch_snapshot(source_id, url)
    }
}
