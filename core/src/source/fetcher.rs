use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::errors::FetchError;
use crate::source::{FeedClient, FeedMap, SourceId};

/// Fetches every configured source concurrently, one task per source.
///
/// Fail-fast: the first failing source aborts all tasks still in flight and is
/// returned as the only error. Snapshots are only collected by the joining
/// task, so a partial map never escapes.
pub async fn fetch_all<C>(
    client: Arc<C>,
    sources: &BTreeMap<SourceId, String>,
) -> Result<FeedMap, FetchError>
where
    C: FeedClient + ?Sized + 'static,
{
    let mut tasks = JoinSet::new();

    for (source_id, url) in sources {
        let client = Arc::clone(&client);
        let source_id = source_id.clone();
        let url = url.clone();
        tasks.spawn(async move {
            let snapshot = client.fetch_snapshot(&source_id, &url).await?;
            Ok::<_, FetchError>((source_id, snapshot))
        });
    }

    let mut feeds = FeedMap::new();
    while let Some(joined) = tasks.join_next().await {
        let fetched = joined.map_err(FetchError::from).and_then(|result| result);
        match fetched {
            Ok((source_id, snapshot)) => {
                debug!(source_id = %source_id, items = snapshot.items.len(), "Fetched feed");
                feeds.insert(source_id, snapshot);
            }
            Err(e) => {
                error!("Aborting fetch phase: {}", e);
                tasks.abort_all();
                return Err(e);
            }
        }
    }

    info!("Fetched {} feeds", feeds.len());
    Ok(feeds)
}
