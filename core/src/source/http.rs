use futures::future::BoxFuture;
use tracing::debug;

use crate::errors::FetchError;
use crate::source::{FeedClient, FeedEnvelope, Snapshot, SourceId};

const DEFAULT_USER_AGENT: &str = concat!("chart-ingest/", env!("CARGO_PKG_VERSION"));

/// Feed client backed by a shared `reqwest` connection pool.
pub struct HttpFeedClient {
    client: reqwest::Client,
}

impl HttpFeedClient {
    pub fn new(user_agent: Option<&str>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .build()?;
        Ok(Self { client })
    }

    async fn get_snapshot(&self, source_id: &SourceId, url: &str) -> Result<Snapshot, FetchError> {
        let transport = |error| FetchError::Transport {
            source_id: source_id.to_string(),
            error,
        };

        let response = self.client.get(url).send().await.map_err(transport)?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                source_id: source_id.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        debug!(source_id = %source_id, bytes = body.len(), "Received feed body");

        let envelope: FeedEnvelope =
            serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
                source_id: source_id.to_string(),
                reason: e.to_string(),
            })?;

        Ok(envelope.into_snapshot())
    }
}

impl FeedClient for HttpFeedClient {
    fn fetch_snapshot<'a>(
        &'a self,
        source_id: &'a SourceId,
        url: &'a str,
    ) -> BoxFuture<'a, Result<Snapshot, FetchError>> {
        Box::pin(self.get_snapshot(source_id, url))
    }
}
