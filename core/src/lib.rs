pub mod change;
pub mod config;
pub mod errors;
pub mod ingestor;
pub mod runner;
pub mod source;
pub mod store;
pub mod telemetry;

pub use config::{load_config, ChartConfig};
pub use errors::{IngestionError, Result};
pub use ingestor::{Ingestor, SyncOutcome};
pub use runner::BatchRunner;
pub use source::http::HttpFeedClient;
pub use store::sqlite::SqliteHistoryStore;
pub use telemetry::BatchReport;
