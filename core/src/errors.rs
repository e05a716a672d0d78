use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch phase aborted: {0}")]
    Fetch(#[from] FetchError),

    #[error("History store error: {0}")]
    Store(#[from] StoreError),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Failed to load configuration from {origin}: {error}")]
    LoadFailed {
        origin: String,
        #[source]
        error: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Failure of a single feed request. Any of these aborts the whole fetch phase.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request for source {source_id} failed: {error}")]
    Transport {
        source_id: String,
        #[source]
        error: reqwest::Error,
    },

    #[error("Source {source_id} answered with HTTP status {status}")]
    Status { source_id: String, status: u16 },

    #[error("Failed to decode feed for source {source_id}: {reason}")]
    Decode { source_id: String, reason: String },

    #[error("Fetch task failed: {reason}")]
    Task { reason: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open history store: {reason}")]
    Connection { reason: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Transaction error: {reason}")]
    Transaction { reason: String },
}

pub type Result<T> = std::result::Result<T, IngestionError>;

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Invalid {
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for FetchError {
    fn from(err: tokio::task::JoinError) -> Self {
        FetchError::Task {
            reason: err.to_string(),
        }
    }
}

impl FetchError {
    /// The source whose request failed, when the failure is tied to one.
    pub fn source_id(&self) -> Option<&str> {
        match self {
            FetchError::Transport { source_id, .. }
            | FetchError::Status { source_id, .. }
            | FetchError::Decode { source_id, .. } => Some(source_id),
            FetchError::Task { .. } => None,
        }
    }
}

impl IngestionError {
    /// Short label used in logs and in the Lambda response.
    pub fn phase(&self) -> &'static str {
        match self {
            IngestionError::Config(_) => "config",
            IngestionError::Fetch(_) => "fetch",
            IngestionError::Store(_) => "store",
            IngestionError::Generic(_) => "generic",
        }
    }
}
