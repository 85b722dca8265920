use thiserror::Error;

/// Errors raised by the local embedded store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage engine error: {0}")]
    Engine(#[from] turso::Error),
    #[error("Failed to (de)serialize a stored record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Table '{table}' has no index on column '{column}'")]
    UnknownIndex { table: &'static str, column: String },
    #[error("Schema migration to version {version} failed: {reason}")]
    Migration { version: u32, reason: String },
    #[error("Failed to prepare the database location: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while talking to the remote learning platform.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Failed to build Reqwest client: {0}")]
    ClientBuild(reqwest::Error),
    #[error("Request to the remote server failed: {0}")]
    Request(reqwest::Error),
    #[error("Request to the remote server timed out")]
    Timeout,
    #[error("Remote server responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to deserialize the remote response: {0}")]
    Deserialization(String),
}

impl RemoteError {
    /// Maps a transport error, separating deadline expiry from other failures.
    pub(crate) fn from_send(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else {
            RemoteError::Request(err)
        }
    }

    /// Returns the HTTP status when the server answered with a non-2xx code.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The hard failure of a course download.
///
/// Only the initial metadata fetch and the course row write surface here; every
/// later step is best-effort and reported through `DownloadReport`.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Failed to fetch metadata for course '{course_id}': {source}")]
    Metadata {
        course_id: String,
        source: RemoteError,
    },
    #[error("Failed to cache course '{course_id}' locally: {source}")]
    Store {
        course_id: String,
        source: StoreError,
    },
}

/// Errors raised by the sync engine.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Local store operation failed: {0}")]
    Store(#[from] StoreError),
    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),
    #[error("Outbox payload is malformed: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("Field '{field}' must be a finite number, got {value}")]
    NonFinite { field: &'static str, value: f64 },
}

/// Errors raised by the on-disk media cache.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Failed to download media: {0}")]
    Remote(#[from] RemoteError),
    #[error("Failed to write media to disk: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while wiping the offline cache.
#[derive(Error, Debug)]
pub enum ClearError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Media(#[from] MediaError),
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    General(#[from] config::ConfigError),
}
