use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("subscription failed: {0}")]
    SubscribeFailed(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("read timeout after {0} seconds")]
    ReadTimeout(u64),
    #[error("connection closed")]
    Closed,
}

/// A frame that could not be turned into a queue item.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("decode failed: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("malformed {kind} message: {source}")]
    Malformed {
        kind: &'static str,
        source: serde_json::Error,
    },
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid price: {0}")]
    InvalidPrice(String),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("unsupported message: {0}")]
    Unsupported(&'static str),
}

#[derive(Error, Debug)]
#[error("queue full (capacity {capacity})")]
pub struct QueueFullError {
    pub capacity: usize,
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("pool error: {0}")]
    Pool(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
#[error("{0} is already running")]
pub struct AlreadyRunningError(pub &'static str);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for PersistenceError {
    fn from(e: tokio_postgres::Error) -> Self {
        PersistenceError::Database(e.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<deadpool_postgres::PoolError> for PersistenceError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        PersistenceError::Pool(e.to_string())
    }
}
