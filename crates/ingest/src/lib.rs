//! tickflow-ingest: market data feed ingestion
//!
//! A `FeedConnector` keeps a WebSocket subscription alive and pushes validated
//! frames into a bounded `TickQueue`; a `BatchWriter` drains that queue into a
//! `TickStore` in batches. Both report through an injected `MetricsSink`.

pub mod backoff;
pub mod config;
pub mod connector;
pub mod error;
pub mod message;
pub mod messages;
pub mod metrics;
pub mod queue;
pub mod store;
pub mod traits;
pub mod websocket;
pub mod writer;

pub use config::IngestConfig;
pub use connector::{ConnectionState, FeedConnector, FrameOutcome};
pub use error::{
    AlreadyRunningError, ConfigError, ConnectorError, PersistenceError, QueueFullError,
    ValidationError,
};
pub use message::{FeedMessage, Level2Change, Level2Update, TickRow, ValidatedTick};
pub use metrics::{MetricsSink, PrometheusMetrics};
pub use queue::TickQueue;
pub use store::{InsertStatement, MemoryTickStore};
#[cfg(feature = "postgres")]
pub use store::PgTickStore;
pub use traits::{FeedSession, FeedTransport, StoreSession, TickStore};
pub use websocket::{ExchangeWebSocket, WsTransport};
pub use writer::{BatchWriter, FlushOutcome};
