use async_trait::async_trait;

use crate::error::{ConnectorError, PersistenceError};
use crate::message::TickRow;
use crate::store::InsertStatement;

/// Opens sessions to the upstream feed (WebSocket, test scripts, ...)
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Perform the connection handshake
    async fn connect(&self) -> Result<Box<dyn FeedSession>, ConnectorError>;
}

/// One live upstream connection
#[async_trait]
pub trait FeedSession: Send {
    /// Send the subscription request for the given product ids
    async fn subscribe(&mut self, symbols: &[String]) -> Result<(), ConnectorError>;

    /// Next data frame. Control frames are handled internally.
    async fn recv(&mut self) -> Result<String, ConnectorError>;

    /// Keepalive ping
    async fn ping(&mut self) -> Result<(), ConnectorError>;

    /// Close with a normal-closure code
    async fn close(&mut self) -> Result<(), ConnectorError>;
}

/// Session factory for the time-series store
#[async_trait]
pub trait TickStore: Send + Sync {
    /// Acquire a transaction-scoped session. Dropping it without `commit`
    /// discards everything executed on it.
    async fn begin(&self) -> Result<Box<dyn StoreSession>, PersistenceError>;
}

#[async_trait]
pub trait StoreSession: Send {
    async fn execute(
        &mut self,
        stmt: &InsertStatement,
        rows: &[TickRow],
    ) -> Result<(), PersistenceError>;

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError>;
}
