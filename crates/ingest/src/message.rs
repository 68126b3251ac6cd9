use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::ValidationError;

/// Normalized ticker observation. Only built from a validated `ticker` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedTick {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub volume: Decimal,
}

/// One `[side, price, size]` entry of a level2 update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Level2Change {
    pub side: String,
    pub price: String,
    pub size: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Level2Update {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub changes: Vec<Level2Change>,
}

/// Queue item: a validated frame waiting for the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    Ticker(ValidatedTick),
    Level2(Level2Update),
}

impl FeedMessage {
    pub fn symbol(&self) -> &str {
        match self {
            FeedMessage::Ticker(t) => &t.symbol,
            FeedMessage::Level2(u) => &u.symbol,
        }
    }

    /// Exchange-side timestamp carried by the frame
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            FeedMessage::Ticker(t) => t.timestamp,
            FeedMessage::Level2(u) => u.timestamp,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FeedMessage::Ticker(_) => "ticker",
            FeedMessage::Level2(_) => "level2update",
        }
    }
}

/// Storage row handed to the tick store. Exactly the four persisted columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickRow {
    pub symbol: String,
    pub ts: DateTime<Utc>,
    pub price: Decimal,
    pub volume: Decimal,
}

impl From<ValidatedTick> for TickRow {
    fn from(tick: ValidatedTick) -> Self {
        Self {
            symbol: tick.symbol,
            ts: tick.timestamp,
            price: tick.price,
            volume: tick.volume,
        }
    }
}

impl TryFrom<FeedMessage> for TickRow {
    type Error = ValidationError;

    fn try_from(msg: FeedMessage) -> Result<Self, Self::Error> {
        match msg {
            FeedMessage::Ticker(tick) => Ok(tick.into()),
            FeedMessage::Level2(_) => Err(ValidationError::Unsupported("level2update has no price")),
        }
    }
}
