//! Exchange WebSocket message types
//!
//! Frames are tagged by a `type` field. Only `ticker` and `level2update` carry
//! data we keep; every other type (`subscriptions`, `heartbeat`, `error`, ...)
//! and frames with no string `type` at all decode to `Other` and are ignored.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ValidationError;
use crate::message::{FeedMessage, Level2Change, Level2Update, ValidatedTick};

/// Fields of a `ticker` frame. Optional so that a missing field is a
/// validation failure rather than a decode failure.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerFields {
    pub product_id: Option<String>,
    pub price: Option<Value>,
    pub time: Option<String>,
    pub last_size: Option<Value>,
    pub volume_24h: Option<Value>,
}

/// Fields of a `level2update` frame. Change entries are kept as raw JSON:
/// sizes and prices may arrive as strings or numbers.
#[derive(Debug, Clone, Deserialize)]
pub struct Level2Fields {
    pub product_id: Option<String>,
    pub changes: Option<Vec<Vec<Value>>>,
    pub time: Option<String>,
}

/// Decoded inbound frame, dispatched on its `type` field.
#[derive(Debug, Clone)]
pub enum RawFeedMessage {
    Ticker(TickerFields),
    Level2Update(Level2Fields),
    /// Missing, non-string or unknown `type`
    Other,
}

impl RawFeedMessage {
    /// Only invalid JSON is a decode error here.
    pub fn decode(raw: &str) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        let kind = match value.get("type").and_then(Value::as_str) {
            Some("ticker") => "ticker",
            Some("level2update") => "level2update",
            _ => return Ok(RawFeedMessage::Other),
        };

        let malformed = |source: serde_json::Error| ValidationError::Malformed { kind, source };
        if kind == "ticker" {
            serde_json::from_value(value)
                .map(RawFeedMessage::Ticker)
                .map_err(malformed)
        } else {
            serde_json::from_value(value)
                .map(RawFeedMessage::Level2Update)
                .map_err(malformed)
        }
    }

    /// Validate and normalize. `Ok(None)` means the frame is ignored.
    pub fn validate(self) -> Result<Option<FeedMessage>, ValidationError> {
        match self {
            RawFeedMessage::Ticker(fields) => {
                let symbol = required_symbol(fields.product_id)?;
                let price = fields.price.ok_or(ValidationError::MissingField("price"))?;
                let price = parse_decimal(&price)?;
                let timestamp = parse_time(fields.time)?;
                // Prefer the trade size; fall back to rolling volume.
                let volume = match fields.last_size.or(fields.volume_24h) {
                    Some(v) => parse_decimal(&v)?,
                    None => Decimal::ZERO,
                };
                Ok(Some(FeedMessage::Ticker(ValidatedTick {
                    symbol,
                    timestamp,
                    price,
                    volume,
                })))
            }
            RawFeedMessage::Level2Update(fields) => {
                let symbol = required_symbol(fields.product_id)?;
                let changes = fields
                    .changes
                    .ok_or(ValidationError::MissingField("changes"))?;
                let timestamp = parse_time(fields.time)?;
                Ok(Some(FeedMessage::Level2(Level2Update {
                    symbol,
                    timestamp,
                    changes: changes.iter().map(|entry| level2_change(entry)).collect(),
                })))
            }
            RawFeedMessage::Other => Ok(None),
        }
    }
}

/// Decode and validate a single text frame.
pub fn parse_frame(raw: &str) -> Result<Option<FeedMessage>, ValidationError> {
    RawFeedMessage::decode(raw)?.validate()
}

/// Subscription request for the ticker channel.
pub fn subscribe_request(symbols: &[String]) -> Value {
    serde_json::json!({
        "type": "subscribe",
        "channel": "ticker",
        "product_ids": symbols,
    })
}

/// `[side, price, size]`; missing positions become empty strings.
fn level2_change(entry: &[Value]) -> Level2Change {
    let field = |i: usize| match entry.get(i) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    Level2Change {
        side: field(0),
        price: field(1),
        size: field(2),
    }
}

fn required_symbol(product_id: Option<String>) -> Result<String, ValidationError> {
    match product_id {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(ValidationError::MissingField("product_id")),
    }
}

fn parse_time(time: Option<String>) -> Result<DateTime<Utc>, ValidationError> {
    let time = time.ok_or(ValidationError::MissingField("time"))?;
    DateTime::parse_from_rfc3339(&time)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ValidationError::InvalidTimestamp(time))
}

/// Prices arrive either as JSON strings or numbers.
fn parse_decimal(value: &Value) -> Result<Decimal, ValidationError> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => return Err(ValidationError::InvalidPrice(other.to_string())),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| ValidationError::InvalidPrice(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const TICKER_MESSAGE: &str = r#"{"type":"ticker","sequence":37475248783,"product_id":"BTC-USD","price":"97000.50","open_24h":"95000.00","volume_24h":"12345.678","low_24h":"94000.00","high_24h":"98000.00","best_bid":"97000.49","best_ask":"97000.51","side":"buy","time":"2026-02-06T12:00:00.000000Z","trade_id":370843401,"last_size":"0.0125"}"#;
    const LEVEL2_MESSAGE: &str = r#"{"type":"level2update","product_id":"ETH-USD","changes":[["buy","3200.50","1.5"],["sell","3201.00","0"]],"time":"2026-02-06T12:00:01.250000Z"}"#;
    const SUBSCRIPTIONS_MESSAGE: &str = r#"{"type":"subscriptions","channels":[{"name":"ticker","product_ids":["BTC-USD"]}]}"#;

    #[test]
    fn test_parse_ticker() {
        let msg = parse_frame(TICKER_MESSAGE).unwrap().unwrap();
        match msg {
            FeedMessage::Ticker(tick) => {
                assert_eq!(tick.symbol, "BTC-USD");
                assert_eq!(tick.price, dec!(97000.50));
                assert_eq!(tick.volume, dec!(0.0125));
                assert_eq!(tick.timestamp.to_rfc3339(), "2026-02-06T12:00:00+00:00");
            }
            other => panic!("Expected ticker, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_ticker_numeric_price() {
        let raw = r#"{"type":"ticker","product_id":"ETH-USD","price":3200.25,"time":"2026-02-06T12:00:00Z"}"#;
        match parse_frame(raw).unwrap().unwrap() {
            FeedMessage::Ticker(tick) => {
                assert_eq!(tick.price, dec!(3200.25));
                assert_eq!(tick.volume, Decimal::ZERO);
            }
            other => panic!("Expected ticker, got {:?}", other),
        }
    }

    #[test]
    fn test_ticker_volume_falls_back_to_24h() {
        let raw = r#"{"type":"ticker","product_id":"ETH-USD","price":"1","volume_24h":"42.5","time":"2026-02-06T12:00:00Z"}"#;
        match parse_frame(raw).unwrap().unwrap() {
            FeedMessage::Ticker(tick) => assert_eq!(tick.volume, dec!(42.5)),
            other => panic!("Expected ticker, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_level2update() {
        match parse_frame(LEVEL2_MESSAGE).unwrap().unwrap() {
            FeedMessage::Level2(update) => {
                assert_eq!(update.symbol, "ETH-USD");
                assert_eq!(update.changes.len(), 2);
                assert_eq!(update.changes[0].side, "buy");
                assert_eq!(update.changes[1].size, "0");
            }
            other => panic!("Expected level2 update, got {:?}", other),
        }
    }

    #[test]
    fn test_other_types_ignored() {
        assert!(parse_frame(SUBSCRIPTIONS_MESSAGE).unwrap().is_none());
        assert!(parse_frame(r#"{"type":"heartbeat","sequence":1}"#).unwrap().is_none());
    }

    #[test]
    fn test_ticker_missing_fields() {
        let no_price = r#"{"type":"ticker","product_id":"BTC-USD","time":"2026-02-06T12:00:00Z"}"#;
        assert!(matches!(
            parse_frame(no_price),
            Err(ValidationError::MissingField("price"))
        ));

        let no_product = r#"{"type":"ticker","price":"1.0","time":"2026-02-06T12:00:00Z"}"#;
        assert!(matches!(
            parse_frame(no_product),
            Err(ValidationError::MissingField("product_id"))
        ));

        let no_time = r#"{"type":"ticker","product_id":"BTC-USD","price":"1.0"}"#;
        assert!(matches!(
            parse_frame(no_time),
            Err(ValidationError::MissingField("time"))
        ));
    }

    #[test]
    fn test_level2_missing_changes() {
        let raw = r#"{"type":"level2update","product_id":"ETH-USD","time":"2026-02-06T12:00:00Z"}"#;
        assert!(matches!(
            parse_frame(raw),
            Err(ValidationError::MissingField("changes"))
        ));
    }

    #[test]
    fn test_invalid_price_and_time() {
        let bad_price = r#"{"type":"ticker","product_id":"BTC-USD","price":"abc","time":"2026-02-06T12:00:00Z"}"#;
        assert!(matches!(
            parse_frame(bad_price),
            Err(ValidationError::InvalidPrice(_))
        ));

        let bad_time = r#"{"type":"ticker","product_id":"BTC-USD","price":"1","time":"yesterday"}"#;
        assert!(matches!(
            parse_frame(bad_time),
            Err(ValidationError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            parse_frame("{not json"),
            Err(ValidationError::Decode(_))
        ));
    }

    #[test]
    fn test_frame_without_string_type_ignored() {
        assert!(parse_frame(r#"{"product_id":"BTC-USD","price":"1"}"#)
            .unwrap()
            .is_none());
        assert!(parse_frame(r#"{"type":5}"#).unwrap().is_none());
        assert!(parse_frame(r#"{"type":null,"product_id":"BTC-USD"}"#)
            .unwrap()
            .is_none());
        assert!(parse_frame("[1,2,3]").unwrap().is_none());
    }

    #[test]
    fn test_level2_numeric_changes() {
        let raw = r#"{"type":"level2update","product_id":"BTC-USD","changes":[["buy",97000.0,0.5],["sell","97001.00"]],"time":"2026-02-06T12:00:00Z"}"#;
        match parse_frame(raw).unwrap().unwrap() {
            FeedMessage::Level2(update) => {
                assert_eq!(update.changes[0].side, "buy");
                assert_eq!(update.changes[0].price, "97000.0");
                assert_eq!(update.changes[0].size, "0.5");
                assert_eq!(update.changes[1].price, "97001.00");
                assert_eq!(update.changes[1].size, "");
            }
            other => panic!("Expected level2 update, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_field_type_is_malformed() {
        let raw = r#"{"type":"ticker","product_id":42,"price":"1","time":"2026-02-06T12:00:00Z"}"#;
        assert!(matches!(
            parse_frame(raw),
            Err(ValidationError::Malformed { kind: "ticker", .. })
        ));

        let raw = r#"{"type":"level2update","product_id":"BTC-USD","changes":"none","time":"2026-02-06T12:00:00Z"}"#;
        assert!(matches!(
            parse_frame(raw),
            Err(ValidationError::Malformed { kind: "level2update", .. })
        ));
    }

    #[test]
    fn test_subscribe_request_shape() {
        let req = subscribe_request(&["BTC-USD".to_string(), "ETH-USD".to_string()]);
        assert_eq!(req["type"], "subscribe");
        assert_eq!(req["channel"], "ticker");
        assert_eq!(req["product_ids"][1], "ETH-USD");
    }
}
