//! Connector -> queue -> writer -> store, driven by a scripted feed.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_decimal_macros::dec;
use tickflow_ingest::{
    BatchWriter, ConnectionState, ConnectorError, FeedConnector, FeedSession, FeedTransport,
    IngestConfig, InsertStatement, MemoryTickStore, PersistenceError, PrometheusMetrics,
    StoreSession, TickQueue, TickRow, TickStore,
};

/// Serves each scripted session once, then refuses further connections
struct ScriptedFeed {
    sessions: Mutex<VecDeque<Vec<String>>>,
}

impl ScriptedFeed {
    fn new(sessions: Vec<Vec<&str>>) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(
                sessions
                    .into_iter()
                    .map(|frames| frames.into_iter().map(String::from).collect())
                    .collect(),
            ),
        })
    }
}

struct ScriptedSession {
    frames: VecDeque<String>,
    last: bool,
}

#[async_trait]
impl FeedTransport for ScriptedFeed {
    async fn connect(&self) -> Result<Box<dyn FeedSession>, ConnectorError> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.pop_front() {
            Some(frames) => Ok(Box::new(ScriptedSession {
                frames: frames.into(),
                last: sessions.is_empty(),
            })),
            None => Err(ConnectorError::ConnectionFailed("no more sessions".to_string())),
        }
    }
}

#[async_trait]
impl FeedSession for ScriptedSession {
    async fn subscribe(&mut self, _symbols: &[String]) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn recv(&mut self) -> Result<String, ConnectorError> {
        match self.frames.pop_front() {
            Some(frame) => Ok(frame),
            // The final session stays open until shutdown
            None if self.last => std::future::pending().await,
            None => Err(ConnectorError::Closed),
        }
    }

    async fn ping(&mut self) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        Ok(())
    }
}

/// Rejects the first `failures` sessions at commit time
struct FlakyStore {
    inner: MemoryTickStore,
    failures: Mutex<u32>,
}

struct FlakySession {
    inner: Box<dyn StoreSession>,
    fail: bool,
}

#[async_trait]
impl TickStore for FlakyStore {
    async fn begin(&self) -> Result<Box<dyn StoreSession>, PersistenceError> {
        let fail = {
            let mut failures = self.failures.lock().unwrap();
            let fail = *failures > 0;
            *failures = failures.saturating_sub(1);
            fail
        };
        Ok(Box::new(FlakySession {
            inner: self.inner.begin().await?,
            fail,
        }))
    }
}

#[async_trait]
impl StoreSession for FlakySession {
    async fn execute(
        &mut self,
        stmt: &InsertStatement,
        rows: &[TickRow],
    ) -> Result<(), PersistenceError> {
        self.inner.execute(stmt, rows).await
    }

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError> {
        if self.fail {
            return Err(PersistenceError::Database("deadlock detected".to_string()));
        }
        self.inner.commit().await
    }
}

fn ticker(symbol: &str, price: &str) -> String {
    format!(
        r#"{{"type":"ticker","product_id":"{}","price":"{}","last_size":"0.5","time":"2026-02-06T12:00:00.000000Z"}}"#,
        symbol, price
    )
}

struct Pipeline {
    connector: FeedConnector,
    writer: BatchWriter,
    metrics: Arc<PrometheusMetrics>,
}

fn pipeline(config: IngestConfig, feed: Arc<ScriptedFeed>, store: Arc<dyn TickStore>) -> Pipeline {
    let config = Arc::new(config);
    let queue = Arc::new(TickQueue::new(config.queue_max_size));
    let metrics = Arc::new(PrometheusMetrics::new().unwrap());
    let connector = FeedConnector::new(
        Arc::clone(&config),
        feed,
        Arc::clone(&queue),
        metrics.clone(),
    );
    let writer = BatchWriter::new(config, queue, store, metrics.clone());
    Pipeline {
        connector,
        writer,
        metrics,
    }
}

fn config() -> IngestConfig {
    let mut config = IngestConfig::new(vec!["BTC-USD".to_string(), "ETH-USD".to_string()]);
    config.batch_size = 2;
    config
}

#[tokio::test(start_paused = true)]
async fn test_ticks_reach_store_in_order() {
    let l2 = r#"{"type":"level2update","product_id":"BTC-USD","changes":[["sell","97001.00","1.2"]],"time":"2026-02-06T12:00:00.100000Z"}"#;
    let t1 = ticker("BTC-USD", "97000.50");
    let t2 = ticker("ETH-USD", "3200.10");
    let t3 = ticker("BTC-USD", "97002.00");
    let feed = ScriptedFeed::new(vec![vec![t1.as_str(), l2, "{broken", t2.as_str(), t3.as_str()]]);
    let store = MemoryTickStore::new();
    let p = pipeline(config(), feed, Arc::new(store.clone()));

    p.writer.start().unwrap();
    p.connector.start().unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(p.connector.state(), ConnectionState::Subscribed);
    let rows = store.rows().await;
    let prices: Vec<_> = rows.iter().map(|r| r.price).collect();
    assert_eq!(prices, vec![dec!(97000.50), dec!(3200.10), dec!(97002.00)]);
    assert_eq!(rows[0].volume, dec!(0.5));
    assert_eq!(p.metrics.messages_dropped.get(), 1);
    assert_eq!(p.metrics.rows_written.get(), 3);

    p.connector.stop().await;
    p.writer.stop().await;
    assert_eq!(p.connector.state(), ConnectionState::Closing);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_resumes_ingest() {
    let a = ticker("BTC-USD", "1.0");
    let b = ticker("BTC-USD", "2.0");
    let feed = ScriptedFeed::new(vec![vec![a.as_str()], vec![b.as_str()]]);
    let store = MemoryTickStore::new();
    let p = pipeline(config(), feed, Arc::new(store.clone()));

    p.writer.start().unwrap();
    p.connector.start().unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(p.metrics.reconnects.get(), 1);
    assert_eq!(p.metrics.ws_connected.get(), 1);

    p.connector.stop().await;
    p.writer.stop().await;
    assert_eq!(store.len().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_store_outage_recovers() {
    let frames: Vec<String> = (0..4).map(|i| ticker("BTC-USD", &format!("{}.0", i + 1))).collect();
    let feed = ScriptedFeed::new(vec![frames.iter().map(String::as_str).collect()]);
    let store = Arc::new(FlakyStore {
        inner: MemoryTickStore::new(),
        failures: Mutex::new(2),
    });
    let p = pipeline(config(), feed, store.clone());

    p.writer.start().unwrap();
    p.connector.start().unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    p.connector.stop().await;
    p.writer.stop().await;

    assert_eq!(store.inner.len().await, 4);
    assert_eq!(p.metrics.rows_written.get(), 4);
    assert_eq!(p.metrics.rows_failed.get(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_flushes_partial_batch() {
    let a = ticker("ETH-USD", "3200.00");
    let feed = ScriptedFeed::new(vec![vec![a.as_str()]]);
    let store = MemoryTickStore::new();
    let mut cfg = config();
    cfg.batch_size = 100;
    cfg.flush_interval_seconds = 60.0;
    let p = pipeline(cfg, feed, Arc::new(store.clone()));

    p.writer.start().unwrap();
    p.connector.start().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store.is_empty().await);

    p.connector.stop().await;
    p.writer.stop().await;

    assert_eq!(store.len().await, 1);
    assert_eq!(p.metrics.last_flush_size.get(), 1);
}
