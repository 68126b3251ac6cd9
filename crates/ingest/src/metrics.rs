//! Pipeline metrics
//!
//! Components record through the `MetricsSink` trait so the host decides where
//! numbers go. `PrometheusMetrics` keeps everything on its own registry; the
//! host exports it (see the `tickflow` binary's `/metrics` route).

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};

/// Capability for recording pipeline metrics.
pub trait MetricsSink: Send + Sync {
    fn inc_rows_written(&self, rows: u64);
    fn inc_rows_failed(&self, rows: u64);
    fn inc_queue_dropped(&self);
    fn inc_messages_dropped(&self);
    fn inc_reconnects(&self);
    fn set_last_flush_size(&self, rows: usize);
    fn set_queue_size(&self, len: usize);
    fn set_ws_connected(&self, connected: bool);
    fn observe_ws_latency_ms(&self, ms: f64);
    fn observe_flush_latency_ms(&self, ms: f64);
}

/// Buckets for end-to-end feed latency (ms)
const WS_LATENCY_BUCKETS: &[f64] = &[
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
];

/// Buckets for a single flush (ms), retries included
const FLUSH_LATENCY_BUCKETS: &[f64] = &[
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0, 10000.0,
];

/// Prometheus-backed metrics on a private registry
#[derive(Clone)]
pub struct PrometheusMetrics {
    pub registry: Registry,
    pub rows_written: IntCounter,
    pub rows_failed: IntCounter,
    pub queue_dropped: IntCounter,
    pub messages_dropped: IntCounter,
    pub reconnects: IntCounter,
    pub last_flush_size: IntGauge,
    pub queue_size: IntGauge,
    pub ws_connected: IntGauge,
    pub ws_latency_ms: Histogram,
    pub flush_latency_ms: Histogram,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let rows_written = IntCounter::new("rows_written_total", "Tick rows committed to storage")?;
        let rows_failed = IntCounter::new(
            "rows_failed_total",
            "Tick rows dropped after exhausting flush retries",
        )?;
        let queue_dropped = IntCounter::new(
            "queue_dropped_total",
            "Validated messages discarded because the queue was full",
        )?;
        let messages_dropped = IntCounter::new(
            "messages_dropped_total",
            "Frames discarded for failing decode or validation",
        )?;
        let reconnects = IntCounter::new(
            "reconnects_total",
            "WebSocket reconnect attempts after a failed session",
        )?;
        let last_flush_size = IntGauge::new("last_flush_size", "Rows in the last successful flush")?;
        let queue_size = IntGauge::new("queue_size", "Messages buffered between connector and writer")?;
        let ws_connected = IntGauge::new(
            "ws_connected",
            "WebSocket subscription status (1=subscribed, 0=not)",
        )?;
        let ws_latency_ms = Histogram::with_opts(
            HistogramOpts::new(
                "ws_latency_ms",
                "Receive time minus exchange timestamp in milliseconds",
            )
            .buckets(WS_LATENCY_BUCKETS.to_vec()),
        )?;
        let flush_latency_ms = Histogram::with_opts(
            HistogramOpts::new("flush_latency_ms", "Successful flush duration in milliseconds")
                .buckets(FLUSH_LATENCY_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(rows_written.clone()))?;
        registry.register(Box::new(rows_failed.clone()))?;
        registry.register(Box::new(queue_dropped.clone()))?;
        registry.register(Box::new(messages_dropped.clone()))?;
        registry.register(Box::new(reconnects.clone()))?;
        registry.register(Box::new(last_flush_size.clone()))?;
        registry.register(Box::new(queue_size.clone()))?;
        registry.register(Box::new(ws_connected.clone()))?;
        registry.register(Box::new(ws_latency_ms.clone()))?;
        registry.register(Box::new(flush_latency_ms.clone()))?;

        Ok(Self {
            registry,
            rows_written,
            rows_failed,
            queue_dropped,
            messages_dropped,
            reconnects,
            last_flush_size,
            queue_size,
            ws_connected,
            ws_latency_ms,
            flush_latency_ms,
        })
    }

    /// Encode the registry to Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
        })
    }
}

impl MetricsSink for PrometheusMetrics {
    fn inc_rows_written(&self, rows: u64) {
        self.rows_written.inc_by(rows);
    }

    fn inc_rows_failed(&self, rows: u64) {
        self.rows_failed.inc_by(rows);
    }

    fn inc_queue_dropped(&self) {
        self.queue_dropped.inc();
    }

    fn inc_messages_dropped(&self) {
        self.messages_dropped.inc();
    }

    fn inc_reconnects(&self) {
        self.reconnects.inc();
    }

    fn set_last_flush_size(&self, rows: usize) {
        self.last_flush_size.set(rows as i64);
    }

    fn set_queue_size(&self, len: usize) {
        self.queue_size.set(len as i64);
    }

    fn set_ws_connected(&self, connected: bool) {
        self.ws_connected.set(i64::from(connected));
    }

    fn observe_ws_latency_ms(&self, ms: f64) {
        self.ws_latency_ms.observe(ms);
    }

    fn observe_flush_latency_ms(&self, ms: f64) {
        self.flush_latency_ms.observe(ms);
    }
}
