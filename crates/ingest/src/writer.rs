//! Batch persistence writer
//!
//! Drains the queue into bounded batches and commits each batch in one store
//! session. A failing batch is retried with linear backoff and dropped once
//! `max_retries` is exhausted.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::IngestConfig;
use crate::error::{AlreadyRunningError, PersistenceError};
use crate::message::{FeedMessage, TickRow};
use crate::metrics::MetricsSink;
use crate::queue::TickQueue;
use crate::store::InsertStatement;
use crate::traits::TickStore;

/// Base delay between flush attempts; attempt `n` waits `n * RETRY_STEP`.
const RETRY_STEP: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing buffered
    Empty,
    /// Rows committed
    Persisted(usize),
    /// Rows discarded after the last retry failed
    Dropped(usize),
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct BatchWriter {
    inner: Arc<WriterInner>,
    task: Mutex<Option<RunningTask>>,
}

struct WriterInner {
    config: Arc<IngestConfig>,
    queue: Arc<TickQueue>,
    store: Arc<dyn TickStore>,
    metrics: Arc<dyn MetricsSink>,
    stmt: InsertStatement,
}

impl BatchWriter {
    pub fn new(
        config: Arc<IngestConfig>,
        queue: Arc<TickQueue>,
        store: Arc<dyn TickStore>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let stmt = InsertStatement::new(config.table.clone());
        Self {
            inner: Arc::new(WriterInner {
                config,
                queue,
                store,
                metrics,
                stmt,
            }),
            task: Mutex::new(None),
        }
    }

    /// Spawn the drain loop. Must be called from a tokio runtime.
    pub fn start(&self) -> Result<(), AlreadyRunningError> {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = task.as_ref() {
            if !running.handle.is_finished() {
                return Err(AlreadyRunningError("batch writer"));
            }
        }

        let cancel = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { inner.run(token).await });

        info!(
            batch_size = self.inner.config.batch_size,
            flush_interval_secs = self.inner.config.flush_interval_seconds,
            table = %self.inner.stmt.table(),
            "Batch writer started"
        );
        *task = Some(RunningTask { cancel, handle });
        Ok(())
    }

    /// Signal shutdown and wait until everything still queued is flushed
    /// (or dropped after retries).
    pub async fn stop(&self) {
        let running = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(RunningTask { cancel, handle }) = running {
            cancel.cancel();
            if let Err(e) = handle.await {
                error!(error = %e, "Batch writer task panicked");
            }
            info!("Batch writer stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }
}

impl WriterInner {
    async fn run(&self, cancel: CancellationToken) {
        let batch_size = self.config.batch_size;
        let interval = self.config.flush_interval();
        let mut batch: Vec<TickRow> = Vec::with_capacity(batch_size);
        let mut last_flush = Instant::now();

        loop {
            let wait = if batch.is_empty() {
                interval
            } else {
                interval.saturating_sub(last_flush.elapsed())
            };

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                msg = self.queue.pop_timeout(wait) => msg,
            };

            if let Some(msg) = next {
                self.metrics.set_queue_size(self.queue.len());
                self.append(&mut batch, msg);
            }

            if !batch.is_empty()
                && (batch.len() >= batch_size || last_flush.elapsed() >= interval)
            {
                self.flush_now(&mut batch).await;
                last_flush = Instant::now();
            }
        }

        debug!(buffered = batch.len(), queued = self.queue.len(), "Draining queue before exit");
        while let Some(msg) = self.queue.try_pop().await {
            self.append(&mut batch, msg);
            if batch.len() >= batch_size {
                self.flush_now(&mut batch).await;
            }
        }
        self.metrics.set_queue_size(self.queue.len());
        self.flush_now(&mut batch).await;
    }

    fn append(&self, batch: &mut Vec<TickRow>, msg: FeedMessage) {
        let kind = msg.kind();
        match TickRow::try_from(msg) {
            Ok(row) => batch.push(row),
            Err(e) => trace!(kind, error = %e, "Skipping queue item with no tick row"),
        }
    }

    /// Flush `batch` under the retry policy. The batch is empty afterwards.
    async fn flush_now(&self, batch: &mut Vec<TickRow>) -> FlushOutcome {
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }

        let rows = batch.len();
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            match self.write_batch(batch).await {
                Ok(()) => {
                    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                    self.metrics.observe_flush_latency_ms(elapsed_ms);
                    self.metrics.inc_rows_written(rows as u64);
                    self.metrics.set_last_flush_size(rows);
                    batch.clear();
                    debug!(rows, attempts = attempts + 1, elapsed_ms, "Flushed batch");
                    return FlushOutcome::Persisted(rows);
                }
                Err(e) => {
                    attempts += 1;
                    if attempts > self.config.max_retries {
                        self.metrics.inc_rows_failed(rows as u64);
                        batch.clear();
                        error!(
                            rows,
                            attempts,
                            error = %e,
                            "Dropping batch after exhausting retries"
                        );
                        return FlushOutcome::Dropped(rows);
                    }

                    let delay = RETRY_STEP * attempts;
                    warn!(
                        rows,
                        attempt = attempts,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Flush failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn write_batch(&self, rows: &[TickRow]) -> Result<(), PersistenceError> {
        let mut session = self.store.begin().await?;
        session.execute(&self.stmt, rows).await?;
        session.commit().await
    }
}
