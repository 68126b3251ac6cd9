//! Feed connector
//!
//! Keeps one upstream session alive, reconnecting with exponential backoff,
//! and pushes validated frames into the bounded queue without ever waiting on
//! it. Failures are visible only through metrics and logs.

use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::backoff::Backoff;
use crate::config::IngestConfig;
use crate::error::{AlreadyRunningError, ConnectorError};
use crate::message::{FeedMessage, ValidatedTick};
use crate::messages::parse_frame;
use crate::metrics::MetricsSink;
use crate::queue::TickQueue;
use crate::traits::{FeedSession, FeedTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
    /// Terminal; only reached through `stop()`
    Closing,
}

/// What happened to a single inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Enqueued,
    /// Valid, but the queue was full and the message was discarded
    QueueFull,
    /// Unknown message type
    Ignored,
    /// Failed decode or validation
    Invalid,
}

enum SessionEnd {
    Stopped,
    Failed(ConnectorError),
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct FeedConnector {
    inner: Arc<ConnectorInner>,
    task: Mutex<Option<RunningTask>>,
}

struct ConnectorInner {
    config: Arc<IngestConfig>,
    transport: Arc<dyn FeedTransport>,
    queue: Arc<TickQueue>,
    metrics: Arc<dyn MetricsSink>,
    state: watch::Sender<ConnectionState>,
}

impl FeedConnector {
    pub fn new(
        config: Arc<IngestConfig>,
        transport: Arc<dyn FeedTransport>,
        queue: Arc<TickQueue>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ConnectorInner {
                config,
                transport,
                queue,
                metrics,
                state,
            }),
            task: Mutex::new(None),
        }
    }

    /// Spawn the connection loop. Must be called from a tokio runtime.
    pub fn start(&self) -> Result<(), AlreadyRunningError> {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = task.as_ref() {
            if !running.handle.is_finished() {
                return Err(AlreadyRunningError("feed connector"));
            }
        }

        let cancel = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { inner.run(token).await });

        info!(symbols = ?self.inner.config.symbols, "Feed connector started");
        *task = Some(RunningTask { cancel, handle });
        Ok(())
    }

    /// Signal shutdown and wait for the current session to close.
    pub async fn stop(&self) {
        let running = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(RunningTask { cancel, handle }) = running {
            cancel.cancel();
            if let Err(e) = handle.await {
                error!(error = %e, "Feed connector task panicked");
            }
            info!("Feed connector stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Process one inbound text frame
    pub fn handle_frame(&self, raw: &str) -> FrameOutcome {
        self.inner.handle_frame(raw)
    }

    /// Next validated tick from the queue. Level2 updates are skipped.
    /// Returns `None` once `cancel` fires.
    pub async fn next_tick(&self, cancel: &CancellationToken) -> Option<ValidatedTick> {
        loop {
            let msg = self.inner.queue.pop(cancel).await?;
            self.inner.metrics.set_queue_size(self.inner.queue.len());
            match msg {
                FeedMessage::Ticker(tick) => return Some(tick),
                FeedMessage::Level2(_) => continue,
            }
        }
    }
}

impl ConnectorInner {
    fn set_state(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = ?prev, to = ?next, "Connection state changed");
        }
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut backoff = Backoff::new(self.config.max_backoff());
        let mut reconnecting = false;

        loop {
            if reconnecting {
                self.metrics.inc_reconnects();
            }
            self.set_state(ConnectionState::Connecting);

            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.transport.connect() => result,
            };

            let end = match connected {
                Ok(session) => self.run_session(session, &cancel, &mut backoff).await,
                Err(e) => SessionEnd::Failed(e),
            };

            match end {
                SessionEnd::Stopped => break,
                SessionEnd::Failed(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    let delay = backoff.next_delay();
                    warn!(
                        error = %e,
                        delay_secs = delay.as_secs(),
                        "Feed connection failed, reconnecting after backoff"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    reconnecting = true;
                }
            }
        }

        self.set_state(ConnectionState::Closing);
        self.metrics.set_ws_connected(false);
    }

    async fn run_session(
        &self,
        mut session: Box<dyn FeedSession>,
        cancel: &CancellationToken,
        backoff: &mut Backoff,
    ) -> SessionEnd {
        if let Err(e) = session.subscribe(&self.config.symbols).await {
            return SessionEnd::Failed(e);
        }

        self.set_state(ConnectionState::Subscribed);
        self.metrics.set_ws_connected(true);
        backoff.reset();
        info!(symbols = ?self.config.symbols, "Subscribed to ticker channel");

        let period = self.config.ping_interval();
        let mut ping = interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let end = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.set_state(ConnectionState::Closing);
                    if let Err(e) = session.close().await {
                        warn!(error = %e, "Error closing feed session");
                    }
                    break SessionEnd::Stopped;
                }
                _ = ping.tick() => {
                    trace!("Sending WebSocket ping");
                    if let Err(e) = session.ping().await {
                        break SessionEnd::Failed(e);
                    }
                }
                frame = session.recv() => match frame {
                    Ok(text) => {
                        self.handle_frame(&text);
                    }
                    Err(e) => break SessionEnd::Failed(e),
                },
            }
        };

        self.metrics.set_ws_connected(false);
        end
    }

    fn handle_frame(&self, raw: &str) -> FrameOutcome {
        let received_at = Utc::now();

        let msg = match parse_frame(raw) {
            Ok(Some(msg)) => msg,
            Ok(None) => return FrameOutcome::Ignored,
            Err(e) => {
                self.metrics.inc_messages_dropped();
                debug!(error = %e, "Dropping invalid frame");
                return FrameOutcome::Invalid;
            }
        };

        let latency_ms = (received_at - msg.timestamp())
            .num_microseconds()
            .map(|us| us as f64 / 1000.0)
            .unwrap_or(0.0)
            .max(0.0);

        let outcome = match self.queue.try_push(msg) {
            Ok(()) => FrameOutcome::Enqueued,
            Err(e) => {
                self.metrics.inc_queue_dropped();
                trace!(error = %e, "Queue full, dropping newest message");
                FrameOutcome::QueueFull
            }
        };

        self.metrics.observe_ws_latency_ms(latency_ms);
        self.metrics.set_queue_size(self.queue.len());
        outcome
    }
}
