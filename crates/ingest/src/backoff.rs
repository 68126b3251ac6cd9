use std::time::Duration;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Reconnect delay: doubles per consecutive failure, capped, reset by a
/// session that reached `Subscribed`.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(max: Duration) -> Self {
        Self {
            current: INITIAL_BACKOFF,
            max: max.max(INITIAL_BACKOFF),
        }
    }

    /// Delay to wait now; advances the delay for the next failure.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = INITIAL_BACKOFF;
    }
}
