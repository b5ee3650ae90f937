use std::time::{Duration, Instant};

/// How long a typing marker stays up without a follow-up event
pub const TYPING_TIMEOUT: Duration = Duration::from_secs(3);

/// Debounced "counterpart is typing" marker. There is no stop event: the
/// marker expires `timeout` after the last ping.
#[derive(Debug, Clone)]
pub struct TypingIndicator {
    timeout: Duration,
    last_ping: Option<Instant>,
}

impl Default for TypingIndicator {
    fn default() -> Self {
        Self::with_timeout(TYPING_TIMEOUT)
    }
}

impl TypingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            last_ping: None,
        }
    }

    /// Records a typing event received at `now`, extending the marker
    pub fn ping(&mut self, now: Instant) {
        self.last_ping = Some(now);
    }

    pub fn is_active(&self, now: Instant) -> bool {
        match self.last_ping {
            Some(at) => now.saturating_duration_since(at) < self.timeout,
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.last_ping = None;
    }
}
