use std::time::{Duration, Instant};

/// Per-page idle state. Memory only, never persisted.
#[derive(Debug, Clone, Default)]
pub struct IdleSession {
    repeat_count: u32,
    waiting_for_reply: bool,
    waiting_since: Option<Instant>,
    last_captured_caption: Option<String>,
    cycle: u64,
}

impl IdleSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    pub fn waiting_for_reply(&self) -> bool {
        self.waiting_for_reply
    }

    pub fn waiting_since(&self) -> Option<Instant> {
        self.waiting_since
    }

    pub fn last_captured_caption(&self) -> Option<&str> {
        self.last_captured_caption.as_deref()
    }

    /// Id of the most recent dispatch; 0 before the first one.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn reset_repeats(&mut self) {
        self.repeat_count = 0;
    }

    /// Opens a new cycle: waiting for a reply, previous caption cleared.
    pub fn begin_cycle(&mut self, now: Instant) -> u64 {
        self.cycle += 1;
        self.waiting_for_reply = true;
        self.waiting_since = Some(now);
        self.last_captured_caption = None;
        self.cycle
    }

    pub fn record_dispatch(&mut self) {
        self.repeat_count = self.repeat_count.saturating_add(1);
    }

    /// Consumes the wait. Returns the cycle the caption belongs to, or `None`
    /// when nothing was waiting, so a reply is claimed at most once.
    pub fn claim_reply(&mut self, caption: String) -> Option<u64> {
        if !self.waiting_for_reply {
            return None;
        }
        self.waiting_for_reply = false;
        self.waiting_since = None;
        self.last_captured_caption = Some(caption);
        Some(self.cycle)
    }

    pub fn reply_deadline(&self, timeout: Duration) -> Option<Instant> {
        if !self.waiting_for_reply || timeout.is_zero() {
            return None;
        }
        self.waiting_since
            .and_then(|since| since.checked_add(timeout))
    }

    /// Drops a wait that outlived `timeout`. Returns true when it did.
    pub fn expire_wait(&mut self, now: Instant, timeout: Duration) -> bool {
        match self.reply_deadline(timeout) {
            Some(deadline) if now >= deadline => {
                self.waiting_for_reply = false;
                self.waiting_since = None;
                true
            }
            _ => false,
        }
    }
}
