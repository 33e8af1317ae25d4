use std::time::{Duration, Instant};

pub const ACTIVITY_DEBOUNCE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Click,
    KeyPress,
    KeyDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySignal {
    pub kind: ActivityKind,
    /// Set when the signal came from the host's own "continue" control, which
    /// the continuation dispatch mode clicks on the user's behalf.
    pub from_continue_control: bool,
}

impl ActivitySignal {
    pub fn click() -> Self {
        Self {
            kind: ActivityKind::Click,
            from_continue_control: false,
        }
    }

    pub fn key_press() -> Self {
        Self {
            kind: ActivityKind::KeyPress,
            from_continue_control: false,
        }
    }

    pub fn key_down() -> Self {
        Self {
            kind: ActivityKind::KeyDown,
            from_continue_control: false,
        }
    }

    pub fn continue_click() -> Self {
        Self {
            kind: ActivityKind::Click,
            from_continue_control: true,
        }
    }
}

/// Trailing-edge debounce over interaction signals.
///
/// Only the last signal of a burst counts: it matures once `window` has passed
/// without another signal. A burst whose last signal came from the continue
/// control is dropped.
#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    attached: bool,
    window: Duration,
    pending: Option<(ActivitySignal, Instant)>,
}

impl Default for ActivityMonitor {
    fn default() -> Self {
        Self::new(ACTIVITY_DEBOUNCE)
    }
}

impl ActivityMonitor {
    pub fn new(window: Duration) -> Self {
        Self {
            attached: false,
            window,
            pending: None,
        }
    }

    pub fn attach(&mut self) {
        self.attached = true;
    }

    pub fn detach(&mut self) {
        self.attached = false;
        self.pending = None;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn observe(&mut self, signal: ActivitySignal, now: Instant) {
        if !self.attached {
            return;
        }
        self.pending = Some((signal, now + self.window));
    }

    pub fn due_at(&self) -> Option<Instant> {
        self.pending.map(|(_, due)| due)
    }

    /// True when a debounced burst matured and counts as user activity.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.pending {
            Some((signal, due)) if now >= due => {
                self.pending = None;
                !signal.from_continue_control
            }
            _ => false,
        }
    }
}
