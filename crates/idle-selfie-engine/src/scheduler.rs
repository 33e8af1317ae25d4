use std::time::{Duration, Instant};

use idle_selfie_contracts::settings::IdleSettings;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::dispatcher::{DispatchRoute, PromptDispatcher};
use crate::host::{ChatContext, ChatHost};
use crate::session::IdleSession;

/// Countdown length for the next arm.
///
/// With random timing the delay is drawn uniformly from `[timerMin, timer]`
/// seconds (both ends included); otherwise it is exactly `timer` seconds.
pub fn idle_delay<R: Rng + ?Sized>(settings: &IdleSettings, rng: &mut R) -> Duration {
    let fixed = Duration::from_secs(settings.timer);
    let max = settings.timer as f64;
    let min = (settings.timer_min as f64).min(max);
    if !settings.random_time || min >= max {
        return fixed;
    }
    Duration::try_from_secs_f64(rng.gen_range(min..=max)).unwrap_or(fixed)
}

/// Why `fire` did or did not dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    Disabled,
    /// Re-armed without dispatching.
    Deferred(DeferReason),
    Dispatched {
        cycle: u64,
        route: DispatchRoute,
        flavor: Option<String>,
        instruction: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    RepeatLimit,
    HostBusy,
    AwaitingReply,
}

impl DeferReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RepeatLimit => "repeat_limit",
            Self::HostBusy => "host_busy",
            Self::AwaitingReply => "awaiting_reply",
        }
    }
}

/// Single-shot countdown that re-arms itself after every fire. Owns the idle
/// session so collaborators get it by reference.
pub struct IdleScheduler {
    session: IdleSession,
    deadline: Option<Instant>,
    rng: StdRng,
}

impl Default for IdleScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl IdleScheduler {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            session: IdleSession::new(),
            deadline: None,
            rng,
        }
    }

    pub fn session(&self) -> &IdleSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut IdleSession {
        &mut self.session
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Cancels the pending countdown and, when the feature is on and a chat is
    /// open, arms a new one. Returns the armed delay.
    pub fn reset<C: ChatContext + ?Sized>(
        &mut self,
        now: Instant,
        settings: &IdleSettings,
        context: &C,
    ) -> Option<Duration> {
        self.deadline = None;
        if !settings.enabled || !context.has_active_chat() {
            return None;
        }
        let delay = idle_delay(settings, &mut self.rng);
        let Some(deadline) = now.checked_add(delay) else {
            tracing::warn!(delay_secs = delay.as_secs(), "idle delay out of range; not armed");
            return None;
        };
        self.deadline = Some(deadline);
        tracing::debug!(delay_ms = delay.as_millis() as u64, "idle timer armed");
        Some(delay)
    }

    /// Clears the countdown if it has expired. True means `fire` is due.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// First gate that would hold back a dispatch right now, if any.
    pub fn defer_reason<C: ChatContext + ?Sized>(
        &self,
        settings: &IdleSettings,
        context: &C,
    ) -> Option<DeferReason> {
        if settings.repeats != 0 && self.session.repeat_count() >= settings.repeats {
            Some(DeferReason::RepeatLimit)
        } else if context.is_generating() {
            Some(DeferReason::HostBusy)
        } else if self.session.waiting_for_reply() {
            Some(DeferReason::AwaitingReply)
        } else {
            None
        }
    }

    pub fn fire<H: ChatHost + ?Sized>(
        &mut self,
        now: Instant,
        settings: &IdleSettings,
        host: &H,
        dispatcher: &PromptDispatcher,
    ) -> FireOutcome {
        if !settings.enabled {
            return FireOutcome::Disabled;
        }

        if let Some(reason) = self.defer_reason(settings, host) {
            tracing::debug!(reason = reason.as_str(), "idle fire deferred");
            self.reset(now, settings, host);
            return FireOutcome::Deferred(reason);
        }

        let flavor = settings.prompts.choose(&mut self.rng).cloned();
        let character = host.character_name();
        let instruction =
            PromptDispatcher::build_instruction(character.as_deref(), flavor.as_deref());

        let cycle = self.session.begin_cycle(now);
        // A dispatch in flight owns the timeline until it re-arms below.
        self.cancel();
        let route = dispatcher.dispatch(settings, host, &instruction);
        self.session.record_dispatch();
        tracing::info!(
            cycle,
            route = route.as_str(),
            repeat = self.session.repeat_count(),
            "idle selfie prompt dispatched"
        );
        self.reset(now, settings, host);

        FireOutcome::Dispatched {
            cycle,
            route,
            flavor,
            instruction,
        }
    }
}
