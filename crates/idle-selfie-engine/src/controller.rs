use std::sync::Arc;
use std::time::{Duration, Instant};

use idle_selfie_contracts::events::{EventPayload, EventWriter};
use idle_selfie_contracts::settings::IdleSettings;
use rand::rngs::StdRng;
use serde_json::{json, Value};

use crate::activity::{ActivityMonitor, ActivitySignal};
use crate::dispatcher::PromptDispatcher;
use crate::host::ChatHost;
use crate::image::GeneratedImage;
use crate::interceptor::{ImageJob, Interception, ReplyInterceptor};
use crate::scheduler::{FireOutcome, IdleScheduler};
use crate::session::IdleSession;

pub const ENABLED_NOTICE: &str = "Idle Selfie mode enabled.";
pub const DISABLED_NOTICE: &str = "Idle Selfie mode disabled.";

/// Idle cycle state machine for one chat page.
///
/// Every entry point takes the current instant, so the controller never reads
/// the clock itself. The runtime feeds it real time; tests feed it synthetic
/// instants.
pub struct IdleController {
    settings: IdleSettings,
    host: Arc<dyn ChatHost>,
    scheduler: IdleScheduler,
    activity: ActivityMonitor,
    interceptor: ReplyInterceptor,
    dispatcher: PromptDispatcher,
    events: EventWriter,
}

impl IdleController {
    pub fn new(settings: IdleSettings, host: Arc<dyn ChatHost>, events: EventWriter) -> Self {
        Self::from_parts(settings, host, events, IdleScheduler::new())
    }

    pub fn with_rng(
        settings: IdleSettings,
        host: Arc<dyn ChatHost>,
        events: EventWriter,
        rng: StdRng,
    ) -> Self {
        Self::from_parts(settings, host, events, IdleScheduler::with_rng(rng))
    }

    fn from_parts(
        settings: IdleSettings,
        host: Arc<dyn ChatHost>,
        events: EventWriter,
        scheduler: IdleScheduler,
    ) -> Self {
        Self {
            settings: settings.normalized(),
            host,
            scheduler,
            activity: ActivityMonitor::default(),
            interceptor: ReplyInterceptor::new(),
            dispatcher: PromptDispatcher,
            events,
        }
    }

    pub fn settings(&self) -> &IdleSettings {
        &self.settings
    }

    pub fn session(&self) -> &IdleSession {
        self.scheduler.session()
    }

    pub fn host(&self) -> &Arc<dyn ChatHost> {
        &self.host
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.scheduler.deadline()
    }

    pub fn is_listening(&self) -> bool {
        self.activity.is_attached()
    }

    /// Page load: attach listeners and arm when the feature is on.
    pub fn activate(&mut self, now: Instant) {
        self.sync_enabled(now, "activate");
    }

    pub fn on_activity(&mut self, signal: ActivitySignal, now: Instant) {
        self.activity.observe(signal, now);
    }

    /// Checks the newest transcript entry for the cycle's reply. Returns the
    /// image job to run when the reply was claimed and needs a picture.
    pub fn on_transcript_changed(&mut self, _now: Instant) -> Option<ImageJob> {
        let outcome = self.interceptor.observe(
            self.scheduler.session_mut(),
            &self.settings,
            self.host.as_ref(),
        );
        match outcome {
            Interception::Ignored(_) => None,
            Interception::Published { cycle, body } => {
                self.journal(
                    "reply_captured",
                    json!({ "cycle": cycle, "awaiting_image": false }),
                );
                self.journal_published(cycle, body.image.is_some());
                None
            }
            Interception::AwaitingImage(job) => {
                self.journal(
                    "reply_captured",
                    json!({ "cycle": job.cycle, "awaiting_image": true }),
                );
                Some(job)
            }
        }
    }

    /// Delivers a finished image request. False when the cycle was no longer
    /// pending and the result was dropped.
    pub fn complete_capture(&mut self, cycle: u64, image: Option<GeneratedImage>) -> bool {
        match self.interceptor.complete(cycle, image, self.host.as_ref()) {
            Some(body) => {
                self.journal_published(cycle, body.image.is_some());
                true
            }
            None => false,
        }
    }

    /// Runs whatever became due by `now`: matured activity, an expired reply
    /// wait, then the countdown.
    pub fn tick(&mut self, now: Instant) -> Option<FireOutcome> {
        if self.activity.poll(now) {
            self.scheduler.session_mut().reset_repeats();
            self.arm(now, "activity");
        }

        let reply_timeout = self.reply_timeout();
        if self.scheduler.session_mut().expire_wait(now, reply_timeout) {
            tracing::warn!(
                cycle = self.session().cycle(),
                timeout_secs = self.settings.reply_timeout,
                "no reply arrived for the idle prompt"
            );
            self.journal(
                "reply_timeout",
                json!({
                    "cycle": self.session().cycle(),
                    "timeout_secs": self.settings.reply_timeout,
                }),
            );
            self.arm(now, "reply_timeout");
        }

        if !self.scheduler.take_due(now) {
            return None;
        }
        if self.settings.enabled
            && self
                .scheduler
                .defer_reason(&self.settings, self.host.as_ref())
                .is_none()
        {
            if let Some((cycle, body)) = self.interceptor.flush_pending(self.host.as_ref()) {
                tracing::debug!(cycle, "published pending selfie without its image");
                self.journal_published(cycle, body.image.is_some());
            }
        }

        let outcome = self.scheduler.fire(
            now,
            &self.settings,
            self.host.as_ref(),
            &self.dispatcher,
        );
        match &outcome {
            FireOutcome::Disabled => {}
            FireOutcome::Deferred(reason) => {
                self.journal("idle_deferred", json!({ "reason": reason.as_str() }));
            }
            FireOutcome::Dispatched {
                cycle,
                route,
                flavor,
                instruction,
            } => {
                self.interceptor.arm(instruction);
                self.journal(
                    "idle_dispatched",
                    json!({
                        "cycle": cycle,
                        "mode": self.settings.dispatch_mode.as_str(),
                        "route": route.as_str(),
                        "flavor": flavor,
                        "repeat_count": self.session().repeat_count(),
                    }),
                );
            }
        }
        Some(outcome)
    }

    /// Flips the feature and returns the confirmation shown to the user.
    pub fn toggle(&mut self, now: Instant) -> String {
        self.settings.enabled = !self.settings.enabled;
        self.sync_enabled(now, "toggle");
        self.journal("idle_toggled", json!({ "enabled": self.settings.enabled }));
        let notice = if self.settings.enabled {
            ENABLED_NOTICE
        } else {
            DISABLED_NOTICE
        };
        tracing::info!(enabled = self.settings.enabled, "{notice}");
        self.host.show_notice(notice);
        notice.to_string()
    }

    /// Adopts edited settings. The countdown restarts with the new values.
    pub fn apply_settings(&mut self, settings: IdleSettings, now: Instant) {
        self.settings = settings.normalized();
        self.sync_enabled(now, "settings");
    }

    /// Earliest instant at which `tick` has something to do.
    pub fn next_wake(&self) -> Option<Instant> {
        [
            self.scheduler.deadline(),
            self.activity.due_at(),
            self.session().reply_deadline(self.reply_timeout()),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.reply_timeout)
    }

    fn sync_enabled(&mut self, now: Instant, reason: &str) {
        if self.settings.enabled {
            self.activity.attach();
            self.arm(now, reason);
        } else {
            self.activity.detach();
            self.scheduler.cancel();
        }
    }

    fn arm(&mut self, now: Instant, reason: &str) {
        if let Some(delay) = self.scheduler.reset(now, &self.settings, self.host.as_ref()) {
            self.journal(
                "idle_armed",
                json!({ "reason": reason, "delay_ms": delay.as_millis() as u64 }),
            );
        }
    }

    fn journal_published(&self, cycle: u64, with_image: bool) {
        tracing::info!(cycle, with_image, "selfie published");
        self.journal(
            "selfie_published",
            json!({ "cycle": cycle, "with_image": with_image }),
        );
    }

    fn journal(&self, event_type: &str, payload: Value) {
        let payload = match payload {
            Value::Object(map) => map,
            _ => EventPayload::new(),
        };
        self.events.record(event_type, payload);
    }
}
