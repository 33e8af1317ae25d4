//! Idle Selfie engine: the idle cycle state machine and its collaborators.
//!
//! A chat host implements [`host::ChatHost`]; an [`controller::IdleController`]
//! drives the cycle (countdown, dispatch, reply capture, optional image) and an
//! [`runtime::IdleRuntime`] runs it on its own thread.

pub mod activity;
pub mod controller;
pub mod dispatcher;
pub mod host;
pub mod image;
pub mod interceptor;
pub mod runtime;
pub mod scheduler;
pub mod session;
#[cfg(test)]
mod testing;

pub use activity::{ActivityKind, ActivityMonitor, ActivitySignal, ACTIVITY_DEBOUNCE};
pub use controller::{IdleController, DISABLED_NOTICE, ENABLED_NOTICE};
pub use dispatcher::{DispatchRoute, PromptDispatcher};
pub use host::{
    ChatActions, ChatContext, ChatHost, ChatMessage, ChatTranscript, MessageBody, MessageId,
};
pub use image::{GeminiImageClient, GeneratedImage, ImageGenerator, ImageRequest};
pub use interceptor::{IgnoreReason, ImageJob, Interception, ReplyInterceptor};
pub use runtime::{IdleRuntime, RuntimeHandle, Signal};
pub use scheduler::{idle_delay, DeferReason, FireOutcome, IdleScheduler};
pub use session::IdleSession;

/// Fresh id for an event journal session.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
