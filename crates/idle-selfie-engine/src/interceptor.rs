use std::collections::VecDeque;

use idle_selfie_contracts::settings::IdleSettings;

use crate::host::{ChatHost, ChatMessage, MessageBody, MessageId};
use crate::image::{GeneratedImage, ImageRequest};
use crate::session::IdleSession;

const OWN_MESSAGE_MEMORY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotWaiting,
    NoMessage,
    Incomplete,
    OwnMessage,
    InstructionEcho,
    OtherSpeaker,
}

/// Image work for a claimed reply, run off the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageJob {
    pub cycle: u64,
    pub request: ImageRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
    Ignored(IgnoreReason),
    Published { cycle: u64, body: MessageBody },
    AwaitingImage(ImageJob),
}

#[derive(Debug, Clone)]
struct PendingPublication {
    cycle: u64,
    character: String,
    caption: String,
}

/// Claims the idle cycle's reply from the transcript and replaces it with the
/// final selfie message.
#[derive(Debug, Default)]
pub struct ReplyInterceptor {
    pending: Option<PendingPublication>,
    own_messages: VecDeque<MessageId>,
    instruction: Option<String>,
}

impl ReplyInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers the instruction just dispatched so a visible copy of it is
    /// never mistaken for the reply.
    pub fn arm(&mut self, instruction: &str) {
        self.instruction = Some(instruction.trim().to_string());
    }

    pub fn pending_cycle(&self) -> Option<u64> {
        self.pending.as_ref().map(|pending| pending.cycle)
    }

    pub fn compose(caption: &str, image: Option<GeneratedImage>) -> MessageBody {
        match image {
            Some(image) => MessageBody::with_image(image, caption),
            None => MessageBody::caption_only(caption),
        }
    }

    pub fn observe<H: ChatHost + ?Sized>(
        &mut self,
        session: &mut IdleSession,
        settings: &IdleSettings,
        host: &H,
    ) -> Interception {
        if !session.waiting_for_reply() {
            return Interception::Ignored(IgnoreReason::NotWaiting);
        }
        let Some(message) = host.last_message() else {
            return Interception::Ignored(IgnoreReason::NoMessage);
        };
        let ChatMessage {
            id,
            speaker: Some(speaker),
            text: Some(text),
        } = message
        else {
            return Interception::Ignored(IgnoreReason::Incomplete);
        };
        if self.own_messages.contains(&id) {
            return Interception::Ignored(IgnoreReason::OwnMessage);
        }
        let caption = text.trim().to_string();
        if self.instruction.as_deref() == Some(caption.as_str()) {
            return Interception::Ignored(IgnoreReason::InstructionEcho);
        }
        let character = host.character_name().unwrap_or_default();
        let character = character.trim();
        if character.is_empty() || speaker.trim() != character {
            return Interception::Ignored(IgnoreReason::OtherSpeaker);
        }

        let Some(cycle) = session.claim_reply(caption.clone()) else {
            return Interception::Ignored(IgnoreReason::NotWaiting);
        };
        self.instruction = None;
        // The raw reply never stays in the transcript.
        host.delete_message(id);
        tracing::info!(cycle, message_id = id, "idle reply captured");

        if settings.selfie_image_enabled {
            self.pending = Some(PendingPublication {
                cycle,
                character: character.to_string(),
                caption: caption.clone(),
            });
            return Interception::AwaitingImage(ImageJob {
                cycle,
                request: ImageRequest::from_settings(caption, settings),
            });
        }

        let body = Self::compose(&caption, None);
        self.publish(host, character, &body);
        Interception::Published { cycle, body }
    }

    /// Publishes the pending reply once its image request settled. A result
    /// for a cycle that is no longer pending is dropped.
    pub fn complete<H: ChatHost + ?Sized>(
        &mut self,
        cycle: u64,
        image: Option<GeneratedImage>,
        host: &H,
    ) -> Option<MessageBody> {
        if self.pending_cycle() != Some(cycle) {
            tracing::debug!(cycle, "ignoring late image result");
            return None;
        }
        let pending = self.pending.take()?;
        let body = Self::compose(&pending.caption, image);
        self.publish(host, &pending.character, &body);
        Some(body)
    }

    /// Publishes a still-pending reply caption-only, giving up on its image.
    pub fn flush_pending<H: ChatHost + ?Sized>(&mut self, host: &H) -> Option<(u64, MessageBody)> {
        let pending = self.pending.take()?;
        let body = Self::compose(&pending.caption, None);
        self.publish(host, &pending.character, &body);
        Some((pending.cycle, body))
    }

    fn publish<H: ChatHost + ?Sized>(&mut self, host: &H, character: &str, body: &MessageBody) {
        if let Some(id) = host.publish_as_character(character, body) {
            if self.own_messages.len() == OWN_MESSAGE_MEMORY {
                self.own_messages.pop_front();
            }
            self.own_messages.push_back(id);
        }
    }
}
