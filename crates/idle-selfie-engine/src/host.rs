//! Contracts the chat host fulfils for the idle engine.
//!
//! Host actions report nothing back: whether a generation turn actually ran is
//! only visible through later transcript changes.

use idle_selfie_contracts::settings::SendAs;

use crate::image::GeneratedImage;

pub type MessageId = u64;

/// A transcript entry as the host renders it. Either part may be missing
/// while the host is still building the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub speaker: Option<String>,
    pub text: Option<String>,
}

/// Final selfie message: optional image followed by the caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBody {
    pub image: Option<GeneratedImage>,
    pub caption: String,
}

impl MessageBody {
    pub fn caption_only(caption: impl Into<String>) -> Self {
        Self {
            image: None,
            caption: caption.into(),
        }
    }

    pub fn with_image(image: GeneratedImage, caption: impl Into<String>) -> Self {
        Self {
            image: Some(image),
            caption: caption.into(),
        }
    }

    /// Markdown form: an inline image reference, a blank line, then the caption.
    pub fn render(&self) -> String {
        match &self.image {
            Some(image) => format!("![selfie]({})\n\n{}", image.data_uri(), self.caption),
            None => self.caption.clone(),
        }
    }
}

pub trait ChatContext: Send + Sync {
    /// Name of the active character (or the group's current speaker).
    fn character_name(&self) -> Option<String>;

    fn user_name(&self) -> Option<String> {
        None
    }

    /// True when a character or group conversation is open.
    fn has_active_chat(&self) -> bool;

    /// True while the host is still producing a response to a prior message.
    fn is_generating(&self) -> bool;
}

pub trait ChatActions: Send + Sync {
    fn continue_last(&self);
    fn regenerate_last(&self);
    fn impersonate_user(&self);
    fn swipe_next(&self);
    fn send_as_user(&self, text: &str);
    fn send_as_character(&self, name: &str, text: &str);
    fn send_as_narrator(&self, text: &str);
    /// Requests a reply without inserting `text` as a visible message.
    fn send_background_prompt(&self, send_as: SendAs, text: &str);

    fn show_notice(&self, _text: &str) {}
}

pub trait ChatTranscript: Send + Sync {
    fn last_message(&self) -> Option<ChatMessage>;
    fn delete_message(&self, id: MessageId);
    /// Appends `body` attributed to `name`. Hosts that can identify the new
    /// entry return its id.
    fn publish_as_character(&self, name: &str, body: &MessageBody) -> Option<MessageId>;
}

pub trait ChatHost: ChatContext + ChatActions + ChatTranscript {}

impl<T: ChatContext + ChatActions + ChatTranscript + ?Sized> ChatHost for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_only_body_renders_as_caption() {
        let body = MessageBody::caption_only("I grin at the lens.");
        assert_eq!(body.render(), "I grin at the lens.");
    }

    #[test]
    fn image_body_renders_image_before_caption() {
        let image = GeneratedImage::new(vec![1, 2, 3], Some("image/jpeg".to_string()));
        let body = MessageBody::with_image(image, "Golden hour on the pier.");
        let rendered = body.render();
        assert!(rendered.starts_with("![selfie](data:image/jpeg;base64,AQID)"));
        assert!(rendered.ends_with("\n\nGolden hour on the pier."));
    }
}
