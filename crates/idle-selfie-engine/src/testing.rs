use std::sync::{Mutex, MutexGuard};

use idle_selfie_contracts::settings::SendAs;

use crate::host::{
    ChatActions, ChatContext, ChatMessage, ChatTranscript, MessageBody, MessageId,
};

#[derive(Default)]
struct HostState {
    character: Option<String>,
    user: Option<String>,
    active_chat: bool,
    generating: bool,
    calls: Vec<String>,
    transcript_ops: Vec<String>,
    messages: Vec<ChatMessage>,
    published: Vec<(String, MessageBody)>,
    notices: Vec<String>,
    next_id: MessageId,
}

/// In-memory host that records every action it is asked to perform.
#[derive(Default)]
pub(crate) struct RecordingHost {
    state: Mutex<HostState>,
}

impl RecordingHost {
    pub(crate) fn new(character: &str) -> Self {
        Self {
            state: Mutex::new(HostState {
                character: Some(character.to_string()),
                active_chat: true,
                next_id: 1,
                ..HostState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn set_active_chat(&self, active: bool) {
        self.state().active_chat = active;
    }

    pub(crate) fn set_generating(&self, generating: bool) {
        self.state().generating = generating;
    }

    pub(crate) fn set_user_name(&self, name: &str) {
        self.state().user = Some(name.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub(crate) fn transcript_ops(&self) -> Vec<String> {
        self.state().transcript_ops.clone()
    }

    pub(crate) fn messages(&self) -> Vec<ChatMessage> {
        self.state().messages.clone()
    }

    pub(crate) fn published(&self) -> Vec<(String, MessageBody)> {
        self.state().published.clone()
    }

    pub(crate) fn notices(&self) -> Vec<String> {
        self.state().notices.clone()
    }

    pub(crate) fn push_message(&self, speaker: Option<&str>, text: Option<&str>) -> MessageId {
        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;
        state.messages.push(ChatMessage {
            id,
            speaker: speaker.map(str::to_string),
            text: text.map(str::to_string),
        });
        id
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }
}

impl ChatContext for RecordingHost {
    fn character_name(&self) -> Option<String> {
        self.state().character.clone()
    }

    fn user_name(&self) -> Option<String> {
        self.state().user.clone()
    }

    fn has_active_chat(&self) -> bool {
        self.state().active_chat
    }

    fn is_generating(&self) -> bool {
        self.state().generating
    }
}

impl ChatActions for RecordingHost {
    fn continue_last(&self) {
        self.record("continue_last".to_string());
    }

    fn regenerate_last(&self) {
        self.record("regenerate_last".to_string());
    }

    fn impersonate_user(&self) {
        self.record("impersonate_user".to_string());
    }

    fn swipe_next(&self) {
        self.record("swipe_next".to_string());
    }

    fn send_as_user(&self, text: &str) {
        self.record(format!("send_as_user:{text}"));
        self.push_message(Some("User"), Some(text));
    }

    fn send_as_character(&self, name: &str, text: &str) {
        self.record(format!("send_as_character:{name}:{text}"));
        self.push_message(Some(name), Some(text));
    }

    fn send_as_narrator(&self, text: &str) {
        self.record(format!("send_as_narrator:{text}"));
        self.push_message(Some("System"), Some(text));
    }

    fn send_background_prompt(&self, send_as: SendAs, text: &str) {
        self.record(format!("send_background_prompt:{}:{text}", send_as.as_str()));
    }

    fn show_notice(&self, text: &str) {
        self.state().notices.push(text.to_string());
    }
}

impl ChatTranscript for RecordingHost {
    fn last_message(&self) -> Option<ChatMessage> {
        self.state().messages.last().cloned()
    }

    fn delete_message(&self, id: MessageId) {
        let mut state = self.state();
        state.messages.retain(|message| message.id != id);
        state.transcript_ops.push(format!("delete:{id}"));
    }

    fn publish_as_character(&self, name: &str, body: &MessageBody) -> Option<MessageId> {
        let id = self.push_message(Some(name), Some(&body.render()));
        let mut state = self.state();
        state.published.push((name.to_string(), body.clone()));
        state.transcript_ops.push(format!("publish:{id}"));
        Some(id)
    }
}
