use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use idle_selfie_contracts::events::EventWriter;
use idle_selfie_contracts::settings::{DispatchMode, IdleSettings, SendAs};
use idle_selfie_engine::{
    ActivitySignal, ChatActions, ChatContext, ChatMessage, ChatTranscript, DeferReason,
    FireOutcome, GeneratedImage, IdleController, MessageBody, MessageId,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Default)]
struct Page {
    actions: Vec<String>,
    messages: Vec<ChatMessage>,
    next_id: MessageId,
}

struct StubHost {
    character: String,
    page: Mutex<Page>,
}

impl StubHost {
    fn new(character: &str) -> Arc<Self> {
        Arc::new(Self {
            character: character.to_string(),
            page: Mutex::new(Page::default()),
        })
    }

    fn actions(&self) -> Vec<String> {
        self.page.lock().unwrap().actions.clone()
    }

    fn messages(&self) -> Vec<ChatMessage> {
        self.page.lock().unwrap().messages.clone()
    }

    fn reply(&self, text: &str) {
        self.append(&self.character, text);
    }

    fn append(&self, speaker: &str, text: &str) -> MessageId {
        let mut page = self.page.lock().unwrap();
        page.next_id += 1;
        let id = page.next_id;
        page.messages.push(ChatMessage {
            id,
            speaker: Some(speaker.to_string()),
            text: Some(text.to_string()),
        });
        id
    }

    fn act(&self, action: String) {
        self.page.lock().unwrap().actions.push(action);
    }
}

impl ChatContext for StubHost {
    fn character_name(&self) -> Option<String> {
        Some(self.character.clone())
    }

    fn has_active_chat(&self) -> bool {
        true
    }

    fn is_generating(&self) -> bool {
        false
    }
}

impl ChatActions for StubHost {
    fn continue_last(&self) {
        self.act("continue".to_string());
    }

    fn regenerate_last(&self) {
        self.act("regenerate".to_string());
    }

    fn impersonate_user(&self) {
        self.act("impersonate".to_string());
    }

    fn swipe_next(&self) {
        self.act("swipe".to_string());
    }

    fn send_as_user(&self, text: &str) {
        self.act(format!("user:{text}"));
        self.append("You", text);
    }

    fn send_as_character(&self, name: &str, text: &str) {
        self.act(format!("char:{name}"));
        self.append(name, text);
    }

    fn send_as_narrator(&self, text: &str) {
        self.act("narrator".to_string());
        self.append("Narrator", text);
    }

    fn send_background_prompt(&self, send_as: SendAs, text: &str) {
        self.act(format!("background:{}:{}", send_as.as_str(), text.is_empty()));
    }
}

impl ChatTranscript for StubHost {
    fn last_message(&self) -> Option<ChatMessage> {
        self.page.lock().unwrap().messages.last().cloned()
    }

    fn delete_message(&self, id: MessageId) {
        self.page
            .lock()
            .unwrap()
            .messages
            .retain(|message| message.id != id);
    }

    fn publish_as_character(&self, name: &str, body: &MessageBody) -> Option<MessageId> {
        Some(self.append(name, &body.render()))
    }
}

fn controller_for(host: &Arc<StubHost>, settings: IdleSettings) -> IdleController {
    IdleController::with_rng(
        settings,
        host.clone(),
        EventWriter::disabled("idle-cycle"),
        StdRng::seed_from_u64(42),
    )
}

/// Advances to the armed deadline and ticks there.
fn run_to_deadline(controller: &mut IdleController) -> (Instant, Option<FireOutcome>) {
    let deadline = controller.deadline().expect("countdown armed");
    (deadline, controller.tick(deadline))
}

#[test]
fn repeat_limit_caps_dispatches_until_activity() {
    let host = StubHost::new("Mira");
    let mut controller = controller_for(
        &host,
        IdleSettings {
            enabled: true,
            timer: 120,
            timer_min: 60,
            random_time: true,
            repeats: 2,
            ..IdleSettings::default()
        },
    );
    let start = Instant::now();
    controller.activate(start);

    let mut dispatches = 0;
    let mut last = start;
    for _ in 0..3 {
        let armed_at = last;
        let (at, outcome) = run_to_deadline(&mut controller);
        let waited = at - armed_at;
        assert!(waited >= Duration::from_secs(60) && waited <= Duration::from_secs(120));
        match outcome {
            Some(FireOutcome::Dispatched { .. }) => {
                dispatches += 1;
                host.reply("Caught mid-laugh.");
                controller.on_transcript_changed(at);
            }
            Some(FireOutcome::Deferred(reason)) => assert_eq!(reason, DeferReason::RepeatLimit),
            other => panic!("unexpected outcome {other:?}"),
        }
        last = at;
    }
    assert_eq!(dispatches, 2);
    assert_eq!(controller.session().repeat_count(), 2);
    assert_eq!(host.actions(), vec!["continue", "continue"]);

    let touched = last + Duration::from_secs(1);
    controller.on_activity(ActivitySignal::key_press(), touched);
    controller.tick(touched + Duration::from_millis(250));
    assert_eq!(controller.session().repeat_count(), 0);

    let (_, outcome) = run_to_deadline(&mut controller);
    assert!(matches!(outcome, Some(FireOutcome::Dispatched { cycle: 3, .. })));
    assert_eq!(host.actions().len(), 3);
}

#[test]
fn hidden_character_prompt_inserts_no_message() {
    let host = StubHost::new("Mira");
    let mut controller = controller_for(
        &host,
        IdleSettings {
            enabled: true,
            dispatch_mode: DispatchMode::Direct,
            include_prompt: false,
            send_as: SendAs::Char,
            ..IdleSettings::default()
        },
    );
    controller.activate(Instant::now());
    let (_, outcome) = run_to_deadline(&mut controller);

    assert!(matches!(outcome, Some(FireOutcome::Dispatched { .. })));
    assert_eq!(host.actions(), vec!["background:char:false"]);
    assert!(host.messages().is_empty());
}

#[test]
fn activity_while_waiting_never_dispatches_twice() {
    let host = StubHost::new("Mira");
    let mut controller = controller_for(
        &host,
        IdleSettings {
            enabled: true,
            repeats: 0,
            ..IdleSettings::default()
        },
    );
    let start = Instant::now();
    controller.activate(start);
    let (at, _) = run_to_deadline(&mut controller);
    assert!(controller.session().waiting_for_reply());

    controller.on_activity(ActivitySignal::click(), at + Duration::from_secs(1));
    controller.tick(at + Duration::from_secs(2));
    let (_, outcome) = run_to_deadline(&mut controller);
    assert_eq!(
        outcome,
        Some(FireOutcome::Deferred(DeferReason::AwaitingReply))
    );
    assert_eq!(host.actions().len(), 1);
}

#[test]
fn selfie_with_image_replaces_raw_reply() {
    let host = StubHost::new("Mira");
    let mut controller = controller_for(
        &host,
        IdleSettings {
            enabled: true,
            selfie_image_enabled: true,
            ..IdleSettings::default()
        },
    );
    controller.activate(Instant::now());
    let (at, _) = run_to_deadline(&mut controller);

    host.reply("Mirror selfie, messy bun.");
    let job = controller
        .on_transcript_changed(at)
        .expect("image job for the claimed reply");
    assert!(host.messages().is_empty());

    let image = GeneratedImage::new(vec![0x89, b'P', b'N', b'G'], None);
    assert!(controller.complete_capture(job.cycle, Some(image)));
    assert!(!controller.complete_capture(job.cycle, None));

    let messages = host.messages();
    assert_eq!(messages.len(), 1);
    let text = messages[0].text.as_deref().unwrap_or_default();
    assert!(text.starts_with("![selfie](data:image/png;base64,"));
    assert!(text.ends_with("\n\nMirror selfie, messy bun."));
}
