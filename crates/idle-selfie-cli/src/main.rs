use std::env;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use idle_selfie_contracts::chat::{parse_intent, CHAT_HELP_COMMANDS};
use idle_selfie_contracts::events::EventWriter;
use idle_selfie_contracts::prompts::build_instruction;
use idle_selfie_contracts::settings::{IdleSettings, SendAs};
use idle_selfie_contracts::settings_store::SettingsStore;
use idle_selfie_engine::{
    new_session_id, ActivitySignal, ChatActions, ChatContext, ChatMessage, ChatTranscript,
    GeminiImageClient, GeneratedImage, IdleController, IdleRuntime, ImageGenerator,
    ImageRequest, MessageBody, MessageId, DISABLED_NOTICE, ENABLED_NOTICE,
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;

const HOME_ENV: &str = "IDLE_SELFIE_HOME";
const LOG_ENV: &str = "IDLE_SELFIE_LOG";
const DEFAULT_HOME_DIR: &str = ".idle-selfie";
const DEFAULT_USER_NAME: &str = "You";
const NARRATOR_NAME: &str = "Narrator";

#[derive(Debug, Parser)]
#[command(name = "idle-selfie", version, about = "Idle selfie companion for chat sessions")]
struct Cli {
    /// Settings file (defaults to $IDLE_SELFIE_HOME/settings.json).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Flip the stored enabled flag.
    Toggle,
    /// Print the selfie instruction for a character.
    Instruction(InstructionArgs),
    /// Generate one selfie image for a caption.
    Selfie(SelfieArgs),
    /// Console chat with the idle cycle running.
    Chat(ChatArgs),
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    Show,
    Set { key: String, value: String },
    Reset,
}

#[derive(Debug, Args)]
struct InstructionArgs {
    #[arg(long)]
    character: Option<String>,
    #[arg(long)]
    flavor: Option<String>,
}

#[derive(Debug, Args)]
struct SelfieArgs {
    #[arg(long)]
    caption: String,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    model: Option<String>,
}

#[derive(Debug, Args)]
struct ChatArgs {
    #[arg(long, default_value = "Mira")]
    character: String,
    #[arg(long, default_value = DEFAULT_USER_NAME)]
    user: String,
    #[arg(long)]
    events: Option<PathBuf>,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("idle-selfie error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = env::var(LOG_ENV)
        .ok()
        .or_else(|| env::var("RUST_LOG").ok())
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "info".to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let store = SettingsStore::new(match cli.settings {
        Some(path) => path,
        None => idle_home()?.join("settings.json"),
    });
    match cli.command {
        Command::Settings(command) => run_settings(&store, command),
        Command::Toggle => {
            let settings = store.update(|settings| {
                settings.enabled = !settings.enabled;
                Ok(())
            })?;
            println!("{}", enabled_notice(settings.enabled));
            Ok(0)
        }
        Command::Instruction(args) => {
            println!(
                "{}",
                build_instruction(args.character.as_deref(), args.flavor.as_deref())
            );
            Ok(0)
        }
        Command::Selfie(args) => run_selfie(&store, args),
        Command::Chat(args) => {
            run_chat(store, args)?;
            Ok(0)
        }
    }
}

fn idle_home() -> Result<PathBuf> {
    if let Some(home) = env::var_os(HOME_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    let home = dirs::home_dir().context("could not determine the home directory")?;
    Ok(home.join(DEFAULT_HOME_DIR))
}

fn run_settings(store: &SettingsStore, command: SettingsCommand) -> Result<i32> {
    match command {
        SettingsCommand::Show => {
            let settings = store.load()?;
            print_settings(&settings)?;
        }
        SettingsCommand::Set { key, value } => {
            let settings = store.update(|settings| {
                settings.apply_update(&key, &value)?;
                Ok(())
            })?;
            print_settings(&settings)?;
        }
        SettingsCommand::Reset => {
            store.save(&IdleSettings::default())?;
            println!("Settings reset ({})", store.path().display());
        }
    }
    Ok(0)
}

fn print_settings(settings: &IdleSettings) -> Result<()> {
    let rendered = serde_json::to_string_pretty(&Value::Object(settings.redacted()))?;
    println!("{rendered}");
    Ok(())
}

fn enabled_notice(enabled: bool) -> &'static str {
    if enabled {
        ENABLED_NOTICE
    } else {
        DISABLED_NOTICE
    }
}

fn run_selfie(store: &SettingsStore, args: SelfieArgs) -> Result<i32> {
    let settings = store.load()?;
    let mut request = ImageRequest::from_settings(args.caption.trim(), &settings);
    if let Some(model) = args.model.filter(|value| !value.trim().is_empty()) {
        request.model = model;
    }
    if request.api_key.is_none() {
        bail!("no image API key: set imageGenApiKey, GEMINI_API_KEY or GOOGLE_API_KEY");
    }
    let Some(image) = GeminiImageClient::new().generate(&request) else {
        bail!("image generation returned no image");
    };
    let path = write_image(&args.out, &image)?;
    tracing::info!(bytes = image.bytes.len(), mime = %image.mime_type, "selfie image written");
    println!("{}", path.display());
    Ok(0)
}

/// Writes `image` into `dir`, named by the SHA-256 of its bytes.
fn write_image(dir: &Path, image: &GeneratedImage) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(image_file_name(image));
    fs::write(&path, &image.bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn image_file_name(image: &GeneratedImage) -> String {
    let digest = hex::encode(Sha256::digest(&image.bytes));
    format!("{digest}.{}", image_extension(image))
}

fn image_extension(image: &GeneratedImage) -> &'static str {
    match image.mime_type.to_ascii_lowercase().as_str() {
        "image/png" => return "png",
        "image/jpeg" | "image/jpg" => return "jpg",
        "image/webp" => return "webp",
        _ => {}
    }
    image::guess_format(&image.bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin")
}

fn run_chat(store: SettingsStore, args: ChatArgs) -> Result<()> {
    let mut settings = store.load()?;
    let events_path = match args.events {
        Some(path) => path,
        None => idle_home()?.join("events.jsonl"),
    };
    let events = EventWriter::new(events_path, new_session_id());
    let host = Arc::new(ConsoleHost::new(&args.character, &args.user));
    let controller = IdleController::new(settings.clone(), host.clone(), events);
    let mut runtime = IdleRuntime::start(
        controller,
        Arc::new(GeminiImageClient::new()),
        Some(store.clone()),
    )?;
    let handle = runtime.handle();
    tracing::debug!(settings = %store.path().display(), "idle loop started");

    println!(
        "Idle selfie chat with {} started ({}). Type /help for commands.",
        args.character,
        enabled_notice(settings.enabled)
    );

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        match intent.action.as_str() {
            "noop" => continue,
            "quit" => break,
            "help" => println!("Commands: {}", CHAT_HELP_COMMANDS.join(" ")),
            "toggle_idle" => {
                settings.enabled = !settings.enabled;
                handle.toggle();
            }
            "status" => {
                println!(
                    "{} | busy: {} | messages: {}",
                    enabled_notice(settings.enabled),
                    host.is_generating(),
                    host.message_count()
                );
                print_settings(&settings)?;
            }
            "toggle_busy" => {
                let busy = host.toggle_busy();
                println!("Host busy: {busy}");
            }
            "update_setting" => {
                let key = value_as_non_empty_string(intent.command_args.get("key"));
                let value = value_as_non_empty_string(intent.command_args.get("value"))
                    .unwrap_or_default();
                let Some(key) = key else {
                    println!("/set requires a key");
                    continue;
                };
                match store.update(|stored| {
                    stored.apply_update(&key, &value)?;
                    Ok(())
                }) {
                    Ok(updated) => {
                        settings = updated;
                        handle.apply_settings(settings.clone());
                        println!("Updated {key}");
                    }
                    Err(err) => println!("Setting not changed: {err:#}"),
                }
            }
            "character_reply" => {
                host.append(&args.character, intent.text.as_deref().unwrap_or_default());
                handle.transcript_changed();
            }
            "narrator_message" => {
                host.append(NARRATOR_NAME, intent.text.as_deref().unwrap_or_default());
                handle.transcript_changed();
            }
            "speaker_message" => {
                let speaker = value_as_non_empty_string(intent.command_args.get("speaker"))
                    .unwrap_or_else(|| NARRATOR_NAME.to_string());
                host.append(&speaker, intent.text.as_deref().unwrap_or_default());
                handle.transcript_changed();
            }
            "user_message" => {
                handle.activity(ActivitySignal::key_press());
                host.append(&args.user, intent.text.as_deref().unwrap_or_default());
                handle.transcript_changed();
            }
            _ => println!("Unknown command: {}", intent.raw.trim()),
        }
    }

    runtime.stop();
    Ok(())
}

fn value_as_non_empty_string(value: Option<&Value>) -> Option<String> {
    let raw = value
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

#[derive(Default)]
struct ConsoleTranscript {
    messages: Vec<ChatMessage>,
    next_id: MessageId,
    generating: bool,
}

/// Stdout-backed host. The person at the keyboard plays every other party:
/// `/char` stands in for the chat backend's reply.
struct ConsoleHost {
    character: String,
    user: String,
    transcript: Mutex<ConsoleTranscript>,
}

impl ConsoleHost {
    fn new(character: &str, user: &str) -> Self {
        Self {
            character: character.trim().to_string(),
            user: user.trim().to_string(),
            transcript: Mutex::new(ConsoleTranscript::default()),
        }
    }

    fn transcript(&self) -> MutexGuard<'_, ConsoleTranscript> {
        self.transcript
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn append(&self, speaker: &str, text: &str) -> MessageId {
        let mut transcript = self.transcript();
        transcript.next_id += 1;
        let id = transcript.next_id;
        transcript.messages.push(ChatMessage {
            id,
            speaker: Some(speaker.to_string()),
            text: Some(text.to_string()),
        });
        id
    }

    fn message_count(&self) -> usize {
        self.transcript().messages.len()
    }

    fn toggle_busy(&self) -> bool {
        let mut transcript = self.transcript();
        transcript.generating = !transcript.generating;
        transcript.generating
    }

    fn say(&self, line: &str) {
        println!("\n[host] {line}");
    }
}

impl ChatContext for ConsoleHost {
    fn character_name(&self) -> Option<String> {
        Some(self.character.clone()).filter(|name| !name.is_empty())
    }

    fn user_name(&self) -> Option<String> {
        Some(self.user.clone()).filter(|name| !name.is_empty())
    }

    fn has_active_chat(&self) -> bool {
        true
    }

    fn is_generating(&self) -> bool {
        self.transcript().generating
    }
}

impl ChatActions for ConsoleHost {
    fn continue_last(&self) {
        self.say(&format!("continue requested; reply with /char as {}", self.character));
    }

    fn regenerate_last(&self) {
        self.say("regenerate requested");
    }

    fn impersonate_user(&self) {
        self.say("impersonation requested");
    }

    fn swipe_next(&self) {
        self.say("swipe requested");
    }

    fn send_as_user(&self, text: &str) {
        self.append(&self.user, text);
        println!("\n{}: {text}", self.user);
    }

    fn send_as_character(&self, name: &str, text: &str) {
        self.append(name, text);
        println!("\n{name}: {text}");
    }

    fn send_as_narrator(&self, text: &str) {
        self.append(NARRATOR_NAME, text);
        println!("\n{NARRATOR_NAME}: {text}");
    }

    fn send_background_prompt(&self, send_as: SendAs, text: &str) {
        if text.is_empty() {
            self.say(&format!("reply requested ({})", send_as.as_str()));
        } else {
            self.say(&format!("hidden {} prompt: {text}", send_as.as_str()));
        }
    }

    fn show_notice(&self, text: &str) {
        self.say(text);
    }
}

impl ChatTranscript for ConsoleHost {
    fn last_message(&self) -> Option<ChatMessage> {
        self.transcript().messages.last().cloned()
    }

    fn delete_message(&self, id: MessageId) {
        self.transcript().messages.retain(|message| message.id != id);
    }

    fn publish_as_character(&self, name: &str, body: &MessageBody) -> Option<MessageId> {
        let id = self.append(name, &body.render());
        match &body.image {
            Some(image) => println!(
                "\n{name}: [selfie {}, {} bytes]\n{name}: {}",
                image.mime_type,
                image.bytes.len(),
                body.caption
            ),
            None => println!("\n{name}: {}", body.caption),
        }
        Some(id)
    }
}
