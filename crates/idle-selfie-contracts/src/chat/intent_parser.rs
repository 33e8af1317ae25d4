use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, NO_ARG_COMMANDS, SETTING_COMMAND, SPEAKER_COMMAND, TEXT_ARG_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub text: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            text: None,
            command_args: BTreeMap::new(),
        }
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn split_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

/// Splits off the first (possibly quoted) word and returns it with the
/// untouched remainder.
fn split_head(arg: &str) -> (String, String) {
    let trimmed = arg.trim();
    if let Some(quote) = trimmed.chars().next().filter(|ch| *ch == '"' || *ch == '\'') {
        if let Some(end) = trimmed[1..].find(quote) {
            let head = trimmed[1..1 + end].to_string();
            let rest = trimmed[end + 2..].trim().to_string();
            return (head, rest);
        }
    }
    match trimmed.split_once(char::is_whitespace) {
        Some((head, rest)) => (head.to_string(), rest.trim().to_string()),
        None => (trimmed.to_string(), String::new()),
    }
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_' || *ch == '-')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            if let Some(action) = find_action(&command, TEXT_ARG_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent.text = Some(arg.to_string());
                return intent;
            }

            if command == SPEAKER_COMMAND.command {
                let (speaker, message) = split_head(arg);
                let mut intent = Intent::new(SPEAKER_COMMAND.action, text);
                intent
                    .command_args
                    .insert("speaker".to_string(), Value::String(speaker));
                intent.text = Some(message);
                return intent;
            }

            if command == SETTING_COMMAND.command {
                let parts = split_args(arg);
                let mut intent = Intent::new(SETTING_COMMAND.action, text);
                let key = parts.first().cloned().unwrap_or_default();
                let value = if parts.len() > 1 {
                    parts[1..].join(" ")
                } else {
                    String::new()
                };
                intent
                    .command_args
                    .insert("key".to_string(), Value::String(key));
                intent
                    .command_args
                    .insert("value".to_string(), Value::String(value));
                return intent;
            }

            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    let mut intent = Intent::new("user_message", text);
    intent.text = Some(raw_trimmed.to_string());
    intent
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_intent;

    #[test]
    fn parse_toggle_command() {
        assert_eq!(parse_intent("/idle-selfie").action, "toggle_idle");
        assert_eq!(parse_intent("  /IDLE-SELFIE  ").action, "toggle_idle");
    }

    #[test]
    fn plain_idle_is_not_the_toggle() {
        let intent = parse_intent("/idle");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args["command"], json!("idle"));
    }

    #[test]
    fn parse_character_reply_keeps_text() {
        let intent = parse_intent("/char  I tilt my head and grin.  ");
        assert_eq!(intent.action, "character_reply");
        assert_eq!(intent.text.as_deref(), Some("I tilt my head and grin."));
    }

    #[test]
    fn parse_speaker_message_with_quoted_name() {
        let intent = parse_intent("/as \"Old Tom\" Evening, traveller.");
        assert_eq!(intent.action, "speaker_message");
        assert_eq!(intent.command_args["speaker"], json!("Old Tom"));
        assert_eq!(intent.text.as_deref(), Some("Evening, traveller."));

        let bare = parse_intent("/as Mira hello");
        assert_eq!(bare.command_args["speaker"], json!("Mira"));
        assert_eq!(bare.text.as_deref(), Some("hello"));
    }

    #[test]
    fn parse_setting_update() {
        let intent = parse_intent("/set dispatchMode direct");
        assert_eq!(intent.action, "update_setting");
        assert_eq!(intent.command_args["key"], json!("dispatchMode"));
        assert_eq!(intent.command_args["value"], json!("direct"));

        let quoted = parse_intent("/set prompts \"*waves* \\n *winks*\"");
        assert_eq!(quoted.command_args["key"], json!("prompts"));

        let empty = parse_intent("/set");
        assert_eq!(empty.command_args["key"], json!(""));
        assert_eq!(empty.command_args["value"], json!(""));
    }

    #[test]
    fn plain_text_is_user_message() {
        let intent = parse_intent("  hello there ");
        assert_eq!(intent.action, "user_message");
        assert_eq!(intent.text.as_deref(), Some("hello there"));
        assert_eq!(parse_intent("   ").action, "noop");
        assert_eq!(parse_intent("/ not a command").action, "user_message");
    }
}
