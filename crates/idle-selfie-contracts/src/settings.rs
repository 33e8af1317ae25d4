use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::prompts::default_flavor_prompts;

pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
/// Upper bound for every seconds field (`timer`, `timerMin`, `replyTimeout`).
pub const MAX_SECONDS: u64 = 24 * 60 * 60;

/// Strategy used to solicit a reply from the chat backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    #[default]
    Continuation,
    Regenerate,
    Impersonation,
    Swipe,
    Direct,
}

impl DispatchMode {
    pub const ALL: [DispatchMode; 5] = [
        DispatchMode::Continuation,
        DispatchMode::Regenerate,
        DispatchMode::Impersonation,
        DispatchMode::Swipe,
        DispatchMode::Direct,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continuation => "continuation",
            Self::Regenerate => "regenerate",
            Self::Impersonation => "impersonation",
            Self::Swipe => "swipe",
            Self::Direct => "direct",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "continuation" | "continue" => Some(Self::Continuation),
            "regenerate" | "regen" => Some(Self::Regenerate),
            "impersonation" | "impersonate" => Some(Self::Impersonation),
            "swipe" => Some(Self::Swipe),
            "direct" | "prompt" => Some(Self::Direct),
            _ => None,
        }
    }

    /// Resolves the pre-enum checkbox flags. Regenerate outranks continuation,
    /// which outranks impersonation, then swipe; no flag means direct.
    pub fn from_legacy_flags(
        use_continuation: bool,
        use_regenerate: bool,
        use_impersonation: bool,
        use_swipe: bool,
    ) -> Self {
        if use_regenerate {
            Self::Regenerate
        } else if use_continuation {
            Self::Continuation
        } else if use_impersonation {
            Self::Impersonation
        } else if use_swipe {
            Self::Swipe
        } else {
            Self::Direct
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SendAs {
    #[default]
    User,
    Char,
    #[serde(alias = "sys")]
    System,
}

impl SendAs {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Char => "char",
            Self::System => "system",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "char" | "character" => Some(Self::Char),
            "system" | "sys" | "narrator" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("unknown setting '{0}'")]
    UnknownKey(String),
    #[error("invalid value for '{key}': {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdleSettings {
    pub enabled: bool,
    pub timer: u64,
    pub timer_min: u64,
    pub random_time: bool,
    pub repeats: u32,
    pub prompts: Vec<String>,
    pub dispatch_mode: DispatchMode,
    pub send_as: SendAs,
    pub include_prompt: bool,
    pub image_gen_api_key: String,
    pub image_gen_model: String,
    pub selfie_image_enabled: bool,
    pub reply_timeout: u64,
}

impl Default for IdleSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            timer: 120,
            timer_min: 60,
            random_time: false,
            repeats: 2,
            prompts: default_flavor_prompts(),
            dispatch_mode: DispatchMode::Continuation,
            send_as: SendAs::User,
            include_prompt: false,
            image_gen_api_key: String::new(),
            image_gen_model: DEFAULT_IMAGE_MODEL.to_string(),
            selfie_image_enabled: false,
            reply_timeout: 180,
        }
    }
}

/// Settings keys as stored, in the order `settings show` prints them.
pub const SETTING_KEYS: &[&str] = &[
    "enabled",
    "timer",
    "timerMin",
    "randomTime",
    "repeats",
    "prompts",
    "dispatchMode",
    "sendAs",
    "includePrompt",
    "imageGenApiKey",
    "imageGenModel",
    "selfieImageEnabled",
    "replyTimeout",
];

const LEGACY_MODE_KEYS: &[&str] = &[
    "useContinuation",
    "useRegenerate",
    "useImpersonation",
    "useSwipe",
];

impl IdleSettings {
    /// Builds settings from a stored object. Missing keys take their defaults,
    /// legacy dispatch flags are folded into `dispatchMode`, and values of the
    /// wrong shape fall back to the default for that key.
    pub fn from_stored(stored: &Map<String, Value>) -> Self {
        let defaults = Self::default();
        let mut merged = match serde_json::to_value(&defaults) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };

        for key in SETTING_KEYS {
            let Some(value) = stored.get(*key) else {
                continue;
            };
            let coerced = coerce_stored_value(key, value);
            let mut candidate = merged.clone();
            candidate.insert((*key).to_string(), coerced.clone());
            if serde_json::from_value::<Self>(Value::Object(candidate)).is_ok() {
                merged.insert((*key).to_string(), coerced);
            } else {
                tracing::warn!(key = *key, "ignoring stored setting with invalid value");
            }
        }

        let has_legacy_flags = LEGACY_MODE_KEYS.iter().any(|key| stored.contains_key(*key));
        if !stored.contains_key("dispatchMode") && has_legacy_flags {
            let flag = |key: &str| stored.get(key).and_then(value_as_bool).unwrap_or(false);
            let mode = DispatchMode::from_legacy_flags(
                flag("useContinuation"),
                flag("useRegenerate"),
                flag("useImpersonation"),
                flag("useSwipe"),
            );
            merged.insert(
                "dispatchMode".to_string(),
                Value::String(mode.as_str().to_string()),
            );
        }

        serde_json::from_value::<Self>(Value::Object(merged))
            .unwrap_or(defaults)
            .normalized()
    }

    pub fn to_stored(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Caps the seconds fields at [`MAX_SECONDS`], clamps `timerMin` down to
    /// `timer` and drops blank flavor lines.
    pub fn normalized(mut self) -> Self {
        self.timer = self.timer.min(MAX_SECONDS);
        self.timer_min = self.timer_min.min(MAX_SECONDS);
        self.reply_timeout = self.reply_timeout.min(MAX_SECONDS);
        if self.timer_min > self.timer {
            self.timer_min = self.timer;
        }
        self.prompts = self
            .prompts
            .into_iter()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();
        self.image_gen_api_key = self.image_gen_api_key.trim().to_string();
        self.image_gen_model = self.image_gen_model.trim().to_string();
        if self.image_gen_model.is_empty() {
            self.image_gen_model = DEFAULT_IMAGE_MODEL.to_string();
        }
        self
    }

    /// Applies one field update from its textual form.
    pub fn apply_update(&mut self, key: &str, raw: &str) -> Result<(), SettingsError> {
        let invalid = |reason: &'static str| SettingsError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason,
        };
        match key {
            "enabled" => {
                self.enabled = parse_bool(raw).ok_or_else(|| invalid("expected a boolean"))?
            }
            "timer" => self.timer = parse_seconds(raw).ok_or_else(|| invalid(SECONDS_REASON))?,
            "timerMin" => {
                self.timer_min = parse_seconds(raw).ok_or_else(|| invalid(SECONDS_REASON))?
            }
            "randomTime" => {
                self.random_time = parse_bool(raw).ok_or_else(|| invalid("expected a boolean"))?
            }
            "repeats" => {
                self.repeats = raw
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| invalid("expected a non-negative integer"))?
            }
            "prompts" => self.prompts = split_prompt_lines(raw),
            "dispatchMode" => {
                self.dispatch_mode = DispatchMode::parse(raw).ok_or_else(|| {
                    invalid("expected continuation, regenerate, impersonation, swipe or direct")
                })?
            }
            "sendAs" => {
                self.send_as =
                    SendAs::parse(raw).ok_or_else(|| invalid("expected user, char or system"))?
            }
            "includePrompt" => {
                self.include_prompt = parse_bool(raw).ok_or_else(|| invalid("expected a boolean"))?
            }
            "imageGenApiKey" => self.image_gen_api_key = raw.trim().to_string(),
            "imageGenModel" => self.image_gen_model = raw.trim().to_string(),
            "selfieImageEnabled" => {
                self.selfie_image_enabled =
                    parse_bool(raw).ok_or_else(|| invalid("expected a boolean"))?
            }
            "replyTimeout" => {
                self.reply_timeout = parse_seconds(raw).ok_or_else(|| invalid(SECONDS_REASON))?
            }
            _ => return Err(SettingsError::UnknownKey(key.to_string())),
        }
        // Lowering the timer drags timerMin along with it.
        if key == "timer" && self.random_time && self.timer < self.timer_min {
            self.timer_min = self.timer;
        }
        Ok(())
    }

    /// Display form with the API key masked.
    pub fn redacted(&self) -> Map<String, Value> {
        let mut stored = self.to_stored();
        if !self.image_gen_api_key.is_empty() {
            stored.insert(
                "imageGenApiKey".to_string(),
                Value::String(mask_secret(&self.image_gen_api_key)),
            );
        }
        stored
    }
}

pub fn split_prompt_lines(raw: &str) -> Vec<String> {
    raw.replace("\\n", "\n")
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

const SECONDS_REASON: &str = "expected seconds between 0 and 86400";

fn coerce_stored_value(key: &str, value: &Value) -> Value {
    // Older stores kept numbers as strings straight from the input fields.
    match (key, value) {
        ("timer" | "timerMin" | "replyTimeout", Value::String(text)) => parse_seconds(text)
            .map(Value::from)
            .unwrap_or_else(|| value.clone()),
        ("repeats", Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|num| num.is_finite() && *num >= 0.0 && *num <= f64::from(u32::MAX))
            .map(|num| Value::from(num.round() as u64))
            .unwrap_or_else(|| value.clone()),
        ("prompts", Value::String(text)) => Value::Array(
            split_prompt_lines(text)
                .into_iter()
                .map(Value::String)
                .collect(),
        ),
        (_, Value::String(text)) if is_bool_key(key) => {
            parse_bool(text).map(Value::Bool).unwrap_or_else(|| value.clone())
        }
        _ => value.clone(),
    }
}

fn is_bool_key(key: &str) -> bool {
    matches!(
        key,
        "enabled" | "randomTime" | "includePrompt" | "selfieImageEnabled"
    )
}

fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(raw) => Some(*raw),
        Value::Number(raw) => raw.as_i64().map(|value| value != 0),
        Value::String(raw) => parse_bool(raw),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    let lowered = raw.trim().to_ascii_lowercase();
    if matches!(lowered.as_str(), "1" | "true" | "yes" | "on") {
        Some(true)
    } else if matches!(lowered.as_str(), "0" | "false" | "no" | "off") {
        Some(false)
    } else {
        None
    }
}

fn parse_seconds(raw: &str) -> Option<u64> {
    let parsed = raw.trim().parse::<f64>().ok()?;
    if !parsed.is_finite() || parsed < 0.0 || parsed > MAX_SECONDS as f64 {
        return None;
    }
    Some(parsed.round() as u64)
}

fn mask_secret(secret: &str) -> String {
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<char>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{tail}")
}
