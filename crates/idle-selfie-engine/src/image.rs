use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use idle_selfie_contracts::models::{ModelRegistry, ModelSpec};
use idle_selfie_contracts::settings::IdleSettings;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MIME_TYPE: &str = "image/png";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl GeneratedImage {
    pub fn new(bytes: Vec<u8>, mime_type: Option<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
        }
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub caption: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl ImageRequest {
    /// The settings key wins; `GEMINI_API_KEY` then `GOOGLE_API_KEY` fill in
    /// when it is empty.
    pub fn from_settings(caption: impl Into<String>, settings: &IdleSettings) -> Self {
        let api_key = Some(settings.image_gen_api_key.trim().to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| non_empty_env("GEMINI_API_KEY"))
            .or_else(|| non_empty_env("GOOGLE_API_KEY"));
        Self {
            caption: caption.into(),
            api_key,
            model: settings.image_gen_model.clone(),
        }
    }
}

/// Turns a caption into an image. Every failure is "no image".
pub trait ImageGenerator: Send + Sync {
    fn generate(&self, request: &ImageRequest) -> Option<GeneratedImage>;
}

pub struct GeminiImageClient {
    api_base: String,
    http: HttpClient,
    timeout: Duration,
    registry: ModelRegistry,
}

impl Default for GeminiImageClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiImageClient {
    pub fn new() -> Self {
        Self {
            api_base: env::var("GEMINI_API_BASE")
                .ok()
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            http: HttpClient::new(),
            timeout: REQUEST_TIMEOUT,
            registry: ModelRegistry::default(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn resolve_model(&self, requested: &str) -> Option<ModelSpec> {
        let Some(choice) = self.registry.resolve_image_model(requested) else {
            tracing::warn!("no image-capable model registered");
            return None;
        };
        if let Some(fallback) = &choice.fallback {
            tracing::warn!(model = %choice.model.name, "{fallback}; using the default model");
        }
        Some(choice.model)
    }

    pub fn build_payload(caption: &str, model: &ModelSpec) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": image_prompt(caption) }],
            }],
            "generationConfig": {
                "temperature": model.temperature,
                "maxOutputTokens": model.max_output_tokens,
                "responseModalities": ["TEXT", "IMAGE"],
            },
        })
    }

    /// First inline image across all candidates, if any.
    pub fn extract_inline_image(response_payload: &Value) -> Option<GeneratedImage> {
        let candidates = response_payload.get("candidates").and_then(Value::as_array)?;
        for candidate in candidates {
            let Some(parts) = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
            else {
                continue;
            };
            for part in parts {
                let Some(inline) = part
                    .get("inlineData")
                    .or_else(|| part.get("inline_data"))
                    .and_then(Value::as_object)
                else {
                    continue;
                };
                let data = inline
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if data.is_empty() {
                    continue;
                }
                let bytes = match BASE64.decode(data.as_bytes()) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        tracing::debug!("skipping undecodable inline image: {err}");
                        continue;
                    }
                };
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                return Some(GeneratedImage::new(bytes, mime_type));
            }
        }
        None
    }

    fn request_image(
        &self,
        request: &ImageRequest,
        api_key: &str,
        model: &ModelSpec,
    ) -> Result<Option<GeneratedImage>> {
        let endpoint = self.endpoint_for_model(&model.name);
        let payload = Self::build_payload(&request.caption, model);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .with_context(|| format!("image request failed ({endpoint})"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                "image endpoint returned an error: {}",
                truncate_text(&body, 256)
            );
            return Ok(None);
        }
        let body = response
            .text()
            .context("image response body read failed")?;
        let parsed: Value =
            serde_json::from_str(&body).context("image endpoint returned invalid JSON")?;
        Ok(Self::extract_inline_image(&parsed))
    }
}

impl ImageGenerator for GeminiImageClient {
    fn generate(&self, request: &ImageRequest) -> Option<GeneratedImage> {
        let Some(api_key) = request.api_key.as_deref().filter(|key| !key.trim().is_empty()) else {
            tracing::debug!("no image API key configured; skipping image generation");
            return None;
        };
        let model = self.resolve_model(&request.model)?;
        match self.request_image(request, api_key, &model) {
            Ok(Some(image)) => {
                tracing::info!(
                    model = %model.name,
                    bytes = image.bytes.len(),
                    mime = %image.mime_type,
                    "selfie image generated"
                );
                Some(image)
            }
            Ok(None) => {
                tracing::info!(model = %model.name, "image endpoint returned no image");
                None
            }
            Err(err) => {
                tracing::warn!("image generation failed: {err:#}");
                None
            }
        }
    }
}

fn image_prompt(caption: &str) -> String {
    format!(
        "Create a photorealistic selfie photo that matches this in-character description. \
         Keep the framing of a phone selfie and do not add any text to the image.\n\n{}",
        caption.trim()
    )
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
