use std::fmt;

use indexmap::IndexMap;

pub const IMAGE_CAPABILITY: &str = "image";

/// An image-generation model and the generation parameters sent with it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub name: String,
    pub capabilities: Vec<String>,
    pub temperature: f64,
    pub max_output_tokens: u32,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

/// Why the configured image model was replaced by the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelFallback {
    Unset,
    Unknown(String),
    NotImageCapable(String),
}

impl fmt::Display for ModelFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "no image model configured"),
            Self::Unknown(name) => write!(f, "unknown image model '{name}'"),
            Self::NotImageCapable(name) => write!(f, "model '{name}' cannot generate images"),
        }
    }
}

/// Image model to call for a request, plus the reason when it is not the one
/// the settings asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageModelChoice {
    pub model: ModelSpec,
    pub fallback: Option<ModelFallback>,
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    /// Looks a model up by name; an API-style `models/` prefix is ignored.
    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name.trim().trim_start_matches("models/"))
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    /// First image-capable model in registration order.
    pub fn default_image_model(&self) -> Option<&ModelSpec> {
        self.list().find(|model| model.supports(IMAGE_CAPABILITY))
    }

    /// Resolves the `imageGenModel` setting. Blank, unknown and text-only
    /// names fall back to the default image model. `None` only when no
    /// image-capable model is registered at all.
    pub fn resolve_image_model(&self, requested: &str) -> Option<ImageModelChoice> {
        let requested = requested.trim();
        let fallback = if requested.is_empty() {
            ModelFallback::Unset
        } else {
            match self.get(requested) {
                Some(model) if model.supports(IMAGE_CAPABILITY) => {
                    return Some(ImageModelChoice {
                        model: model.clone(),
                        fallback: None,
                    });
                }
                Some(model) => ModelFallback::NotImageCapable(model.name.clone()),
                None => ModelFallback::Unknown(requested.to_string()),
            }
        };
        self.default_image_model().map(|model| ImageModelChoice {
            model: model.clone(),
            fallback: Some(fallback),
        })
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, capabilities: &[&str], temperature: f64, max_output_tokens: u32| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                capabilities: capabilities
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
                temperature,
                max_output_tokens,
            },
        );
    };

    // First image-capable entry is the default.
    insert("gemini-2.5-flash-image", &["image", "text"], 0.9, 2048);
    insert("gemini-2.5-flash-image-preview", &["image", "text"], 0.9, 2048);
    insert(
        "gemini-2.0-flash-preview-image-generation",
        &["image", "text"],
        1.0,
        2048,
    );
    insert("gemini-3-pro-image-preview", &["image", "text"], 0.8, 4096);
    insert("gemini-2.5-flash", &["text"], 0.8, 1024);

    map
}
