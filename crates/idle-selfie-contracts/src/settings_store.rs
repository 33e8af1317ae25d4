use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::{Map, Value};

use crate::settings::{IdleSettings, SETTING_KEYS};

pub const SETTINGS_NAMESPACE: &str = "idle";

/// JSON settings file holding the extension's configuration under one key.
///
/// Other top-level keys in the file belong to other features and are carried
/// through every write untouched.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
    namespace: String,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_namespace(path, SETTINGS_NAMESPACE)
    }

    pub fn with_namespace(path: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            namespace: namespace.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Reads the namespaced settings, seeding any missing key with its default
    /// and writing the seeded object back when something was added.
    pub fn load(&self) -> anyhow::Result<IdleSettings> {
        let stored = self.read_namespace();
        let settings = IdleSettings::from_stored(&stored);
        let missing: Vec<&str> = SETTING_KEYS
            .iter()
            .copied()
            .filter(|key| !stored.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            for key in &missing {
                tracing::debug!(key = *key, "seeding default setting");
            }
            self.save(&settings)?;
        }
        Ok(settings)
    }

    pub fn save(&self, settings: &IdleSettings) -> anyhow::Result<()> {
        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        let mut section = on_disk
            .get(&self.namespace)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        for (key, value) in settings.to_stored() {
            section.insert(key, value);
        }
        on_disk.insert(self.namespace.clone(), Value::Object(section));
        write_json_object(&self.path, &on_disk)
            .with_context(|| format!("failed to write settings {}", self.path.display()))
    }

    /// Load, apply `update`, save. Returns the settings as written.
    pub fn update<F>(&self, update: F) -> anyhow::Result<IdleSettings>
    where
        F: FnOnce(&mut IdleSettings) -> anyhow::Result<()>,
    {
        let mut settings = self.load()?;
        update(&mut settings)?;
        let settings = settings.normalized();
        self.save(&settings)?;
        Ok(settings)
    }

    fn read_namespace(&self) -> Map<String, Value> {
        read_json_object(&self.path)
            .and_then(|root| root.get(&self.namespace).and_then(Value::as_object).cloned())
            .unwrap_or_default()
    }
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )?;
    Ok(())
}
