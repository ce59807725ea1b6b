//! Persisted effect parameters
//!
//! Owns the per-effect settings records, the user-defined custom effect
//! list, and the preset color slots. Every committed change is persisted
//! immediately through a [`SettingsBackend`]; the observable cells mirror
//! the persisted state for the UI layer.

use crate::effect::{
    BaseEffect, Color, CustomEffect, EffectId, EffectSettings, MAX_CUSTOM_EFFECTS,
};
use lume_link::{StateCell, StateReader};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Number of user-saveable preset color slots.
pub const PRESET_COLOR_SLOTS: usize = 6;

const KEY_CUSTOM_EFFECTS: &str = "custom_effects";
const KEY_PRESET_COLORS: &str = "preset_colors";

/// Error type for parameter-store mutations
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("custom effect limit reached ({limit})")]
    CustomLimitReached { limit: usize },

    #[error("no custom effect with id '{0}'")]
    UnknownCustomEffect(String),

    #[error("preset color slot {slot} out of range (0..{})", PRESET_COLOR_SLOTS)]
    InvalidPresetSlot { slot: usize },
}

/// Durable key-value storage consumed by the store.
///
/// Values are strings; the store serializes structured records into them.
/// Implementations must persist on every `set`.
pub trait SettingsBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-memory backend (ephemeral sessions and tests).
#[derive(Default)]
pub struct MemoryBackend {
    values: Mutex<HashMap<String, String>>,
}

impl SettingsBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.remove(key);
        }
    }
}

/// YAML-file backend: one document holding the whole key-value map,
/// rewritten on every committed change.
pub struct YamlFileBackend {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl YamlFileBackend {
    /// Load the backend from `path`. A missing or malformed file degrades to
    /// an empty map with a logged warning, never an error.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_yaml::from_str::<HashMap<String, String>>(&contents) {
                Ok(values) => values,
                Err(e) => {
                    log::warn!("settings: failed to parse {:?}: {}", path, e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    fn flush(&self, values: &HashMap<String, String>) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_yaml::to_string(values) {
            Ok(doc) => {
                if let Err(e) = std::fs::write(&self.path, doc) {
                    log::warn!("settings: failed to write {:?}: {}", self.path, e);
                }
            }
            Err(e) => log::warn!("settings: failed to serialize: {}", e),
        }
    }
}

impl SettingsBackend for YamlFileBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
            self.flush(&values);
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.remove(key);
            self.flush(&values);
        }
    }
}

/// Default settings document location: `<config>/lume/settings.yaml`.
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lume")
        .join("settings.yaml")
}

/// Owns persisted per-effect settings, the custom effect list, and the
/// preset color slots.
pub struct EffectParameterStore {
    backend: Arc<dyn SettingsBackend>,
    settings: StateCell<HashMap<EffectId, EffectSettings>>,
    customs: StateCell<Vec<CustomEffect>>,
    presets: StateCell<Vec<Color>>,
    /// Serializes compound read-modify-write mutations.
    write: Mutex<()>,
}

impl EffectParameterStore {
    pub fn new(backend: Arc<dyn SettingsBackend>) -> Self {
        let customs = load_customs(backend.as_ref());
        let presets = load_presets(backend.as_ref());

        let mut settings = HashMap::new();
        for base in BaseEffect::ALL {
            let id = EffectId::Base(base);
            if let Some(record) = load_settings(backend.as_ref(), &id) {
                settings.insert(id, record);
            }
        }
        for custom in &customs {
            let id = EffectId::Custom(custom.id.clone());
            if let Some(record) = load_settings(backend.as_ref(), &id) {
                settings.insert(id, record);
            }
        }

        log::info!(
            "store: loaded {} settings record(s), {} custom effect(s)",
            settings.len(),
            customs.len()
        );

        Self {
            backend,
            settings: StateCell::new(settings),
            customs: StateCell::new(customs),
            presets: StateCell::new(presets),
            write: Mutex::new(()),
        }
    }

    /// Open the store on the default YAML settings document.
    pub fn open_default() -> Self {
        Self::new(Arc::new(YamlFileBackend::new(default_settings_path())))
    }

    // === Settings records ===

    /// Resolve the settings for an effect identity, falling back to the
    /// documented per-kind default when nothing is persisted.
    pub fn settings_for(&self, id: &EffectId) -> EffectSettings {
        if let Some(record) = self.settings.get().get(id) {
            return record.clone();
        }
        match id {
            EffectId::Base(base) => EffectSettings::default_for(*base),
            EffectId::Custom(custom_id) => {
                let base = self
                    .custom_by_id(custom_id)
                    .map(|c| c.base)
                    .unwrap_or(BaseEffect::On);
                EffectSettings::default_for(base)
            }
        }
    }

    /// Persist a committed settings change and publish the updated map.
    pub fn save_settings(&self, id: &EffectId, settings: EffectSettings) {
        let _guard = self.write.lock();
        match serde_yaml::to_string(&settings) {
            Ok(doc) => self.backend.set(&id.storage_key(), &doc),
            Err(e) => log::warn!("store: failed to serialize settings: {}", e),
        }
        let mut map = self.settings.get();
        map.insert(id.clone(), settings);
        self.settings.set(map);
    }

    pub fn settings_reader(&self) -> StateReader<HashMap<EffectId, EffectSettings>> {
        self.settings.reader()
    }

    // === Custom effects ===

    pub fn custom_effects(&self) -> Vec<CustomEffect> {
        self.customs.get()
    }

    pub fn custom_by_id(&self, id: &str) -> Option<CustomEffect> {
        self.customs.get().into_iter().find(|c| c.id == id)
    }

    pub fn customs_reader(&self) -> StateReader<Vec<CustomEffect>> {
        self.customs.reader()
    }

    /// Create a custom effect. Bounded at [`MAX_CUSTOM_EFFECTS`].
    pub fn create_custom(
        &self,
        base: BaseEffect,
        name: impl Into<String>,
    ) -> Result<CustomEffect, StoreError> {
        let _guard = self.write.lock();
        let mut customs = self.customs.get();
        if customs.len() >= MAX_CUSTOM_EFFECTS {
            return Err(StoreError::CustomLimitReached {
                limit: MAX_CUSTOM_EFFECTS,
            });
        }

        // Smallest unused numeric token keeps ids stable and readable.
        let id = (1..)
            .map(|n| format!("custom-{}", n))
            .find(|candidate| customs.iter().all(|c| &c.id != candidate))
            .unwrap_or_default();

        let custom = CustomEffect {
            id,
            base,
            name: name.into(),
        };
        customs.push(custom.clone());
        self.persist_customs(&customs);
        self.customs.set(customs);

        log::info!("store: created custom effect '{}' ({})", custom.name, custom.id);
        Ok(custom)
    }

    /// Rename a custom effect.
    pub fn rename_custom(&self, id: &str, name: impl Into<String>) -> Result<(), StoreError> {
        let _guard = self.write.lock();
        let mut customs = self.customs.get();
        let Some(entry) = customs.iter_mut().find(|c| c.id == id) else {
            return Err(StoreError::UnknownCustomEffect(id.to_string()));
        };
        entry.name = name.into();
        self.persist_customs(&customs);
        self.customs.set(customs);
        Ok(())
    }

    /// Delete a custom effect together with its settings record.
    pub fn delete_custom(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.write.lock();
        let mut customs = self.customs.get();
        let before = customs.len();
        customs.retain(|c| c.id != id);
        if customs.len() == before {
            return Err(StoreError::UnknownCustomEffect(id.to_string()));
        }
        self.persist_customs(&customs);
        self.customs.set(customs);

        let settings_id = EffectId::Custom(id.to_string());
        self.backend.remove(&settings_id.storage_key());
        let mut map = self.settings.get();
        map.remove(&settings_id);
        self.settings.set(map);

        log::info!("store: deleted custom effect {}", id);
        Ok(())
    }

    // === Preset colors ===

    pub fn preset_colors(&self) -> Vec<Color> {
        self.presets.get()
    }

    pub fn presets_reader(&self) -> StateReader<Vec<Color>> {
        self.presets.reader()
    }

    pub fn set_preset_color(&self, slot: usize, color: Color) -> Result<(), StoreError> {
        if slot >= PRESET_COLOR_SLOTS {
            return Err(StoreError::InvalidPresetSlot { slot });
        }
        let _guard = self.write.lock();
        let mut presets = self.presets.get();
        presets[slot] = color;
        match serde_yaml::to_string(&presets) {
            Ok(doc) => self.backend.set(KEY_PRESET_COLORS, &doc),
            Err(e) => log::warn!("store: failed to serialize presets: {}", e),
        }
        self.presets.set(presets);
        Ok(())
    }

    fn persist_customs(&self, customs: &[CustomEffect]) {
        match serde_yaml::to_string(customs) {
            Ok(doc) => self.backend.set(KEY_CUSTOM_EFFECTS, &doc),
            Err(e) => log::warn!("store: failed to serialize custom effects: {}", e),
        }
    }
}

fn load_settings(backend: &dyn SettingsBackend, id: &EffectId) -> Option<EffectSettings> {
    let raw = backend.get(&id.storage_key())?;
    match serde_yaml::from_str(&raw) {
        Ok(settings) => Some(settings),
        Err(e) => {
            log::warn!("store: discarding malformed settings for {:?}: {}", id, e);
            None
        }
    }
}

fn load_customs(backend: &dyn SettingsBackend) -> Vec<CustomEffect> {
    let Some(raw) = backend.get(KEY_CUSTOM_EFFECTS) else {
        return Vec::new();
    };
    match serde_yaml::from_str::<Vec<CustomEffect>>(&raw) {
        Ok(mut customs) => {
            customs.truncate(MAX_CUSTOM_EFFECTS);
            customs
        }
        Err(e) => {
            log::warn!("store: discarding malformed custom effect list: {}", e);
            Vec::new()
        }
    }
}

fn load_presets(backend: &dyn SettingsBackend) -> Vec<Color> {
    let defaults = || vec![Color::WHITE; PRESET_COLOR_SLOTS];
    let Some(raw) = backend.get(KEY_PRESET_COLORS) else {
        return defaults();
    };
    match serde_yaml::from_str::<Vec<Color>>(&raw) {
        Ok(mut presets) => {
            presets.resize(PRESET_COLOR_SLOTS, Color::WHITE);
            presets
        }
        Err(e) => {
            log::warn!("store: discarding malformed preset colors: {}", e);
            defaults()
        }
    }
}
