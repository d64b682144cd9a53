//! Key/value settings store.
//!
//! Values are plain strings; anything structured is stored as a JSON string.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

/// Key under which a workbook keeps its sync configuration.
pub const SYNC_CONFIG_KEY: &str = "syncConfig";

pub trait SettingsStore {
    fn get(&self, key: &str) -> SyncResult<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> SyncResult<()>;
}

pub fn get_json<T: DeserializeOwned>(
    store: &dyn SettingsStore,
    key: &str,
) -> SyncResult<Option<T>> {
    match store.get(key)? {
        Some(raw) if !raw.trim().is_empty() => Ok(Some(serde_json::from_str(&raw)?)),
        _ => Ok(None),
    }
}

pub fn set_json<T: Serialize>(
    store: &mut dyn SettingsStore,
    key: &str,
    value: &T,
) -> SyncResult<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    values: BTreeMap<String, String>,
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> SyncResult<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl SyncConfig {
    /// Decode the configuration stored under `key`. A missing key is a configuration error.
    pub fn from_settings(store: &dyn SettingsStore, key: &str) -> SyncResult<Self> {
        get_json(store, key)
            .map_err(|e| SyncError::Config(format!("Invalid settings value '{key}': {e}")))?
            .ok_or_else(|| SyncError::Config(format!("No sync settings stored under '{key}'")))
    }

    pub fn save_to_settings(&self, store: &mut dyn SettingsStore, key: &str) -> SyncResult<()> {
        set_json(store, key, self)
    }
}
