//! Command-line configuration at ~/.config/rostersync/config.toml.
//!
//! Names the workbook and the calendar directory. The sync settings come from the
//! `[sync]` table when present, else from the workbook's own settings store.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::settings::{SYNC_CONFIG_KEY, SettingsStore};

static DEFAULT_WORKBOOK_PATH: &str = "~/rostersync/workbook.json";
static DEFAULT_CALENDAR_DIR: &str = "~/calendar";

fn default_workbook() -> PathBuf {
    PathBuf::from(DEFAULT_WORKBOOK_PATH)
}

fn default_calendar_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CALENDAR_DIR)
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_workbook")]
    pub workbook: PathBuf,

    /// Parent of the per-calendar .ics directories.
    #[serde(default = "default_calendar_dir")]
    pub calendar_dir: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            workbook: default_workbook(),
            calendar_dir: default_calendar_dir(),
            sync: None,
        }
    }
}

#[derive(Serialize)]
struct ExampleFile<'a> {
    sync: &'a SyncConfig,
}

impl AppConfig {
    pub fn config_path() -> SyncResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SyncError::Config("Could not determine config directory".into()))?
            .join("rostersync");

        Ok(config_dir.join("config.toml"))
    }

    /// Load `path` (or the default location), with `ROSTERSYNC_*` environment
    /// overrides, e.g. `ROSTERSYNC_WORKBOOK` or `ROSTERSYNC_SYNC__CALENDAR_ID`.
    pub fn load(path: Option<&Path>) -> SyncResult<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        Config::builder()
            .add_source(File::from(config_path).required(false))
            .add_source(
                Environment::with_prefix("ROSTERSYNC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| SyncError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| SyncError::Config(e.to_string()))
    }

    pub fn workbook_path(&self) -> PathBuf {
        expand(&self.workbook)
    }

    pub fn calendar_root(&self) -> PathBuf {
        expand(&self.calendar_dir)
    }

    /// The `[sync]` table, or the JSON settings value stored in the workbook.
    pub fn sync_config(&self, settings: &dyn SettingsStore) -> SyncResult<SyncConfig> {
        match &self.sync {
            Some(sync) => Ok(sync.clone()),
            None => SyncConfig::from_settings(settings, SYNC_CONFIG_KEY),
        }
    }

    /// Write a config file with every option commented out.
    pub fn create_default_config(path: &Path, timezone: &str) -> SyncResult<()> {
        let example = SyncConfig {
            calendar_id: "staff-schedule".into(),
            timezone: timezone.to_string(),
            staff_domain: Some("example.edu".into()),
            ..Default::default()
        };
        let sync_table = toml::to_string_pretty(&ExampleFile { sync: &example })
            .map_err(|e| SyncError::Config(e.to_string()))?;
        let commented: String = sync_table
            .lines()
            .map(|line| if line.is_empty() { "\n".to_string() } else { format!("# {line}\n") })
            .collect();

        let contents = format!(
            "\
# rostersync configuration

# Workbook holding the schedule tabs:
# workbook = \"{DEFAULT_WORKBOOK_PATH}\"

# Where calendar directories live:
# calendar_dir = \"{DEFAULT_CALENDAR_DIR}\"

# Sync settings. Without a [sync] table they are read from the workbook's
# \"{SYNC_CONFIG_KEY}\" setting.
{commented}"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::Config(format!("Could not create config directory: {e}")))?;
        }
        std::fs::write(path, contents)
            .map_err(|e| SyncError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettings;

    #[test]
    fn test_default_config_loads_with_everything_commented() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        AppConfig::create_default_config(&path, "America/New_York").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("# calendar_id = \"staff-schedule\""));
        assert!(contents.contains("# timezone = \"America/New_York\""));

        let config = AppConfig::load(Some(&path)).unwrap();
        assert!(config.sync.is_none());
        assert_eq!(config.workbook, PathBuf::from(DEFAULT_WORKBOOK_PATH));
    }

    #[test]
    fn test_sync_table_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            concat!(
                "workbook = \"/data/roster.json\"\n\n",
                "[sync]\ncalendar_id = \"staff\"\nprofile = \"shift\"\n\n",
                "[sync.pacing]\nwrite_delay_ms = 0\n",
            ),
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.workbook_path(), PathBuf::from("/data/roster.json"));
        let sync = config.sync_config(&MemorySettings::default()).unwrap();
        assert_eq!(sync.calendar_id, "staff");
        assert_eq!(sync.pacing.write_delay_ms, 0);
        assert_eq!(sync.source_tab, "Courses");
    }

    #[test]
    fn test_settings_store_fallback() {
        let mut settings = MemorySettings::default();
        let stored = SyncConfig {
            calendar_id: "from-workbook".into(),
            ..Default::default()
        };
        stored.save_to_settings(&mut settings, SYNC_CONFIG_KEY).unwrap();

        let config = AppConfig::default();
        assert_eq!(config.sync_config(&settings).unwrap().calendar_id, "from-workbook");
    }

    #[test]
    fn test_no_sync_settings_anywhere_is_a_config_error() {
        let err = AppConfig::default().sync_config(&MemorySettings::default()).unwrap_err();
        assert!(err.is_setup_failure());
    }
}
