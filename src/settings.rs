use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::sampling::{sampler::DEFAULT_SAMPLING_INTERVAL_MS, SamplingConfig};

pub const SETTINGS_FILE_NAME: &str = "settings.json";
const DEFAULT_LIVE_QUEUE_DEPTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyticsSettings {
    /// Minimum wall-clock gap between two persisted observations.
    pub sampling_interval_ms: u64,
    /// Frames buffered for display before live frames are dropped.
    pub live_queue_depth: usize,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            sampling_interval_ms: DEFAULT_SAMPLING_INTERVAL_MS,
            live_queue_depth: DEFAULT_LIVE_QUEUE_DEPTH,
        }
    }
}

impl AnalyticsSettings {
    pub fn sampling_config(&self) -> Result<SamplingConfig> {
        SamplingConfig::from_millis(self.sampling_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    analytics: AnalyticsSettings,
}

/// JSON-backed settings kept in the data directory.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "Ignoring unreadable settings in {}: {err}; using defaults",
                    path.display()
                );
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn in_dir(data_dir: &Path) -> Result<Self> {
        Self::new(data_dir.join(SETTINGS_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn analytics(&self) -> AnalyticsSettings {
        self.read().analytics.clone()
    }

    /// Validates and persists new analytics settings.
    pub fn update_analytics(&self, settings: AnalyticsSettings) -> Result<()> {
        settings
            .sampling_config()
            .context("refusing to save invalid analytics settings")?;

        let mut guard = self.write();
        let previous = std::mem::replace(&mut guard.analytics, settings);
        if let Err(err) = self.persist(&guard) {
            guard.analytics = previous;
            return Err(err);
        }
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create settings directory {}", parent.display())
                })?;
            }
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
