use anyhow::{Context, Result};
use lexicards_core::{SchedulerParams, DEFAULT_MAX_ATTEMPTS};
use lexicards_json::paths::default_settings_file;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Optional `settings.json`. Missing keys fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scheduler: SchedulerParams,
    /// Attempts per review when the card is written concurrently.
    pub review_max_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scheduler: SchedulerParams::default(),
            review_max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl Settings {
    /// An explicit path must exist. Without one, the file in the data
    /// directory is used when present.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let settings = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = default_settings_file();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        settings
            .scheduler
            .validate()
            .context("invalid scheduler settings")?;
        Ok(settings)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&data)
            .with_context(|| format!("parsing settings {}", path.display()))?;
        debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }
}
