use std::{path::PathBuf, time::Duration};

use channel_keys::{Channel, derive_identifier};
use hotkey_manager::{DetectorConfig, MIN_POLL_INTERVAL};
use serde::{Deserialize, Serialize};
use tracing::warn;

fn default_store() -> PathBuf {
    PathBuf::from("keybindings.json")
}

fn default_poll_interval_ms() -> u64 {
    50
}

/// The codeplug whose channels are bound
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Codeplug {
    /// Codeplug file; only used to derive the keybinding identifier
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// JSON keybinding document
    #[serde(default = "default_store")]
    pub store: PathBuf,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    pub codeplug: Codeplug,
}

impl Config {
    pub fn from_ron(text: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }

    /// Keybinding profile identifier of the configured codeplug
    pub fn identifier(&self) -> String {
        derive_identifier(self.codeplug.path.as_deref())
    }

    /// Release detector settings; an interval below [`MIN_POLL_INTERVAL`] is
    /// raised to it.
    pub fn detector(&self) -> DetectorConfig {
        let mut interval = Duration::from_millis(self.poll_interval_ms);
        if interval < MIN_POLL_INTERVAL {
            warn!(
                poll_interval_ms = self.poll_interval_ms,
                "poll interval too short; clamped"
            );
            interval = MIN_POLL_INTERVAL;
        }
        DetectorConfig::default().with_interval(interval)
    }
}
