//! Optional TOML configuration for the replay host.
//!
//! ```toml
//! poll_interval_ms = 10000
//! tick_interval_ms = 500
//! tail_comparison = 5
//! start_paused = true
//! user_agent = "futaba-replay"
//!
//! [keys]
//! speed_up = "d"
//! speed_down = "s"
//! toggle_pause = "x"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::KeyBindings;
use crate::error::ReplayError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Live update poll period.
    pub poll_interval_ms: u64,
    /// Playback tick period.
    pub tick_interval_ms: u64,
    /// Trailing entries compared when diffing captures.
    pub tail_comparison: usize,
    /// Wait for the toggle key before playback moves.
    pub start_paused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub keys: KeyBindings,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10_000,
            tick_interval_ms: 500,
            tail_comparison: 5,
            start_paused: true,
            user_agent: None,
            keys: KeyBindings::default(),
        }
    }
}

impl ReplayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(raw)?;
        config.keys = config.keys.normalized();
        Ok(config)
    }

    /// Read and parse a config file. A missing file is an error too: the
    /// path was asked for explicitly.
    pub fn load_from_path(path: &Path) -> Result<Self, ReplayError> {
        let config_error = |detail: String| ReplayError::Config {
            path: path.display().to_string(),
            detail,
        };
        let raw = fs::read_to_string(path).map_err(|e| config_error(format!("read failed: {e}")))?;
        Self::from_toml(&raw).map_err(|e| config_error(format!("parse failed: {e}")))
    }
}
