//! Configuration for a link endpoint

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// Colors used by the notice presenter, as `RRGGBB` hex strings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Theme {
    /// Informational notices
    pub notice_color: String,
    /// Warnings about imminent orientation changes
    pub warning_color: String,
    /// Participant names
    pub player_color: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            notice_color: "00FFD1".to_string(),
            warning_color: "FF0F0F".to_string(),
            player_color: "5200FF".to_string(),
        }
    }
}

/// Main configuration for server and client endpoints
///
/// Every field has a default, so a JSON document only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Taking damage toggles the pair's orientation
    pub pain_flip: bool,

    /// Jumping toggles the pair's orientation
    pub gravity_jump: bool,

    /// Delay between receiving a flipped pairing and enacting it, in milliseconds
    /// Leaves time for the pairing notices to be read before gravity changes
    pub grace_delay_ms: u64,

    /// Notice colors
    pub theme: Theme,

    /// Key expression prefix for all link traffic
    pub keyexpr_prefix: String,

    /// Timeout for node step() methods in milliseconds
    /// A client step() returns early when it has notices to present
    pub step_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            pain_flip: false,
            gravity_jump: false,
            grace_delay_ms: 5000,
            theme: Theme::default(),
            keyexpr_prefix: "gravity/link".to_string(),
            step_timeout_ms: 1000,
        }
    }
}

impl LinkConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Enable or disable damage-triggered toggles
    pub fn with_pain_flip(mut self, enabled: bool) -> Self {
        self.pain_flip = enabled;
        self
    }

    /// Enable or disable jump-triggered toggles
    pub fn with_gravity_jump(mut self, enabled: bool) -> Self {
        self.gravity_jump = enabled;
        self
    }

    /// Set the pairing grace delay in milliseconds
    pub fn with_grace_delay_ms(mut self, delay_ms: u64) -> Self {
        self.grace_delay_ms = delay_ms;
        self
    }

    /// Set the notice colors
    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    /// Set the key expression prefix
    pub fn with_keyexpr_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.keyexpr_prefix = prefix.into();
        self
    }

    /// Set the step timeout in milliseconds
    pub fn with_step_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.step_timeout_ms = timeout_ms;
        self
    }

    /// Pairing grace delay as a duration
    pub fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.grace_delay_ms)
    }

    /// Step timeout as a duration
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }
}
