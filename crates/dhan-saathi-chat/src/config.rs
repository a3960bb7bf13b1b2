//! Chat client configuration.
//!
//! Values come from an optional TOML file; every field has a default so an
//! empty file (or no file) yields a working local setup.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Error loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Pacing of the typing effect.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RevealConfig {
    /// Milliseconds between reveal ticks.
    #[serde(default = "RevealConfig::default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Characters revealed per tick when the reveal is keeping up.
    #[serde(default = "RevealConfig::default_chars_per_tick")]
    pub chars_per_tick: usize,

    /// Lag, in characters, above which the step grows.
    #[serde(default = "RevealConfig::default_catch_up_threshold")]
    pub catch_up_threshold: usize,

    /// When catching up, reveal `lag / catch_up_divisor` characters per tick.
    #[serde(default = "RevealConfig::default_catch_up_divisor")]
    pub catch_up_divisor: usize,
}

impl RevealConfig {
    const fn default_tick_interval() -> u64 {
        40
    }

    const fn default_chars_per_tick() -> usize {
        2
    }

    const fn default_catch_up_threshold() -> usize {
        120
    }

    const fn default_catch_up_divisor() -> usize {
        8
    }

    /// Get the tick interval as a `Duration`.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "reveal.tick_interval_ms",
                reason: "must be greater than zero",
            });
        }
        if self.chars_per_tick == 0 {
            return Err(ConfigError::Invalid {
                field: "reveal.chars_per_tick",
                reason: "must be greater than zero",
            });
        }
        if self.catch_up_divisor == 0 {
            return Err(ConfigError::Invalid {
                field: "reveal.catch_up_divisor",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: Self::default_tick_interval(),
            chars_per_tick: Self::default_chars_per_tick(),
            catch_up_threshold: Self::default_catch_up_threshold(),
            catch_up_divisor: Self::default_catch_up_divisor(),
        }
    }
}

/// Configuration for a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatConfig {
    /// WebSocket endpoint of the assistant.
    #[serde(default = "ChatConfig::default_ws_url")]
    pub ws_url: String,

    /// Base URL of the dashboard REST API.
    #[serde(default = "ChatConfig::default_api_base_url")]
    pub api_base_url: String,

    /// WebSocket handshake timeout in seconds.
    #[serde(default = "ChatConfig::default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Seconds to wait for the first frame of a reply before failing the
    /// turn. `0` disables the timeout.
    #[serde(default = "ChatConfig::default_response_timeout")]
    pub response_timeout_seconds: u64,

    /// Seconds of silence after which a reply that has received text but no
    /// completion marker is treated as complete and the connection is
    /// closed. `0` (the default) waits for the marker or the connection to
    /// end.
    #[serde(default = "ChatConfig::default_reply_idle")]
    pub reply_idle_seconds: u64,

    /// Greeting seeded into the log. Empty for none.
    #[serde(default = "ChatConfig::default_welcome_message")]
    pub welcome_message: String,

    /// Typing effect.
    #[serde(default)]
    pub reveal: RevealConfig,
}

impl ChatConfig {
    fn default_ws_url() -> String {
        "ws://localhost:8000/interact".to_string()
    }

    fn default_api_base_url() -> String {
        "http://localhost:5000".to_string()
    }

    const fn default_connect_timeout() -> u64 {
        10
    }

    const fn default_response_timeout() -> u64 {
        60
    }

    const fn default_reply_idle() -> u64 {
        0
    }

    fn default_welcome_message() -> String {
        "Hello! I'm Dhan Saathi, your AI finance assistant. I can help you understand your \
         spending, suggest savings strategies and recommend investments. How can I help you today?"
            .to_string()
    }

    /// Load and validate a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&raw)
    }

    /// Parse and validate TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be parsed or validated.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ws_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "ws_url",
                reason: "must not be empty",
            });
        }
        if self.connect_timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "connect_timeout_seconds",
                reason: "must be greater than zero",
            });
        }
        self.reveal.validate()
    }

    /// Get the connect timeout as a `Duration`.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get the first-frame timeout, if enabled.
    #[must_use]
    pub fn response_timeout(&self) -> Option<Duration> {
        (self.response_timeout_seconds > 0).then(|| Duration::from_secs(self.response_timeout_seconds))
    }

    /// Get the reply idle period, if enabled.
    #[must_use]
    pub fn reply_idle(&self) -> Option<Duration> {
        (self.reply_idle_seconds > 0).then(|| Duration::from_secs(self.reply_idle_seconds))
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            ws_url: Self::default_ws_url(),
            api_base_url: Self::default_api_base_url(),
            connect_timeout_seconds: Self::default_connect_timeout(),
            response_timeout_seconds: Self::default_response_timeout(),
            reply_idle_seconds: Self::default_reply_idle(),
            welcome_message: Self::default_welcome_message(),
            reveal: RevealConfig::default(),
        }
    }
}
