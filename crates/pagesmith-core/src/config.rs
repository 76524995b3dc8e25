//! Configuration for the load state machine and the editing session.
//!
//! Settings are plain constructor parameters; [`Config`] only adds a TOML file
//! format so operators can tune them without recompiling.
//!
//! ## Example Configuration File
//!
//! ```toml
//! [manager]
//! max_retries = 3
//! timeout_ms = 10000
//! retry_delay_ms = 1000
//!
//! [session]
//! autosave_delay_ms = 5000
//! saved_display_ms = 2000
//! auto_homepage_on_root_context = false
//! new_page_title = "Untitled Page"
//! ```
//!
//! ```rust
//! use pagesmith_core::Config;
//!
//! let config = Config::from_toml_str("[manager]\nmax_retries = 5\n")?;
//! assert_eq!(config.manager.max_retries, 5);
//! assert_eq!(config.manager.timeout.as_millis(), 10_000);
//! # Ok::<(), pagesmith_core::Error>(())
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Upper bound on configured retries; beyond this a hung backend keeps the
/// editor in `Loading` for minutes.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Retry and timeout policy of [`crate::PageManager`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Extra attempts after the first failure.
    pub max_retries: u32,
    /// Deadline for a single attempt.
    #[serde(rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,
    /// Base delay; attempt `n` waits `retry_delay * n`.
    #[serde(rename = "retry_delay_ms", with = "millis")]
    pub retry_delay: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl ManagerConfig {
    /// Set the retry bound.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the per-attempt deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the base backoff delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Reject settings the manager cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(Error::Config(format!(
                "max_retries must be at most {MAX_RETRIES_LIMIT}, got {}",
                self.max_retries
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout_ms must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Auto-save and new-page policy of [`crate::EditingSession`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity window before an auto-save fires.
    #[serde(rename = "autosave_delay_ms", with = "millis")]
    pub autosave_delay: Duration,
    /// How long `Saved`/`Error` stays visible before returning to `Idle`.
    #[serde(rename = "saved_display_ms", with = "millis")]
    pub saved_display: Duration,
    /// Mark new pages created from the organization's root context as homepage.
    pub auto_homepage_on_root_context: bool,
    /// Title given to brand-new pages.
    pub new_page_title: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autosave_delay: Duration::from_secs(5),
            saved_display: Duration::from_secs(2),
            auto_homepage_on_root_context: false,
            new_page_title: "Untitled Page".to_string(),
        }
    }
}

impl SessionConfig {
    /// Set the auto-save debounce window.
    #[must_use]
    pub const fn with_autosave_delay(mut self, delay: Duration) -> Self {
        self.autosave_delay = delay;
        self
    }

    /// Set the homepage policy for new pages.
    #[must_use]
    pub const fn with_auto_homepage_on_root_context(mut self, enabled: bool) -> Self {
        self.auto_homepage_on_root_context = enabled;
        self
    }

    /// Reject settings the session cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.autosave_delay.is_zero() {
            return Err(Error::Config(
                "autosave_delay_ms must be greater than zero".into(),
            ));
        }
        if self.new_page_title.trim().is_empty() {
            return Err(Error::Config("new_page_title must not be empty".into()));
        }
        Ok(())
    }
}

/// Complete configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Load state machine settings.
    pub manager: ManagerConfig,
    /// Editing session settings.
    pub session: SessionConfig,
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml_str(&raw)
    }

    /// Write to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;
        fs::write(path, content).map_err(|e| Error::Config(format!("Failed to write config: {e}")))
    }

    /// Validate both sections.
    pub fn validate(&self) -> Result<()> {
        self.manager.validate()?;
        self.session.validate()
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
