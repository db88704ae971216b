//! Configuration for the orchestration core
//!
//! - [`CoreConfig`] - timing constants, storage locations and the agent command
//! - [`Settings`] / [`SettingsStore`] - user API settings persisted as JSON

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::persist::{read_json, write_json_atomic};

/// One rendering frame; the minimum spacing between partial-text flushes
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(16);

/// Delay between the final flush of a block and clearing the partial text
pub const DEFAULT_CLEAR_GRACE: Duration = Duration::from_millis(500);

/// Default maximum size of one JSON line from the agent process (1MB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Default sampling temperature
const DEFAULT_TEMPERATURE: f64 = 0.3;

/// Base directory override
const HOME_ENV: &str = "AGENT_COWORK_HOME";

/// Agent command line override
const AGENT_ENV: &str = "AGENT_COWORK_AGENT";

/// Program the subprocess runtime launches when nothing is configured
const DEFAULT_AGENT_PROGRAM: &str = "agent-cowork-runtime";

/// Program and arguments of the agent runtime process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    /// Executable name or path
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
}

impl AgentCommand {
    /// Parse a whitespace-separated command line
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace().map(String::from);
        let program = parts
            .next()
            .ok_or_else(|| CoreError::invalid_config("agent command is empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl Default for AgentCommand {
    fn default() -> Self {
        Self {
            program: DEFAULT_AGENT_PROGRAM.to_string(),
            args: Vec::new(),
        }
    }
}

/// Core configuration
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Minimum spacing between coalesced partial-text flushes
    pub flush_interval: Duration,
    /// Delay before the partial text is cleared after a block stops
    pub clear_grace: Duration,
    /// Where user settings are persisted
    pub settings_path: PathBuf,
    /// Directory of archived sessions
    pub archive_dir: PathBuf,
    /// Agent runtime process
    pub agent_command: AgentCommand,
    /// Line buffer limit for the agent process transport
    pub max_line_bytes: usize,
}

impl CoreConfig {
    /// Configuration rooted at `home`
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            clear_grace: DEFAULT_CLEAR_GRACE,
            settings_path: home.join("settings.json"),
            archive_dir: home.join("sessions"),
            agent_command: AgentCommand::default(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    /// Configuration from `AGENT_COWORK_HOME` / `AGENT_COWORK_AGENT`
    ///
    /// # Errors
    /// Returns error if no base directory can be determined or the agent
    /// command is empty
    pub fn from_env() -> Result<Self> {
        let home = match std::env::var_os(HOME_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .map(|dir| dir.join("agent-cowork"))
                .ok_or_else(|| CoreError::invalid_config("no config directory available"))?,
        };
        let mut config = Self::with_home(home);
        if let Ok(line) = std::env::var(AGENT_ENV) {
            config.agent_command = AgentCommand::parse(&line)?;
        }
        Ok(config)
    }
}

/// API settings edited by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Model provider API key
    #[serde(default)]
    pub api_key: String,
    /// Model provider base URL
    #[serde(default)]
    pub base_url: String,
    /// Model name
    #[serde(default)]
    pub model: String,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Search API key for the web tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tavily_api_key: Option<String>,
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: String::new(),
            model: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            tavily_api_key: None,
        }
    }
}

impl Settings {
    /// Trim every field; an empty search key becomes `None` and a non-finite
    /// temperature falls back to the default
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            api_key: self.api_key.trim().to_string(),
            base_url: self.base_url.trim().to_string(),
            model: self.model.trim().to_string(),
            temperature: if self.temperature.is_finite() {
                self.temperature
            } else {
                DEFAULT_TEMPERATURE
            },
            tavily_api_key: self
                .tavily_api_key
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
        }
    }
}

/// File-backed settings with an in-memory copy
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<Settings>,
}

impl SettingsStore {
    /// Store backed by `path`; call [`SettingsStore::load`] to read it
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(Settings::default()),
        }
    }

    /// Read settings from disk, defaults when the file does not exist
    pub async fn load(&self) -> Result<Settings> {
        let settings = read_json::<Settings>(&self.path).await?.unwrap_or_default();
        *self.current.write() = settings.clone();
        Ok(settings)
    }

    /// Normalize, persist and adopt new settings
    pub async fn save(&self, settings: Settings) -> Result<Settings> {
        let settings = settings.normalized();
        write_json_atomic(&self.path, &settings).await?;
        *self.current.write() = settings.clone();
        log::info!("Settings saved to {}", self.path.display());
        Ok(settings)
    }

    /// Settings currently in effect
    #[must_use]
    pub fn current(&self) -> Settings {
        self.current.read().clone()
    }
}
