//! Configuration system (layered: CLI > env > `paiprog.toml` > defaults).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PaiprogError, Result};

pub const CONFIG_FILE_NAME: &str = "paiprog.toml";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_ASSISTANT_NAME: &str = "baseAssistant";
pub const DEFAULT_INSTRUCTIONS: &str =
    "You are a helpful assistant. Use any tools available to help the user";

/// Settings describing the assistant to keep in sync with the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantSettings {
    pub name: String,
    pub description: String,
    pub model: String,
    pub instructions: String,
    /// Allow-list of tool names; `None` registers every built-in tool.
    pub tools: Option<Vec<String>>,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_ASSISTANT_NAME.to_string(),
            description: String::new(),
            model: DEFAULT_MODEL.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            tools: None,
        }
    }
}

/// Resolved configuration for one process.
#[derive(Clone, PartialEq, Eq)]
pub struct PaiprogConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub poll_interval: Duration,
    /// Root for local state such as the assistant cache.
    pub home_dir: PathBuf,
    pub assistant: AssistantSettings,
}

impl std::fmt::Debug for PaiprogConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaiprogConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("poll_interval", &self.poll_interval)
            .field("home_dir", &self.home_dir)
            .field("assistant", &self.assistant)
            .finish()
    }
}

impl Default for PaiprogConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            poll_interval: Duration::from_secs(1),
            home_dir: default_home_dir(),
            assistant: AssistantSettings::default(),
        }
    }
}

/// Shape of `paiprog.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    assistant_name: Option<String>,
    description: Option<String>,
    model: Option<String>,
    instructions: Option<String>,
    tools: Option<Vec<String>>,
    poll_interval_ms: Option<u64>,
}

impl PaiprogConfig {
    /// Load `.env`, then `paiprog.toml` from `dir`, then the process environment.
    pub fn load(dir: &Path) -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::default();
        config.apply_file(&dir.join(CONFIG_FILE_NAME))?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Merge a config file if it exists.
    pub fn apply_file(&mut self, path: &Path) -> Result<()> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let file: ConfigFile = toml::from_str(&raw)
            .map_err(|e| PaiprogError::Configuration(format!("{}: {e}", path.display())))?;

        let assistant = &mut self.assistant;
        if let Some(name) = file.assistant_name {
            assistant.name = name;
        }
        if let Some(description) = file.description {
            assistant.description = description;
        }
        if let Some(model) = file.model {
            assistant.model = model;
        }
        if let Some(instructions) = file.instructions {
            assistant.instructions = instructions;
        }
        if file.tools.is_some() {
            assistant.tools = file.tools;
        }
        if let Some(ms) = file.poll_interval_ms {
            self.poll_interval = Duration::from_millis(ms);
        }
        Ok(())
    }

    /// Merge environment variables read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL").filter(|u| !u.is_empty()) {
            self.base_url = Some(url);
        }
        if let Some(ms) = lookup("PAIPROG_POLL_INTERVAL_MS") {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                PaiprogError::Configuration(format!(
                    "PAIPROG_POLL_INTERVAL_MS must be a whole number of milliseconds, got '{ms}'"
                ))
            })?;
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(home) = lookup("PAIPROG_HOME").filter(|h| !h.is_empty()) {
            self.home_dir = PathBuf::from(home);
        }
        Ok(())
    }

    /// Apply command-line overrides, which win over every other layer.
    pub fn apply_overrides(&mut self, assistant_name: Option<String>, model: Option<String>) {
        if let Some(name) = assistant_name {
            self.assistant.name = name;
        }
        if let Some(model) = model {
            self.assistant.model = model;
        }
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            PaiprogError::Configuration(
                "OPENAI_API_KEY is not set (environment or .env)".to_string(),
            )
        })
    }

    /// Directory holding one cache file per assistant.
    pub fn assistant_cache_dir(&self) -> PathBuf {
        self.home_dir.join("assistants")
    }
}

fn default_home_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".paiprog"))
        .unwrap_or_else(|| PathBuf::from(".paiprog"))
}
