use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::runtime::RuntimeConfig;

pub const DEFAULT_COMMIT_PROMPT: &str = "Write a git commit message for the staged changes below.\n\
Use an imperative subject line of at most 72 characters, then an optional short body.\n\
Reply with the commit message only.\n\n\
Files:\n{{ stat }}\n\nDiff:\n{{ diff }}\n";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TerminalConfig {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self { cols: 120, rows: 40 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreviewConfig {
    pub command: Vec<String>,
    pub marker_file: String,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            command: vec!["npm".to_string(), "run".to_string(), "dev".to_string()],
            marker_file: "package.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: Option<PathBuf>,
    pub poll_interval_ms: u64,
    pub chat_debounce_ms: u64,
    pub commit_message_timeout_secs: u64,
    pub terminal: TerminalConfig,
    /// Entries replace the built-in runtime with the same id.
    pub runtimes: Vec<RuntimeConfig>,
    pub preview: PreviewConfig,
    pub commit_prompt: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            poll_interval_ms: 2000,
            chat_debounce_ms: 300,
            commit_message_timeout_secs: 90,
            terminal: TerminalConfig::default(),
            runtimes: Vec::new(),
            preview: PreviewConfig::default(),
            commit_prompt: DEFAULT_COMMIT_PROMPT.to_string(),
        }
    }
}

impl Config {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let path = config_path.unwrap_or_else(Self::default_config_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            let config: Config = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn default_config_path() -> PathBuf {
        if let Some(config_path) = std::env::var_os("FJORD_CONFIG") {
            PathBuf::from(config_path)
        } else {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("fjord")
                .join("config.yaml")
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("fjord")
        })
    }

    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        self.data_dir = Some(data_dir);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn chat_debounce(&self) -> Duration {
        Duration::from_millis(self.chat_debounce_ms)
    }

    pub fn commit_message_timeout(&self) -> Duration {
        Duration::from_secs(self.commit_message_timeout_secs)
    }
}
