use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Locations searched, in order, when no explicit config path is given.
const DEFAULT_CONFIG_PATHS: [&str; 3] = ["./ideal.toml", "~/.config/ideal/config.toml", "~/.ideal.toml"];

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

/// Where the assistant service lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    pub stream_path: String,
    pub session_path: String,
    /// Connect timeout for requests (no overall timeout: a turn streams until the server ends it)
    pub timeout_seconds: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            stream_path: "/chat/stream".to_string(),
            session_path: "/session".to_string(),
            timeout_seconds: None,
        }
    }
}

impl ServerConfig {
    pub fn stream_url(&self) -> String {
        join_url(&self.base_url, &self.stream_path)
    }

    pub fn session_url(&self) -> String {
        join_url(&self.base_url, &self.session_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// What to do with a response line that is not valid JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecodeFailurePolicy {
    /// Drop the line and log a warning
    #[default]
    Discard,
    /// Append the raw line to the assistant text as-is
    Literal,
}

/// Which buffering implementation drives text emissions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BufferingStrategy {
    /// Rate-limited, holds text until its markdown is balanced
    #[default]
    MarkdownSafe,
    /// Cuts at the last sentence end or closed code fence
    Sentence,
    /// Emits after every text event
    Immediate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Minimum gap between two text emissions
    pub emit_interval_ms: u64,
    /// Pending text longer than this is flushed even if its markdown is unbalanced
    pub max_pending_chars: usize,
    pub decode_failures: DecodeFailurePolicy,
    pub buffering: BufferingStrategy,
    /// Text returned in place of the reply when a turn fails
    pub error_message: String,
    pub image_mime_types: Vec<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            emit_interval_ms: 100,
            max_pending_chars: 150,
            decode_failures: DecodeFailurePolicy::Discard,
            buffering: BufferingStrategy::MarkdownSafe,
            error_message: "Error reaching agent".to_string(),
            image_mime_types: vec!["image/png".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Directory that received images are written to
    pub image_dir: Option<String>,
}

impl UiConfig {
    /// `image_dir` with a leading `~` expanded.
    pub fn image_dir_path(&self) -> Option<PathBuf> {
        self.image_dir
            .as_deref()
            .map(|dir| PathBuf::from(shellexpand::tilde(dir).as_ref()))
    }
}

impl Config {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let config_path_to_load = match config_path {
            Some(path) => {
                let expanded_path = shellexpand::tilde(path);
                if !Path::new(expanded_path.as_ref()).exists() {
                    anyhow::bail!("Config file not found: {}", path);
                }
                Some(expanded_path.to_string())
            }
            None => DEFAULT_CONFIG_PATHS.iter().find_map(|path| {
                let expanded_path = shellexpand::tilde(path);
                if Path::new(expanded_path.as_ref()).exists() {
                    Some(expanded_path.to_string())
                } else {
                    None
                }
            }),
        };

        let Some(path) = config_path_to_load else {
            return Ok(Self::default());
        };

        let config_content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&config_content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
        config.validate()?;

        Ok(config)
    }

    pub fn load_with_overrides(config_path: Option<&str>, server_override: Option<String>) -> Result<Self> {
        let mut config = Self::load(config_path)?;

        if let Some(base_url) = server_override {
            config.server.base_url = base_url;
            config.validate()?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let base_url = self.server.base_url.trim();
        if base_url.is_empty() {
            anyhow::bail!("server.base_url must not be empty");
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            anyhow::bail!(
                "server.base_url '{}' must start with http:// or https://",
                base_url
            );
        }
        if self.stream.max_pending_chars == 0 {
            anyhow::bail!("stream.max_pending_chars must be greater than zero");
        }
        Ok(())
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// The per-user config file location, `~/.config/ideal/config.toml`.
    pub fn default_user_path() -> PathBuf {
        dirs::home_dir()
            .map(|mut path| {
                path.push(".config");
                path.push("ideal");
                path
            })
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}
