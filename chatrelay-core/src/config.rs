// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required fields and provides sensible defaults for optional ones
use crate::chat::ChatSettings;
use crate::traits::Sender;
use anyhow::{Context, Result};
use chatrelay_llm::{BackendConfig, ImageSize};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful ChatGPT bot based on OpenAI GPT Language model. You are a helpful assistant that always tries to help and answer with relevant information as possible.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub completion: BackendConfig,
    #[serde(default)]
    pub chat: ChatDefaults,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub images: ImageConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

// ─── TelegramConfig ─────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Long-poll timeout for getUpdates
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u32,
}

// Custom Debug impl to redact bot_token
impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

// ─── ChatDefaults ───────────────────────────────────────────────

/// Settings every newly seen chat starts with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatDefaults {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default)]
    pub use_markdown: bool,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for ChatDefaults {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_history: default_max_history(),
            use_markdown: false,
            system_prompt: default_system_prompt(),
        }
    }
}

impl ChatDefaults {
    pub fn to_settings(&self) -> ChatSettings {
        ChatSettings {
            temperature: self.temperature,
            model: self.model.clone(),
            max_history: self.max_history,
            use_markdown: self.use_markdown,
            system_prompt: self.system_prompt.clone(),
        }
    }
}

// ─── AccessConfig ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Empty means everyone may use the bot
    #[serde(default)]
    pub authorized_users: Vec<i64>,
    /// Receives shadow copies of conversations and access notices
    #[serde(default)]
    pub admin_id: Option<i64>,
    /// Senders whose conversations are not shadow-forwarded
    #[serde(default)]
    pub ignore_report_ids: Vec<i64>,
}

impl AccessConfig {
    pub fn is_authorized(&self, user_id: i64) -> bool {
        self.authorized_users.is_empty() || self.authorized_users.contains(&user_id)
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_id == Some(user_id)
    }

    /// Whether a conversation with `sender` should be copied to the admin
    pub fn should_report(&self, sender: &Sender) -> bool {
        self.admin_id.is_some()
            && !self.is_admin(sender.id)
            && !self.ignore_report_ids.contains(&sender.id)
    }
}

// ─── PipelineConfig ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

// ─── StorageConfig ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("chats.db")
    }

    pub fn transcript_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("log")
    }

    pub fn log_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("logs")
    }
}

// ─── ImageConfig ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Minimum delay between image generations in one chat
    #[serde(default = "default_image_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default)]
    pub size: ImageSize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_image_cooldown_secs(),
            size: ImageSize::default(),
        }
    }
}

impl ImageConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

// ─── MetricsConfig ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics on this port when set
    #[serde(default)]
    pub prometheus_port: Option<u16>,
}

fn default_poll_timeout_secs() -> u32 {
    30
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f32 {
    0.8
}

fn default_max_history() -> usize {
    10
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_workers() -> usize {
    10
}

fn default_queue_capacity() -> usize {
    100
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_image_cooldown_secs() -> u64 {
    60
}

/// Expand tilde (~) to home directory in paths
fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs
                .home_dir()
                .join(stripped)
                .to_string_lossy()
                .to_string();
        }
        tracing::warn!(
            path = %path,
            "Failed to expand tilde in path: could not determine home directory"
        );
    }
    path.to_string()
}

fn parse_env<T: FromStr>(key: &str, val: &str) -> Result<T> {
    val.trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a valid number, got: {}", key, val))
}

fn parse_id_list(key: &str, val: &str) -> Result<Vec<i64>> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_env(key, s))
        .collect()
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. CHATRELAY_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory - for development)
    /// 3. ~/.config/chatrelay/config.toml (platform config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("CHATRELAY_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let user_config = directories::ProjectDirs::from("", "", "chatrelay")
            .map(|dirs| dirs.config_dir().join("config.toml"))?;
        if user_config.exists() {
            return Some(user_config);
        }

        None
    }

    /// Parse a TOML document without applying overrides or validation
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config TOML")
    }

    /// Load configuration with environment variable overrides.
    /// An explicit `path` wins over the search order; a missing explicit file is an error.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                Some(p.to_path_buf())
            }
            None => Self::find_config_file(),
        };

        let mut config = if let Some(config_path) = config_path {
            tracing::info!(
                path = %config_path.display(),
                "Loading configuration from file"
            );
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config::default()
        };

        config.apply_env_overrides()?;
        config.storage.data_dir = expand_tilde(&config.storage.data_dir);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the search path with environment variable overrides
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = val;
        }
        if let Ok(val) = std::env::var("TELEGRAM_POLL_TIMEOUT") {
            self.telegram.poll_timeout_secs = parse_env("TELEGRAM_POLL_TIMEOUT", &val)?;
        }
        if let Ok(val) = std::env::var("COMPLETION_PROVIDER") {
            self.completion.provider = val;
        }
        // Legacy env var support
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            self.completion.api_key = val;
        }
        if let Ok(val) = std::env::var("COMPLETION_API_KEY") {
            self.completion.api_key = val;
        }
        if let Ok(val) = std::env::var("COMPLETION_API_URL") {
            self.completion.api_url = val;
        }
        if let Ok(val) = std::env::var("ADMIN_ID") {
            self.access.admin_id = Some(parse_env("ADMIN_ID", &val)?);
        }
        if let Ok(val) = std::env::var("AUTHORIZED_USERS") {
            self.access.authorized_users = parse_id_list("AUTHORIZED_USERS", &val)?;
        }
        if let Ok(val) = std::env::var("IGNORE_REPORT_IDS") {
            self.access.ignore_report_ids = parse_id_list("IGNORE_REPORT_IDS", &val)?;
        }
        if let Ok(val) = std::env::var("WORKER_COUNT") {
            self.pipeline.workers = parse_env("WORKER_COUNT", &val)?;
        }
        if let Ok(val) = std::env::var("QUEUE_CAPACITY") {
            self.pipeline.queue_capacity = parse_env("QUEUE_CAPACITY", &val)?;
        }
        if let Ok(val) = std::env::var("MAX_HISTORY") {
            self.chat.max_history = parse_env("MAX_HISTORY", &val)?;
        }
        if let Ok(val) = std::env::var("DATA_DIR") {
            self.storage.data_dir = val;
        }
        if let Ok(val) = std::env::var("PROMETHEUS_PORT") {
            self.metrics.prometheus_port = Some(parse_env("PROMETHEUS_PORT", &val)?);
        }
        Ok(())
    }

    /// Check invariants that the rest of the program relies on
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!(
                "telegram.bot_token is required (set in config.toml or TELEGRAM_BOT_TOKEN env var)"
            );
        }
        if self.completion.provider != "mock" && self.completion.api_key.trim().is_empty() {
            anyhow::bail!(
                "completion.api_key is required (set in config.toml or COMPLETION_API_KEY env var)"
            );
        }
        if self.pipeline.workers == 0 {
            anyhow::bail!("pipeline.workers must be at least 1");
        }
        if self.pipeline.queue_capacity == 0 {
            anyhow::bail!("pipeline.queue_capacity must be at least 1");
        }
        if self.chat.max_history == 0 {
            anyhow::bail!("chat.max_history must be at least 1");
        }
        if !(0.0..=2.0).contains(&self.chat.temperature) {
            anyhow::bail!(
                "chat.temperature must be between 0.0 and 2.0, got {}",
                self.chat.temperature
            );
        }
        Ok(())
    }
}
