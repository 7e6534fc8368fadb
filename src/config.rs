//! Configuration loading and validation.

use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Steward configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Discord gateway settings.
    pub discord: DiscordConfig,

    /// Text generation provider settings.
    pub llm: LlmConfig,

    /// Optional knowledge base offered to the generator as a search tool.
    pub knowledge: KnowledgeConfig,

    /// Conversational channel behavior.
    pub chat: ChatConfig,

    /// Link, attachment and dump triage.
    pub triage: TriageConfig,

    /// Upstream release feed used for outdated-version warnings.
    pub release: ReleaseConfig,
}

/// Discord gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token. Normally supplied through `DISCORD_TOKEN`.
    pub token: Option<String>,
}

/// Text generation provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API (without `/v1`).
    pub base_url: String,

    /// Model name sent with every request.
    pub model: String,

    /// API key (from env or config file).
    pub api_key: Option<String>,

    /// Output token budget per completion call.
    pub max_output_tokens: u32,

    /// Maximum number of completion calls per turn when tools are in play.
    pub max_tool_steps: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai".into(),
            model: "openai/gpt-oss-120b".into(),
            api_key: None,
            // Keeps the answer inside a single Discord message.
            max_output_tokens: 1_750 / 4,
            max_tool_steps: 5,
        }
    }
}

/// Knowledge base (Upstash Search) configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub index: String,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            index: "knowledge-base".into(),
        }
    }
}

impl KnowledgeConfig {
    /// Endpoint and token, when both are set. The search tool needs both.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.url.as_deref()?, self.token.as_deref()?))
    }
}

/// Conversational channel configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Disable to run triage only.
    pub enabled: bool,

    /// Only channels whose name starts with this prefix get AI replies.
    pub channel_prefix: String,

    /// Quiet period before a burst of messages is answered.
    pub debounce_ms: u64,

    /// Interval between typing indicators while a reply is generated.
    pub typing_interval_secs: u64,

    /// Hard length limit of a single outgoing message, in characters.
    pub max_reply_chars: usize,

    /// Upper bound on a single generation turn.
    pub generation_timeout_secs: u64,

    /// Conversations untouched for this long are evicted.
    pub context_idle_secs: u64,

    /// Oldest turns are dropped once a conversation grows past this.
    pub max_history_messages: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_prefix: "chat-experiment".into(),
            debounce_ms: 1_000,
            typing_interval_secs: 8,
            max_reply_chars: 2_000,
            generation_timeout_secs: 120,
            context_idle_secs: 3_600,
            max_history_messages: 40,
        }
    }
}

impl ChatConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn typing_interval(&self) -> Duration {
        Duration::from_secs(self.typing_interval_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn context_idle(&self) -> Duration {
        Duration::from_secs(self.context_idle_secs)
    }
}

/// Triage pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// Re-upload text attachments to the paste service.
    pub auto_upload: bool,

    /// Paste service API used for re-uploads.
    pub upload_api: String,

    /// Public paste site users are pointed to.
    pub upload_website: String,

    /// Tesseract binary used for image attachments.
    pub ocr_command: String,

    /// Tesseract language pack.
    pub ocr_language: String,

    /// Project page that outdated-version warnings link to.
    pub download_url: String,

    /// Timeout for paste and image downloads.
    pub fetch_timeout_secs: u64,

    /// Role names whose members should not be pinged directly.
    pub staff_roles: Vec<String>,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            auto_upload: true,
            upload_api: "https://api.pastes.dev".into(),
            upload_website: "https://pastes.dev".into(),
            ocr_command: "tesseract".into(),
            ocr_language: "eng".into(),
            download_url: "https://modrinth.com/plugin/skinsrestorer/version".into(),
            fetch_timeout_secs: 30,
            staff_roles: vec!["Staff".into()],
        }
    }
}

/// Release feed configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    /// GitHub "latest release" endpoint.
    pub url: String,

    /// How often the cached release is refreshed.
    pub refresh_interval_secs: u64,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            url: "https://api.github.com/repos/SkinsRestorer/SkinsRestorer/releases/latest".into(),
            refresh_interval_secs: 20 * 60,
        }
    }
}

impl ReleaseConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Config {
    /// Load configuration from the default config file (if any) and environment.
    pub fn load() -> Result<Self> {
        let mut config = match Self::default_path().filter(|path| path.exists()) {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading config file");
                Self::parse_file(&path)?
            }
            None => Self::default(),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific config file path, then overlay environment secrets.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = Self::parse_file(path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Default config location: `<config dir>/steward/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("steward").join("config.toml"))
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|error| ConfigError::Load {
            path: path.display().to_string(),
            source: std::sync::Arc::new(error),
        })?;
        Self::from_toml_str(&raw, &path.display().to_string())
    }

    /// Parse a TOML document. Missing sections and keys fall back to defaults.
    pub fn from_toml_str(raw: &str, origin: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|error| {
            ConfigError::Parse {
                path: origin.to_string(),
                message: error.to_string(),
            }
            .into()
        })
    }

    /// Secrets and a handful of overrides come from the environment.
    fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("DISCORD_TOKEN") {
            self.discord.token = Some(token);
        }
        if let Some(key) = lookup("GROQ_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = lookup("STEWARD_MODEL") {
            self.llm.model = model;
        }
        if let Some(prefix) = lookup("STEWARD_CHAT_PREFIX") {
            self.chat.channel_prefix = prefix;
        }
        if let Some(url) = lookup("UPSTASH_SEARCH_REST_URL") {
            self.knowledge.url = Some(url);
        }
        if let Some(token) = lookup("UPSTASH_SEARCH_REST_TOKEN") {
            self.knowledge.token = Some(token);
        }
    }

    /// Check that everything the enabled features need is present.
    pub fn validate(&self) -> Result<()> {
        if self.discord.token.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingKey("DISCORD_TOKEN".into()).into());
        }

        if self.chat.enabled && self.llm.api_key.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingKey("GROQ_API_KEY".into()).into());
        }

        if self.chat.max_reply_chars < 4 {
            return Err(ConfigError::Invalid(format!(
                "chat.max_reply_chars must be at least 4, got {}",
                self.chat.max_reply_chars
            ))
            .into());
        }

        if self.chat.typing_interval_secs == 0 {
            return Err(
                ConfigError::Invalid("chat.typing_interval_secs must be positive".into()).into(),
            );
        }

        if self.chat.max_history_messages == 0 {
            return Err(
                ConfigError::Invalid("chat.max_history_messages must be positive".into()).into(),
            );
        }

        if self.llm.max_tool_steps == 0 {
            return Err(ConfigError::Invalid("llm.max_tool_steps must be positive".into()).into());
        }

        if self.release.refresh_interval_secs == 0 {
            return Err(
                ConfigError::Invalid("release.refresh_interval_secs must be positive".into())
                    .into(),
            );
        }

        Ok(())
    }
}
