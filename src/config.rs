use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Main configuration structure loaded from scripture_insights.toml and environment variables
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub insights: InsightsConfig,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// Inference endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL or full chat-completions URL of the local inference server
    pub endpoint: String,
    pub model: String,
    /// Token cap for insight generation
    pub max_tokens: u32,
    /// Token cap for reference normalization replies
    pub normalize_max_tokens: u32,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Upper bound on waiting for the inference lock; `None` waits indefinitely
    pub lock_timeout_ms: Option<u64>,
    /// Extra sampling parameters merged into every chat payload
    pub parameters: Map<String, Value>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut parameters = Map::new();
        parameters.insert("temperature".to_string(), Value::from(0.3));
        parameters.insert("top_p".to_string(), Value::from(0.9));
        Self {
            endpoint: "http://127.0.0.1:1234".to_string(),
            model: "local-model".to_string(),
            max_tokens: 1500,
            normalize_max_tokens: 32,
            timeout_ms: 120_000,
            max_retries: 2,
            retry_delay_ms: 500,
            lock_timeout_ms: None,
            parameters,
        }
    }
}

/// Behaviour of the insight pipeline
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InsightsConfig {
    pub default_translation: String,
    /// Ask the model to normalize references before falling back to the local parser
    pub llm_reference_normalization: bool,
    /// Append-only raw model output log; disabled when unset
    pub debug_log_path: Option<PathBuf>,
    pub max_input_chars: usize,
    /// Response cache lifetime; 0 disables caching
    pub cache_ttl_sec: u64,
    pub cache_max: usize,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            default_translation: "KJV".to_string(),
            llm_reference_normalization: true,
            debug_log_path: None,
            max_input_chars: 4000,
            cache_ttl_sec: 300,
            cache_max: 256,
        }
    }
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub http_bind: std::net::SocketAddr,
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            http_bind: std::net::SocketAddr::from(([127, 0, 0, 1], 5000)),
            log_level: "scripture_insights=info,tower_http=info".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load runtime configuration from environment variables
    pub fn load_from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("INSIGHTS_HTTP_BIND") {
            match v.parse::<std::net::SocketAddr>() {
                Ok(bind) => cfg.http_bind = bind,
                Err(_) => tracing::warn!("Ignoring unparseable INSIGHTS_HTTP_BIND '{}'", v),
            }
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            cfg.log_level = level;
        }
        cfg
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables.
    /// `path` wins over INSIGHTS_CONFIG, which wins over "scripture_insights.toml".
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Ok(env_path) = std::env::var("INSIGHTS_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::from_path(".env");
        }

        let config_path = path.map(Path::to_path_buf).unwrap_or_else(|| {
            PathBuf::from(
                std::env::var("INSIGHTS_CONFIG")
                    .unwrap_or_else(|_| "scripture_insights.toml".to_string()),
            )
        });

        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(content) => Self::from_toml_str(&content)?,
            Err(_) => {
                tracing::warn!(
                    "Config file {} not found, using defaults",
                    config_path.display()
                );
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.runtime = RuntimeConfig::load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("INSIGHTS_LLM_URL") {
            self.llm.endpoint = url;
            tracing::debug!("INSIGHTS_LLM_URL env override applied");
        }
        if let Ok(model) = std::env::var("INSIGHTS_LLM_MODEL") {
            self.llm.model = model;
            tracing::debug!("INSIGHTS_LLM_MODEL env override applied");
        }
        if let Some(timeout) = std::env::var("INSIGHTS_LLM_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.llm.timeout_ms = timeout;
        }
        if let Ok(translation) = std::env::var("INSIGHTS_DEFAULT_TRANSLATION") {
            self.insights.default_translation = translation;
        }
        if let Ok(path) = std::env::var("INSIGHTS_DEBUG_LOG") {
            self.insights.debug_log_path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
    }

    /// Validate and clamp values. Called once by [`Config::load`].
    pub fn validate(&mut self) -> anyhow::Result<()> {
        if !self.llm.endpoint.starts_with("http://") && !self.llm.endpoint.starts_with("https://")
        {
            anyhow::bail!(
                "llm.endpoint '{}' must start with http:// or https://",
                self.llm.endpoint
            );
        }
        if self.llm.model.trim().is_empty() {
            anyhow::bail!("llm.model must not be empty");
        }
        if self.llm.max_tokens == 0 || self.llm.normalize_max_tokens == 0 {
            anyhow::bail!("llm.max_tokens and llm.normalize_max_tokens must be > 0");
        }
        if self.llm.timeout_ms == 0 {
            anyhow::bail!("llm.timeout_ms must be > 0");
        }
        if self.llm.max_retries > 10 {
            tracing::warn!(
                "llm.max_retries {} exceeds max 10, clamping to 10",
                self.llm.max_retries
            );
            self.llm.max_retries = 10;
        }
        if self.insights.default_translation.trim().is_empty() {
            anyhow::bail!("insights.default_translation must not be empty");
        }
        if self.insights.max_input_chars == 0 {
            anyhow::bail!("insights.max_input_chars must be > 0");
        }
        if self.insights.cache_ttl_sec > 0 && self.insights.cache_max == 0 {
            anyhow::bail!("insights.cache_max must be > 0 when caching is enabled");
        }
        Ok(())
    }
}
