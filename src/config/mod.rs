mod interpolation;
pub mod validation;

use serde::{Deserialize, Serialize};

pub use self::interpolation::resolve_variables;
use self::interpolation::resolve_variables_with;
use self::validation::validate_config;

/// Environment variable naming an alternate config file.
pub const CONFIG_PATH_ENV: &str = "THINKGATE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

const BASE_URL_ENV: &str = "UPSTREAM_BASE_URL";
const API_KEY_ENV: &str = "UPSTREAM_API_KEY";
const PORT_ENV: &str = "PORT";

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Undefined environment variable '{name}' referenced in config")]
    Interpolation { name: String },
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default)]
    pub base_path: String,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    300
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
            base_path: String::new(),
        }
    }
}

/// The single inference provider every request is forwarded to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_base_url() -> String {
    "https://integrate.api.nvidia.com/v1".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            proxy: None,
        }
    }
}

/// One public model id and the upstream id it is rewritten to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRoute {
    pub public: String,
    pub internal: String,
    /// Ask the upstream for extended reasoning output on this route.
    #[serde(default)]
    pub thinking: bool,
}

impl ModelRoute {
    fn new(public: &str, internal: &str, thinking: bool) -> Self {
        Self {
            public: public.to_string(),
            internal: internal.to_string(),
            thinking,
        }
    }
}

/// Static model table and fallback model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_routes")]
    pub routes: Vec<ModelRoute>,
}

fn default_model() -> String {
    "meta/llama-3.1-8b-instruct".to_string()
}

fn default_routes() -> Vec<ModelRoute> {
    vec![
        ModelRoute::new("gpt-3.5-turbo", "nvidia/llama-3.1-nemotron-ultra-253b-v1", false),
        ModelRoute::new("gpt-4", "qwen/qwen3-coder-480b-a35b-instruct", false),
        ModelRoute::new("gpt-4-turbo", "moonshotai/kimi-k2-instruct-0905", false),
        ModelRoute::new("gpt-4o", "deepseek-ai/deepseek-v3.1", true),
        ModelRoute::new("claude-3-opus", "openai/gpt-oss-120b", false),
        ModelRoute::new("claude-3-sonnet", "openai/gpt-oss-20b", false),
        ModelRoute::new("gemini-pro", "qwen/qwen3-next-80b-a3b-thinking", true),
    ]
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            routes: default_routes(),
        }
    }
}

/// Feature flags and request defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Splice reasoning into visible content; when off, reasoning is stripped.
    #[serde(default = "default_true")]
    pub show_reasoning: bool,
    /// Request extended reasoning output for every route.
    #[serde(default)]
    pub enable_thinking_mode: bool,
    #[serde(default = "default_temperature")]
    pub default_temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u64,
}

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_temperature() -> f64 {
    0.6
}
fn default_max_tokens() -> u64 {
    9024
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            show_reasoning: true,
            enable_thinking_mode: false,
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

impl AppConfig {
    /// Resolve `${VAR}` references in every string field. Comments and keys
    /// never reach this point, so only values are interpolated.
    fn resolve_variables<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolve = |value: &mut String| -> Result<(), ConfigError> {
            if value.contains("${") {
                *value = resolve_variables_with(value, lookup)?;
            }
            Ok(())
        };

        resolve(&mut self.server.host)?;
        resolve(&mut self.server.base_path)?;
        resolve(&mut self.upstream.base_url)?;
        resolve(&mut self.upstream.api_key)?;
        if let Some(proxy) = self.upstream.proxy.as_mut() {
            resolve(proxy)?;
        }
        resolve(&mut self.models.default_model)?;
        for route in &mut self.models.routes {
            resolve(&mut route.public)?;
            resolve(&mut route.internal)?;
        }
        resolve(&mut self.features.log_level)?;
        Ok(())
    }

    /// Apply the `UPSTREAM_BASE_URL`, `UPSTREAM_API_KEY` and `PORT` overrides.
    ///
    /// `lookup` abstracts the environment so callers can inject values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when `PORT` is not a valid port number.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.upstream.base_url = base_url;
        }
        if let Some(api_key) = lookup(API_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.upstream.api_key = api_key;
        }
        if let Some(port) = lookup(PORT_ENV) {
            self.server.port = port.trim().parse().map_err(|_| {
                ConfigError::Validation(format!("{PORT_ENV} must be a port number, got '{port}'"))
            })?;
        }
        Ok(())
    }
}

/// Parse a YAML document, then resolve `${VAR}` references in its string
/// values from the environment.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails and
/// [`ConfigError::Interpolation`] for undefined variables.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    parse_config_with(contents, |name| std::env::var(name).ok())
}

fn parse_config_with<F>(contents: &str, lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: AppConfig = serde_yaml::from_str(contents)?;
    config.resolve_variables(&lookup)?;
    Ok(config)
}

/// Load configuration from a YAML file, apply environment overrides and validate.
///
/// A missing file is not an error: defaults plus environment overrides are used.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => parse_config(&contents)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(err) => return Err(err.into()),
    };
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    validate_config(&config)?;
    Ok(config)
}
