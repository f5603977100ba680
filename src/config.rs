//! Environment-driven configuration
//!
//! Values come from `SECTION_KEY` environment variables (a `.env` file is
//! loaded first). Anything missing or unparseable falls back to its default.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: String,
    pub llm: LlmConfig,
    pub analysis_min_interval: Duration,
    pub web_ui: WebUiConfig,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: String,
    pub api_key: String,
    /// `None` selects the provider's default model
    pub model: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct WebUiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            api_key: String::new(),
            model: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl AppConfig {
    /// Load `.env` (if present) and read configuration from the environment
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from any variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let source = EnvSource { lookup };

        let model = source.get("llm", "model").filter(|m| !m.trim().is_empty());

        Self {
            database_path: source.get_or("database", "path", "data/cars.db".to_string()),
            llm: LlmConfig {
                provider: source.get_or("llm", "provider", "deepseek".to_string()),
                api_key: source.get_or("llm", "api_key", String::new()),
                model,
                timeout: Duration::from_secs(source.get_parsed("llm", "timeout_secs", 60u64)),
            },
            analysis_min_interval: Duration::from_millis(
                source.get_parsed("analysis", "min_interval_ms", 500u64),
            ),
            web_ui: WebUiConfig {
                enabled: source.get_bool("web_ui", "enabled", true),
                host: source.get_or("web_ui", "host", "127.0.0.1".to_string()),
                port: source.get_parsed("web_ui", "port", 5000u16),
            },
        }
    }
}

struct EnvSource<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvSource<F> {
    fn get(&self, section: &str, key: &str) -> Option<String> {
        let name = var_name(section, key);
        let value = (self.lookup)(&name);
        if value.is_none() {
            debug!(variable = %name, "Environment variable not set, using default");
        }
        value
    }

    fn get_or(&self, section: &str, key: &str, default: String) -> String {
        self.get(section, key).unwrap_or(default)
    }

    fn get_parsed<T>(&self, section: &str, key: &str, default: T) -> T
    where
        T: FromStr + std::fmt::Display,
    {
        let Some(raw) = self.get(section, key) else {
            return default;
        };

        raw.trim().parse().unwrap_or_else(|_| {
            warn!(
                variable = %var_name(section, key),
                value = %raw,
                default = %default,
                "Could not parse environment variable, using default"
            );
            default
        })
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.get(section, key)
            .map(|raw| matches!(raw.trim().to_lowercase().as_str(), "true" | "yes" | "1" | "y"))
            .unwrap_or(default)
    }
}

fn var_name(section: &str, key: &str) -> String {
    format!("{}_{}", section.to_uppercase(), key.to_uppercase())
}
