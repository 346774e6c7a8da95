#[cfg(feature = "cli")]
pub mod cli;

use crate::domain::model::SubscriberFailure;
use crate::utils::error::{BusError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[cfg(feature = "cli")]
pub use cli::CliArgs;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub events: EventsConfig,
    pub storage: Option<StorageConfig>,
    pub environment: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "billing-bus".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default)]
    pub subscriber_failure: SubscriberFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub base_path: String,
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl BusConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content);
        Ok(toml::from_str(&processed_content)?)
    }

    /// 替換環境變數 (例如 ${STORAGE_ROOT})，找不到的變數保持原樣
    fn substitute_env_vars(content: &str) -> String {
        use regex::Regex;
        use std::sync::OnceLock;

        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let re = PATTERN.get_or_init(|| {
            Regex::new(r"\$\{([^}]+)\}").expect("environment placeholder pattern is valid")
        });

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .into_owned()
    }

    pub fn subscriber_failure(&self) -> SubscriberFailure {
        self.events.subscriber_failure
    }

    /// 取得日誌等級，預設 info
    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or("info")
    }

    pub fn env(&self, key: &str) -> Option<&str> {
        self.environment
            .as_ref()
            .and_then(|env| env.get(key))
            .map(String::as_str)
    }
}

impl Validate for BusConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("app.name", &self.app.name)?;

        if let Some(level) = &self.logging.level {
            validation::validate_one_of("logging.level", level, &LOG_LEVELS)?;
        }

        if let Some(storage) = &self.storage {
            validation::validate_path("storage.base_path", &storage.base_path)?;
        }

        if let Some(env) = &self.environment {
            if let Some(key) = env.keys().find(|k| k.trim().is_empty()) {
                return Err(BusError::InvalidConfigValue {
                    field: "environment".to_string(),
                    value: key.clone(),
                    reason: "Environment keys cannot be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}
