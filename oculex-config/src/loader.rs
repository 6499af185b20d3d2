use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::{
    Config, ConfigMetadata, CorsConfig, GatewayConfig, ServerConfig, StoreConfig,
};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_WORKBOOK: &str = "glaucoma_test_results.json";
const DEFAULT_GATEWAY_URL: &str = "http://localhost:5000";
const DEFAULT_SUBMIT_TIMEOUT_SECS: u64 = 5;

/// Hard configuration failures. Anything survivable is a warning instead.
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("invalid {key}: {value:?} is not a number")]
    InvalidNumber {
        key: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

/// One non-fatal finding from config validation.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

/// Collected warnings, logged by the caller after tracing is initialized.
#[derive(Debug, Clone, Default)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn push(&mut self, message: impl Into<String>, hint: Option<&str>) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: hint.map(str::to_string),
        });
    }
}

/// A composed configuration plus the warnings gathered while loading it.
#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

/// Environment-first configuration loader with `.env` support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    load_env_file: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { load_env_file: true }
    }

    /// Skip `.env` autoloading; tests use this to stay hermetic.
    pub fn without_env_file(mut self) -> Self {
        self.load_env_file = false;
        self
    }

    /// Compose the configuration from the process environment.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = self.load_env_file && dotenvy::dotenv().is_ok();
        let mut warnings = ConfigWarnings::default();

        let host = env_string("SERVER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match env_string("SERVER_PORT") {
            Some(value) => parse_number("SERVER_PORT", &value)?,
            None => DEFAULT_PORT,
        };
        if port == 0 {
            warnings.push(
                "SERVER_PORT is 0, the OS will pick an arbitrary port",
                Some("set an explicit port so satellite runners can find the gateway"),
            );
        }

        let workbook_path = env_string("WORKBOOK_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKBOOK));

        let gateway_url = env_string("GATEWAY_URL")
            .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());
        let submit_timeout_secs: u64 = match env_string("GATEWAY_TIMEOUT_SECS") {
            Some(value) => parse_number("GATEWAY_TIMEOUT_SECS", &value)?,
            None => DEFAULT_SUBMIT_TIMEOUT_SECS,
        };
        if submit_timeout_secs == 0 {
            warnings.push(
                "GATEWAY_TIMEOUT_SECS is 0, deliveries would abort immediately",
                Some("use a small positive timeout, e.g. 5"),
            );
        }

        let allowed_origins: Vec<String> = env_string("CORS_ALLOWED_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let dev_mode = env_flag("DEV_MODE");
        if !dev_mode && allowed_origins.is_empty() {
            warnings.push(
                "no CORS_ALLOWED_ORIGINS configured outside dev mode",
                Some("browsers on other origins will be refused"),
            );
        }

        Ok(ConfigLoad {
            config: Config {
                server: ServerConfig { host, port },
                store: StoreConfig { workbook_path },
                gateway: GatewayConfig {
                    url: gateway_url,
                    submit_timeout: Duration::from_secs(submit_timeout_secs),
                },
                cors: CorsConfig { allowed_origins },
                dev_mode,
                metadata: ConfigMetadata { env_file_loaded },
            },
            warnings,
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_flag(key: &str) -> bool {
    env_string(key)
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn parse_number<T: std::str::FromStr<Err = ParseIntError>>(
    key: &'static str,
    value: &str,
) -> Result<T, ConfigLoadError> {
    value.trim().parse().map_err(|source| ConfigLoadError::InvalidNumber {
        key,
        value: value.to_string(),
        source,
    })
}
