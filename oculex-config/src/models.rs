use std::path::PathBuf;
use std::time::Duration;

/// Composed runtime configuration for the session server.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub gateway: GatewayConfig,
    pub cors: CorsConfig,
    pub dev_mode: bool,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Result-store settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Location of the workbook document holding all category sheets.
    pub workbook_path: PathBuf,
}

/// Settings for satellite runners delivering results to the central server.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    pub submit_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    pub fn is_wildcard_included(&self) -> bool {
        self.allowed_origins
            .iter()
            .any(|origin| origin.trim() == "*")
    }
}

/// Facts about how the configuration was assembled, for startup logging.
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub env_file_loaded: bool,
}
