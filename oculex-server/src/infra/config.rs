pub use oculex_config::{
    Config, ConfigLoad, ConfigLoadError, ConfigLoader, ConfigMetadata,
    ConfigWarning, ConfigWarnings, CorsConfig, GatewayConfig, ServerConfig,
    StoreConfig,
};
