use booking_engine::config::EngineConfig;
use config::ConfigError;
use serde::{Deserialize, Serialize};

/// Server settings; read from the same sources as [`EngineConfig`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub bind_addr: String,
    /// Fallback filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            log_level: "booking_api=info,booking_engine=info,tower_http=debug".to_string(),
        }
    }
}

impl ApiConfig {
    /// Defaults, then `file`, then `BOOKING__BIND_ADDR` / `BOOKING__LOG_LEVEL`
    pub fn load(file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder
            .add_source(
                config::Environment::with_prefix(EngineConfig::ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = ApiConfig::load(Some("does-not-exist")).unwrap();
        assert!(config.bind_addr.ends_with(":3000"));
        assert!(config.log_level.contains("booking_api"));
    }
}
