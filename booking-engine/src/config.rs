//! Engine configuration
//!
//! Each component owns a config struct with production defaults. The
//! aggregate [`EngineConfig`] is layered from defaults, an optional file
//! and `BOOKING__`-prefixed environment variables.

use crate::EngineResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// TTLs for the two lookup caches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub profile_ttl_secs: u64,
    pub package_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            profile_ttl_secs: 300, // 5 minutes
            package_ttl_secs: 600, // 10 minutes
        }
    }
}

impl CacheConfig {
    pub fn profile_ttl(&self) -> Duration {
        Duration::from_secs(self.profile_ttl_secs)
    }

    pub fn package_ttl(&self) -> Duration {
        Duration::from_secs(self.package_ttl_secs)
    }
}

/// Enrichment pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Bound applied to each individual lookup
    pub lookup_timeout_ms: u64,
    /// Display-only platform fee in basis points
    pub platform_fee_bps: i64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: 3_000,
            platform_fee_bps: 500, // 5%
        }
    }
}

impl EnrichmentConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

/// Placeholder values used when upstream catalog data is incomplete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    pub min_title_len: usize,
    pub min_description_len: usize,
    /// Price substituted when the draft price is missing or not positive
    pub fallback_price: i64,
    pub default_delivery_days: u32,
    pub default_revisions: u32,
    pub currency: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            min_title_len: 5,
            min_description_len: 20,
            fallback_price: 1_000_000_000,
            default_delivery_days: 7,
            default_revisions: 1,
            currency: "SUI".to_string(),
        }
    }
}

/// Backoff for transient transport failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2_000,
        }
    }
}

/// Which ledger backend to wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    Http,
    Memory,
}

/// Ledger endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub mode: LedgerMode,
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mode: LedgerMode::Http,
            base_url: "http://localhost:8545/ledger".to_string(),
            api_key: None,
        }
    }
}

/// Profile and package directory endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub base_url: String,
    /// Bound on every directory request, including the package check at booking time
    pub request_timeout_ms: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/directory".to_string(),
            request_timeout_ms: 3_000,
        }
    }
}

impl DirectoryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Aggregate configuration for the booking engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

impl EngineConfig {
    /// Environment prefix, e.g. `BOOKING__CACHE__PROFILE_TTL_SECS=60`
    pub const ENV_PREFIX: &'static str = "BOOKING";

    /// Load defaults, then `file` (if present), then the environment
    pub fn load(file: Option<&str>) -> EngineResult<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let cfg = builder
            .add_source(
                config::Environment::with_prefix(Self::ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Ok(cfg.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.cache.profile_ttl(), Duration::from_secs(300));
        assert_eq!(config.cache.package_ttl(), Duration::from_secs(600));
        assert_eq!(config.enrichment.lookup_timeout(), Duration::from_secs(3));
        assert_eq!(config.directory.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.provisioning.default_delivery_days, 7);
    }

    #[test]
    fn test_load_without_file_yields_defaults() {
        let config = EngineConfig::load(None).unwrap();
        assert_eq!(config.enrichment.platform_fee_bps, 500);
        assert_eq!(config.ledger.mode, LedgerMode::Http);
    }
}
