//! Profile and package lookups
//!
//! Both resource kinds live in external services. [`CachedDirectory`]
//! puts the TTL caches in front of them: the cache is consulted first and
//! only a successful fetch populates it.

use crate::{
    cache::LookupCaches,
    config::DirectoryConfig,
    error::BookingError,
    ledger::{
        http::{endpoint, parse_base_url},
        MemoryLedger,
    },
    models::{Package, Profile},
    EngineResult,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::sync::Arc;
use tracing::debug;

/// Source of public user profiles
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn fetch_profile(&self, user_id: &str) -> EngineResult<Profile>;
}

/// Source of catalog package details
#[async_trait]
pub trait PackageDirectory: Send + Sync {
    async fn fetch_package(&self, package_id: &str) -> EngineResult<Package>;
}

/// reqwest-backed directory for both resource kinds
pub struct HttpDirectory {
    client: Client,
    base_url: Url,
}

impl HttpDirectory {
    pub fn new(config: &DirectoryConfig) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| BookingError::config(format!("failed to build directory client: {e}")))?;

        Ok(Self {
            client,
            base_url: parse_base_url("directory", &config.base_url)?,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, segments: &[&str]) -> EngineResult<T> {
        let url = endpoint(&self.base_url, segments)?;
        let response = self.client.get(url.clone()).send().await?;

        match response.status() {
            status if status.is_success() => Ok(response.json::<T>().await?),
            StatusCode::NOT_FOUND => Err(BookingError::not_found(url.path().to_string())),
            status => Err(BookingError::transport(format!(
                "directory responded {status} for {}",
                url.path()
            ))),
        }
    }
}

#[async_trait]
impl ProfileDirectory for HttpDirectory {
    async fn fetch_profile(&self, user_id: &str) -> EngineResult<Profile> {
        self.get_json(&["profiles", user_id]).await
    }
}

#[async_trait]
impl PackageDirectory for HttpDirectory {
    async fn fetch_package(&self, package_id: &str) -> EngineResult<Package> {
        self.get_json(&["packages", package_id]).await
    }
}

#[async_trait]
impl PackageDirectory for MemoryLedger {
    async fn fetch_package(&self, package_id: &str) -> EngineResult<Package> {
        self.package(package_id)
            .await
            .ok_or_else(|| BookingError::not_found(format!("package {package_id}")))
    }
}

/// Read-through lookups backed by the TTL caches
pub struct CachedDirectory {
    caches: Arc<LookupCaches>,
    profiles: Arc<dyn ProfileDirectory>,
    packages: Arc<dyn PackageDirectory>,
}

impl CachedDirectory {
    pub fn new(
        caches: Arc<LookupCaches>,
        profiles: Arc<dyn ProfileDirectory>,
        packages: Arc<dyn PackageDirectory>,
    ) -> Self {
        Self {
            caches,
            profiles,
            packages,
        }
    }

    pub fn caches(&self) -> &LookupCaches {
        &self.caches
    }

    pub async fn profile(&self, user_id: &str) -> EngineResult<Profile> {
        if let Some(profile) = self.caches.profiles.get(user_id) {
            return Ok(profile);
        }

        debug!(user_id, "profile cache miss");
        let profile = self.profiles.fetch_profile(user_id).await?;
        self.caches.profiles.insert(user_id, profile.clone());
        Ok(profile)
    }

    pub async fn package(&self, package_id: &str) -> EngineResult<Package> {
        if let Some(package) = self.caches.packages.get(package_id) {
            return Ok(package);
        }

        debug!(package_id, "package cache miss");
        let package = self.packages.fetch_package(package_id).await?;
        self.caches.packages.insert(package_id, package.clone());
        Ok(package)
    }
}
