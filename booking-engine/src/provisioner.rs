//! Lazy Resource Provisioner - registers catalog records with the ledger
//!
//! The booking path can be reached before a service or package has been
//! registered with the ledger. Provisioning fills missing or invalid
//! fields with schema-valid placeholders instead of failing.
//!
//! Create calls carry a flow-scoped idempotency key. Whether the ledger
//! deduplicates on it is the ledger's guarantee, not ours: against a
//! ledger that ignores the key, provisioning is at-least-once and
//! retries may leave duplicate catalog records. Within one
//! [`ProvisioningFlow`] returned ids are memoised so the flow itself
//! never provisions the same record twice.

use crate::{
    config::ProvisioningConfig,
    error::BookingError,
    ledger::{CreatePackageRequest, CreateServiceRequest, SharedLedger},
    models::{PackageDraft, PackageTier, ServiceDraft},
    EngineResult,
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

const PLACEHOLDER_SERVICE_TITLE: &str = "Untitled service";
const PLACEHOLDER_PACKAGE_TITLE: &str = "Standard package";
const PLACEHOLDER_DESCRIPTION: &str =
    "Details for this offering will be provided by the freelancer before work begins.";
const DEFAULT_CATEGORY: &str = "general";

/// Ensures services and packages exist in the ledger
pub struct ResourceProvisioner {
    config: ProvisioningConfig,
    ledger: SharedLedger,
}

/// One provisioning flow: a key namespace plus memoised ids
#[derive(Debug, Clone)]
pub struct ProvisioningFlow {
    flow_id: String,
    service_id: Option<String>,
    package_ids: HashMap<String, String>,
}

impl ProvisioningFlow {
    pub fn new() -> Self {
        Self {
            flow_id: Uuid::new_v4().to_string(),
            service_id: None,
            package_ids: HashMap::new(),
        }
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    fn service_key(&self) -> String {
        format!("{}:service", self.flow_id)
    }

    fn package_key(&self, service_id: &str) -> String {
        format!("{}:package:{}", self.flow_id, service_id)
    }
}

impl Default for ProvisioningFlow {
    fn default() -> Self {
        Self::new()
    }
}

/// Ids produced by a full provisioning pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedIds {
    pub service_id: String,
    pub package_id: String,
}

impl ResourceProvisioner {
    pub fn new(config: ProvisioningConfig, ledger: SharedLedger) -> Self {
        Self { config, ledger }
    }

    /// Register a service, returning its ledger id
    pub async fn ensure_service(
        &self,
        flow: &mut ProvisioningFlow,
        draft: &ServiceDraft,
    ) -> EngineResult<String> {
        if let Some(id) = &flow.service_id {
            return Ok(id.clone());
        }
        if draft.freelancer_id.trim().is_empty() {
            return Err(BookingError::invalid_input("freelancer_id is required"));
        }

        let request = self.normalize_service(draft);
        info!(flow = %flow.flow_id, freelancer = %request.freelancer_id, "provisioning service");

        let service_id = self
            .ledger
            .create_service_for_booking(request, &flow.service_key())
            .await?;
        flow.service_id = Some(service_id.clone());
        Ok(service_id)
    }

    /// Register a package under `service_id`, returning its ledger id
    pub async fn ensure_package(
        &self,
        flow: &mut ProvisioningFlow,
        draft: &PackageDraft,
        service_id: &str,
    ) -> EngineResult<String> {
        if let Some(id) = flow.package_ids.get(service_id) {
            return Ok(id.clone());
        }
        if service_id.trim().is_empty() {
            return Err(BookingError::invalid_input("service_id is required"));
        }

        let request = self.normalize_package(draft, service_id);
        info!(flow = %flow.flow_id, service_id, price = request.price, "provisioning package");

        let package_id = self
            .ledger
            .create_package_for_booking(request, &flow.package_key(service_id))
            .await?;
        flow.package_ids
            .insert(service_id.to_string(), package_id.clone());
        Ok(package_id)
    }

    /// Service then package in one flow
    pub async fn ensure_service_and_package(
        &self,
        flow: &mut ProvisioningFlow,
        service: &ServiceDraft,
        package: &PackageDraft,
    ) -> EngineResult<ProvisionedIds> {
        let service_id = self.ensure_service(flow, service).await?;
        let package_id = self.ensure_package(flow, package, &service_id).await?;
        Ok(ProvisionedIds {
            service_id,
            package_id,
        })
    }

    fn text_or(&self, value: Option<&str>, min_len: usize, placeholder: &str) -> String {
        match value.map(str::trim) {
            Some(v) if v.chars().count() >= min_len => v.to_string(),
            _ => {
                // Pad so the placeholder itself always passes validation
                let mut text = placeholder.to_string();
                while text.chars().count() < min_len {
                    text.push('.');
                }
                text
            }
        }
    }

    pub fn normalize_service(&self, draft: &ServiceDraft) -> CreateServiceRequest {
        CreateServiceRequest {
            freelancer_id: draft.freelancer_id.trim().to_string(),
            title: self.text_or(
                draft.title.as_deref(),
                self.config.min_title_len,
                PLACEHOLDER_SERVICE_TITLE,
            ),
            description: self.text_or(
                draft.description.as_deref(),
                self.config.min_description_len,
                PLACEHOLDER_DESCRIPTION,
            ),
            category: draft
                .category
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(DEFAULT_CATEGORY)
                .to_string(),
        }
    }

    pub fn normalize_package(&self, draft: &PackageDraft, service_id: &str) -> CreatePackageRequest {
        let price = match draft.price {
            Some(p) if p > 0 => p,
            other => {
                warn!(?other, fallback = self.config.fallback_price, "package price missing or not positive");
                self.config.fallback_price
            }
        };

        CreatePackageRequest {
            service_id: service_id.to_string(),
            title: self.text_or(
                draft.title.as_deref(),
                self.config.min_title_len,
                PLACEHOLDER_PACKAGE_TITLE,
            ),
            description: self.text_or(
                draft.description.as_deref(),
                self.config.min_description_len,
                PLACEHOLDER_DESCRIPTION,
            ),
            price,
            currency: self.config.currency.clone(),
            delivery_time_days: draft
                .delivery_time_days
                .filter(|d| *d > 0)
                .unwrap_or(self.config.default_delivery_days),
            revisions: draft.revisions.unwrap_or(self.config.default_revisions),
            features: draft.features.clone(),
            tier: draft.tier.unwrap_or(PackageTier::Basic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::SystemClock, ledger::MemoryLedger};
    use std::sync::Arc;

    fn provisioner() -> (ResourceProvisioner, Arc<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::new(Arc::new(SystemClock)));
        (
            ResourceProvisioner::new(ProvisioningConfig::default(), ledger.clone()),
            ledger,
        )
    }

    #[test]
    fn test_fallbacks_for_incomplete_package() {
        let (provisioner, _) = provisioner();
        let request = provisioner.normalize_package(
            &PackageDraft {
                title: Some("ab".into()),
                price: Some(0),
                ..Default::default()
            },
            "SV-1",
        );

        assert_eq!(request.title, PLACEHOLDER_PACKAGE_TITLE);
        assert!(request.description.len() >= 20);
        assert_eq!(request.price, ProvisioningConfig::default().fallback_price);
        assert_eq!(request.delivery_time_days, 7);
        assert_eq!(request.tier, PackageTier::Basic);
    }

    #[test]
    fn test_valid_fields_are_kept() {
        let (provisioner, _) = provisioner();
        let request = provisioner.normalize_service(&ServiceDraft {
            freelancer_id: "fl-1".into(),
            title: Some("Logo design".into()),
            description: Some("Vector logo with three revisions included".into()),
            category: Some("design".into()),
        });

        assert_eq!(request.title, "Logo design");
        assert_eq!(request.category, "design");
    }

    #[tokio::test]
    async fn test_flow_memoises_ids() {
        let (provisioner, ledger) = provisioner();
        let mut flow = ProvisioningFlow::new();
        let service = ServiceDraft {
            freelancer_id: "fl-1".into(),
            ..Default::default()
        };

        let first = provisioner
            .ensure_service_and_package(&mut flow, &service, &PackageDraft::default())
            .await
            .unwrap();
        let second = provisioner
            .ensure_service_and_package(&mut flow, &service, &PackageDraft::default())
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(ledger.service_count().await, 1);
        assert_eq!(ledger.package_count().await, 1);
    }

    #[tokio::test]
    async fn test_separate_flows_may_duplicate() {
        let (provisioner, ledger) = provisioner();
        let service = ServiceDraft {
            freelancer_id: "fl-1".into(),
            ..Default::default()
        };

        provisioner
            .ensure_service(&mut ProvisioningFlow::new(), &service)
            .await
            .unwrap();
        provisioner
            .ensure_service(&mut ProvisioningFlow::new(), &service)
            .await
            .unwrap();

        assert_eq!(ledger.service_count().await, 2);
    }
}
