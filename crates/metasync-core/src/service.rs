//! Metadata synchronization service.
//!
//! [`RemoteMetadataService`] bridges the local metadata cache and the remote
//! report: it publishes this application's metadata, fetches other
//! applications' metadata by revision, and stores per-service definitions.
//! Failures come back as values ([`PublishOutcome`], [`DefinitionOutcome`]
//! or `Err`); nothing here logs on the caller's behalf.
//!
//! [`MetadataServiceCell`] is the once-only construction gate a composition
//! root holds to share one service across the process.

use crate::config::ReportConfig;
use crate::definition::{provider_definition, DefinitionOutcome};
use crate::error::{MetasyncError, Result};
use crate::identifier::{MetadataIdentifier, Side, SubscriberMetadataIdentifier};
use crate::info::MetadataInfo;
use crate::instance::ServiceInstance;
use crate::local::LocalMetadataService;
use crate::registry::ServiceRegistry;
use crate::report::{build_report, DelegateReport};
use crate::service_url::ServiceUrl;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

/// Result of [`RemoteMetadataService::publish_metadata`].
#[derive(Debug, Clone)]
#[must_use]
pub enum PublishOutcome {
    /// The current metadata was already published; no remote call was made.
    AlreadyReported,
    /// The metadata was published under `revision`.
    Published { revision: String },
    /// Publishing failed; the next call will try again.
    Failed {
        revision: String,
        error: MetasyncError,
    },
}

impl PublishOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, PublishOutcome::Failed { .. })
    }

    /// Revision involved, if a publish was attempted.
    pub fn revision(&self) -> Option<&str> {
        match self {
            PublishOutcome::AlreadyReported => None,
            PublishOutcome::Published { revision } | PublishOutcome::Failed { revision, .. } => {
                Some(revision)
            }
        }
    }
}

/// Synchronizes local metadata with the remote report.
pub struct RemoteMetadataService {
    local: Arc<dyn LocalMetadataService>,
    report: DelegateReport,
    registry: ServiceRegistry,
    /// Held across check, publish and mark.
    publish_lock: Mutex<()>,
}

impl RemoteMetadataService {
    pub fn new(
        local: Arc<dyn LocalMetadataService>,
        report: DelegateReport,
        registry: ServiceRegistry,
    ) -> Self {
        Self {
            local,
            report,
            registry,
            publish_lock: Mutex::new(()),
        }
    }

    /// Build the report backend from `config` and assemble the service.
    pub fn connect(
        config: &ReportConfig,
        local: Arc<dyn LocalMetadataService>,
        registry: ServiceRegistry,
    ) -> Result<Self> {
        let backend = build_report(config)?;
        let report = DelegateReport::new(backend, config.retry.clone());
        Ok(Self::new(local, report, registry))
    }

    pub fn report(&self) -> &DelegateReport {
        &self.report
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Publish the application-wide metadata unless already reported.
    ///
    /// `service_name` is the application name the record is published under.
    pub async fn publish_metadata(&self, service_name: &str) -> PublishOutcome {
        let _guard = self.publish_lock.lock().await;

        let Some(info) = self.local.metadata_info("") else {
            return PublishOutcome::Failed {
                revision: String::new(),
                error: MetasyncError::not_found(format!("metadata info for {}", service_name)),
            };
        };
        if info.has_reported() {
            return PublishOutcome::AlreadyReported;
        }

        let record = info.to_record();
        let revision = record.revision.clone();
        let id = SubscriberMetadataIdentifier::new(service_name, revision.as_str());

        match self.report.publish_app_metadata(&id, &record).await {
            Ok(()) => {
                // A change that raced the publish keeps the flag clear.
                if !info.mark_reported_revision(&revision) {
                    debug!("Metadata of {} changed while publishing {}", service_name, revision);
                }
                PublishOutcome::Published { revision }
            }
            Err(error) => PublishOutcome::Failed { revision, error },
        }
    }

    /// Fetch the metadata a remote instance advertises.
    pub async fn get_metadata(&self, instance: &dyn ServiceInstance) -> Result<MetadataInfo> {
        let revision = instance.revision().ok_or_else(|| MetasyncError::Validation {
            field: "revision".to_string(),
            message: format!("instance of {} advertises no metadata revision", instance.service_name()),
        })?;
        let id = SubscriberMetadataIdentifier::new(instance.service_name(), revision);
        self.report.get_app_metadata(&id).await
    }

    /// Store the definition of a provider URL or the parameters of a consumer URL.
    pub async fn publish_service_definition(&self, url: &ServiceUrl) -> Result<DefinitionOutcome> {
        match Side::of_url(url) {
            Side::Provider => {
                let definition = match provider_definition(url, &self.registry) {
                    Ok(definition) => definition,
                    Err(reason) => return Ok(DefinitionOutcome::Skipped(reason)),
                };
                let id = MetadataIdentifier::from_url(url, Side::Provider);
                self.report.store_provider_metadata(&id, &definition).await?;
                Ok(DefinitionOutcome::Provider(id))
            }
            Side::Consumer => {
                let id = MetadataIdentifier::from_url(url, Side::Consumer);
                self.report.store_consumer_metadata(&id, url.params()).await?;
                Ok(DefinitionOutcome::Consumer(id))
            }
        }
    }

    pub fn exported_urls(
        &self,
        service_interface: &str,
        group: &str,
        version: &str,
        protocol: &str,
    ) -> Result<Vec<ServiceUrl>> {
        self.local.exported_urls(service_interface, group, version, protocol)
    }

    pub fn subscribed_urls(&self) -> Result<Vec<ServiceUrl>> {
        self.local.subscribed_urls()
    }

    pub fn service_definition(
        &self,
        interface_name: &str,
        group: &str,
        version: &str,
    ) -> Result<String> {
        self.local.service_definition(interface_name, group, version)
    }

    pub fn service_definition_by_service_key(&self, service_key: &str) -> Result<String> {
        self.local.service_definition_by_service_key(service_key)
    }
}

/// Once-only construction gate for a shared [`RemoteMetadataService`].
///
/// The first caller runs the initializer; concurrent callers wait for it.
/// The outcome, success or failure, is kept and handed to every later
/// caller. A failed initialization is never retried.
#[derive(Default)]
pub struct MetadataServiceCell {
    cell: OnceCell<Result<Arc<RemoteMetadataService>>>,
}

impl MetadataServiceCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_init<F, Fut>(&self, init: F) -> Result<Arc<RemoteMetadataService>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RemoteMetadataService>>,
    {
        self.cell
            .get_or_init(|| async { init().await.map(Arc::new) })
            .await
            .clone()
    }

    /// The stored outcome, if initialization has completed.
    pub fn get(&self) -> Option<Result<Arc<RemoteMetadataService>>> {
        self.cell.get().cloned()
    }
}
