//! Retrying front for a report backend.

use super::retry::{retry_async, RetryConfig};
use super::traits::MetadataReport;
use crate::definition::ServiceDefinition;
use crate::error::{MetasyncError, Result};
use crate::identifier::{MetadataIdentifier, Side, SubscriberMetadataIdentifier};
use crate::info::{MetadataInfo, MetadataRecord};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Typed access to a [`MetadataReport`] backend.
///
/// Serializes payloads, retries provider and consumer store writes, and
/// remembers writes that still failed so they can be replayed later with
/// [`retry_failed_reports`](Self::retry_failed_reports). Application metadata
/// publish and fetch are single attempts; the caller decides what to do
/// with a failure.
pub struct DelegateReport {
    backend: Arc<dyn MetadataReport>,
    retry: RetryConfig,
    /// Latest unstored payload per identifier. The side picks the store call.
    failed: Mutex<HashMap<MetadataIdentifier, String>>,
}

impl DelegateReport {
    pub fn new(backend: Arc<dyn MetadataReport>, retry: RetryConfig) -> Self {
        Self {
            backend,
            retry,
            failed: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn MetadataReport> {
        &self.backend
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    fn failed(&self) -> MutexGuard<'_, HashMap<MetadataIdentifier, String>> {
        self.failed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn publish_app_metadata(
        &self,
        id: &SubscriberMetadataIdentifier,
        record: &MetadataRecord,
    ) -> Result<()> {
        self.backend.publish_app_metadata(id, record).await?;
        debug!("Published app metadata {}", id);
        Ok(())
    }

    /// Fetch and rebuild an application's metadata at a revision.
    pub async fn get_app_metadata(&self, id: &SubscriberMetadataIdentifier) -> Result<MetadataInfo> {
        let record = self.backend.get_app_metadata(id).await?;
        if record.revision != id.revision {
            return Err(MetasyncError::Validation {
                field: "revision".to_string(),
                message: format!(
                    "report returned revision {} for {}",
                    record.revision, id
                ),
            });
        }
        Ok(MetadataInfo::from_record(record))
    }

    pub async fn store_provider_metadata(
        &self,
        id: &MetadataIdentifier,
        definition: &ServiceDefinition,
    ) -> Result<()> {
        let payload = definition.to_json()?;
        self.store(id, payload).await
    }

    pub async fn store_consumer_metadata(
        &self,
        id: &MetadataIdentifier,
        parameters: &BTreeMap<String, String>,
    ) -> Result<()> {
        let payload = serde_json::to_string(parameters)?;
        self.store(id, payload).await
    }

    async fn store(&self, id: &MetadataIdentifier, payload: String) -> Result<()> {
        let (result, stats) = retry_async(
            &self.retry,
            || self.store_once(id, &payload),
            MetasyncError::is_retryable,
        )
        .await;

        match result {
            Ok(()) => {
                // A newer successful write supersedes any pending one.
                self.failed().remove(id);
                debug!("Stored {} metadata in {} attempt(s)", id, stats.attempts);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to store {} metadata after {} attempt(s): {}", id, stats.attempts, e);
                self.failed().insert(id.clone(), payload);
                Err(e)
            }
        }
    }

    async fn store_once(&self, id: &MetadataIdentifier, payload: &str) -> Result<()> {
        match id.side {
            Side::Provider => self.backend.store_provider_metadata(id, payload).await,
            Side::Consumer => self.backend.store_consumer_metadata(id, payload).await,
        }
    }

    /// Identifiers whose last store write failed.
    pub fn pending_failed_reports(&self) -> Vec<MetadataIdentifier> {
        let mut ids: Vec<_> = self.failed().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Replay failed store writes once each. Returns how many succeeded.
    pub async fn retry_failed_reports(&self) -> usize {
        let pending: Vec<(MetadataIdentifier, String)> = self
            .failed()
            .iter()
            .map(|(id, payload)| (id.clone(), payload.clone()))
            .collect();
        if pending.is_empty() {
            return 0;
        }

        let mut stored = 0;
        for (id, payload) in pending {
            match self.store_once(&id, &payload).await {
                Ok(()) => {
                    let mut failed = self.failed();
                    // Leave a newer failed payload for the same id in place.
                    if failed.get(&id) == Some(&payload) {
                        failed.remove(&id);
                    }
                    stored += 1;
                }
                Err(e) => debug!("Replay of {} still failing: {}", id, e),
            }
        }
        info!("Replayed {} failed metadata report(s)", stored);
        stored
    }
}
