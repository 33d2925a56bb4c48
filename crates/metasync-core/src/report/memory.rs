//! Process-local report backend.

use super::traits::{MetadataReport, RecordKind};
use crate::error::{MetasyncError, Result};
use crate::identifier::{MetadataIdentifier, SubscriberMetadataIdentifier};
use crate::info::MetadataRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Report backend keeping JSON records in memory.
///
/// Clones share the same records, so one instance can stand in for a store
/// shared by several services in tests and single-node setups.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadataReport {
    records: Arc<Mutex<HashMap<(RecordKind, String), String>>>,
}

impl MemoryMetadataReport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<(RecordKind, String), String>>> {
        self.records
            .lock()
            .map_err(|_| MetasyncError::Other("Failed to acquire report lock".to_string()))
    }

    fn put(&self, kind: RecordKind, key: String, value: String) -> Result<()> {
        self.lock()?.insert((kind, key), value);
        Ok(())
    }

    fn get(&self, kind: RecordKind, key: String) -> Result<String> {
        let records = self.lock()?;
        records
            .get(&(kind, key.clone()))
            .cloned()
            .ok_or_else(|| MetasyncError::not_found(key))
    }

    /// Number of stored records of a kind.
    pub fn count(&self, kind: RecordKind) -> usize {
        self.lock()
            .map(|records| records.keys().filter(|(k, _)| *k == kind).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MetadataReport for MemoryMetadataReport {
    async fn publish_app_metadata(
        &self,
        id: &SubscriberMetadataIdentifier,
        record: &MetadataRecord,
    ) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.put(RecordKind::App, id.identifier_key(), json)
    }

    async fn get_app_metadata(&self, id: &SubscriberMetadataIdentifier) -> Result<MetadataRecord> {
        let json = self.get(RecordKind::App, id.identifier_key())?;
        Ok(serde_json::from_str(&json)?)
    }

    async fn store_provider_metadata(
        &self,
        id: &MetadataIdentifier,
        definition: &str,
    ) -> Result<()> {
        self.put(RecordKind::Provider, id.identifier_key(), definition.to_string())
    }

    async fn store_consumer_metadata(
        &self,
        id: &MetadataIdentifier,
        parameters: &str,
    ) -> Result<()> {
        self.put(RecordKind::Consumer, id.identifier_key(), parameters.to_string())
    }

    async fn get_service_metadata(&self, id: &MetadataIdentifier) -> Result<String> {
        self.get(RecordKind::from(id.side), id.identifier_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::Side;
    use std::collections::BTreeMap;

    fn record(revision: &str) -> MetadataRecord {
        MetadataRecord {
            app: "demo-app".to_string(),
            revision: revision.to_string(),
            services: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_app_metadata_roundtrip() {
        let report = MemoryMetadataReport::new();
        let id = SubscriberMetadataIdentifier::new("demo-app", "r1");
        report.publish_app_metadata(&id, &record("r1")).await.unwrap();

        let fetched = report.get_app_metadata(&id).await.unwrap();
        assert_eq!(fetched, record("r1"));
        assert_eq!(report.count(RecordKind::App), 1);
    }

    #[tokio::test]
    async fn test_missing_app_metadata_is_not_found() {
        let report = MemoryMetadataReport::new();
        let err = report
            .get_app_metadata(&SubscriberMetadataIdentifier::new("demo-app", "never"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_provider_and_consumer_are_separate() {
        let report = MemoryMetadataReport::new();
        let provider = MetadataIdentifier::new("com.foo.Bar", None, None, Side::Provider);
        let consumer = MetadataIdentifier::new("com.foo.Bar", None, None, Side::Consumer);

        report.store_provider_metadata(&provider, "{\"p\":1}").await.unwrap();
        assert!(report.get_service_metadata(&consumer).await.unwrap_err().is_not_found());

        report.store_consumer_metadata(&consumer, "{\"c\":1}").await.unwrap();
        assert_eq!(report.get_service_metadata(&provider).await.unwrap(), "{\"p\":1}");
        assert_eq!(report.get_service_metadata(&consumer).await.unwrap(), "{\"c\":1}");
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let report = MemoryMetadataReport::new();
        let clone = report.clone();
        let id = SubscriberMetadataIdentifier::new("demo-app", "r1");
        clone.publish_app_metadata(&id, &record("r1")).await.unwrap();
        assert!(report.get_app_metadata(&id).await.is_ok());
    }
}
