//! Remote metadata report trait and record kinds.

use crate::error::Result;
use crate::identifier::{MetadataIdentifier, Side, SubscriberMetadataIdentifier};
use crate::info::MetadataRecord;
use async_trait::async_trait;
use std::fmt;

/// Kind of record held by a report backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    /// Application metadata at a revision.
    App,
    /// Provider service definition.
    Provider,
    /// Consumer reference parameters.
    Consumer,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::App => "app",
            RecordKind::Provider => "provider",
            RecordKind::Consumer => "consumer",
        }
    }
}

impl From<Side> for RecordKind {
    fn from(side: Side) -> Self {
        match side {
            Side::Provider => RecordKind::Provider,
            Side::Consumer => RecordKind::Consumer,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable metadata storage shared by the cluster.
///
/// Backends store JSON payloads under identifier keys. Writes are upserts,
/// so replaying one is harmless. Lookups of absent keys fail with
/// [`MetasyncError::NotFound`](crate::MetasyncError::NotFound).
#[async_trait]
pub trait MetadataReport: Send + Sync {
    /// Publish an application's metadata under its revision.
    async fn publish_app_metadata(
        &self,
        id: &SubscriberMetadataIdentifier,
        record: &MetadataRecord,
    ) -> Result<()>;

    /// Fetch an application's metadata at a revision.
    async fn get_app_metadata(&self, id: &SubscriberMetadataIdentifier) -> Result<MetadataRecord>;

    /// Store a provider's JSON service definition.
    async fn store_provider_metadata(&self, id: &MetadataIdentifier, definition: &str)
        -> Result<()>;

    /// Store a consumer's JSON parameter map.
    async fn store_consumer_metadata(&self, id: &MetadataIdentifier, parameters: &str)
        -> Result<()>;

    /// Read back a stored provider definition or consumer parameter map.
    async fn get_service_metadata(&self, id: &MetadataIdentifier) -> Result<String>;
}
