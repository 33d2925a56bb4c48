//! Local metadata cache trait.

use crate::error::Result;
use crate::info::MetadataInfo;
use crate::service_url::ServiceUrl;
use std::sync::Arc;

/// Read access to the local metadata cache.
///
/// All operations are synchronous: they only touch process memory.
pub trait LocalMetadataService: Send + Sync {
    /// Metadata info for a revision.
    ///
    /// An empty selector always returns the application-wide info. Any other
    /// value returns it only when it matches the current revision.
    fn metadata_info(&self, revision: &str) -> Option<Arc<MetadataInfo>>;

    /// Exported URLs for an interface, group, version and protocol.
    ///
    /// `"*"` as interface returns every exported URL. An empty protocol
    /// matches any protocol.
    fn exported_urls(
        &self,
        service_interface: &str,
        group: &str,
        version: &str,
        protocol: &str,
    ) -> Result<Vec<ServiceUrl>>;

    /// Every subscribed (referenced) URL.
    fn subscribed_urls(&self) -> Result<Vec<ServiceUrl>>;

    /// JSON service definition for an interface, group and version.
    fn service_definition(&self, interface_name: &str, group: &str, version: &str)
        -> Result<String>;

    /// JSON service definition for a `group/interface:version` key.
    fn service_definition_by_service_key(&self, service_key: &str) -> Result<String>;
}
