//! Remote service instance descriptors.

use crate::config::MetadataConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A discovered application instance.
///
/// Discovery layers implement this for their own instance types; the
/// metadata service only needs the service name and the metadata map.
pub trait ServiceInstance: Send + Sync {
    /// Application (service) name the instance belongs to.
    fn service_name(&self) -> &str;

    /// Instance metadata properties.
    fn metadata(&self) -> &HashMap<String, String>;

    /// Revision of the metadata the instance last published, if advertised.
    fn revision(&self) -> Option<&str> {
        self.metadata()
            .get(MetadataConfig::EXPORTED_SERVICES_REVISION_PROPERTY_NAME)
            .map(String::as_str)
            .filter(|r| !r.is_empty())
    }
}

/// Plain instance descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultServiceInstance {
    pub id: String,
    pub service_name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl DefaultServiceInstance {
    pub fn new(service_name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        Self {
            id: format!("{}:{}", host, port),
            service_name: service_name.into(),
            host,
            port,
            metadata: HashMap::new(),
        }
    }

    /// Advertise the revision this instance published.
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.metadata.insert(
            MetadataConfig::EXPORTED_SERVICES_REVISION_PROPERTY_NAME.to_string(),
            revision.into(),
        );
        self
    }
}

impl ServiceInstance for DefaultServiceInstance {
    fn service_name(&self) -> &str {
        &self.service_name
    }

    fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_property() {
        let instance = DefaultServiceInstance::new("demo-app", "10.0.0.5", 20000).with_revision("abc");
        assert_eq!(instance.id, "10.0.0.5:20000");
        assert_eq!(instance.revision(), Some("abc"));
        assert_eq!(
            instance.metadata()["dubbo.metadata.revision"],
            "abc".to_string()
        );
    }

    #[test]
    fn test_missing_or_empty_revision() {
        let instance = DefaultServiceInstance::new("demo-app", "10.0.0.5", 20000);
        assert_eq!(instance.revision(), None);
        assert_eq!(instance.with_revision("").revision(), None);
    }
}
