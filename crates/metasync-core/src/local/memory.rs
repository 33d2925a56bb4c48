//! In-process implementation of the local metadata cache.

use super::traits::LocalMetadataService;
use crate::config::MetadataConfig;
use crate::definition::{provider_definition, DefinitionOutcome, SkipReason};
use crate::error::{MetasyncError, Result};
use crate::identifier::{MetadataIdentifier, Side};
use crate::info::{MetadataInfo, ServiceInfo};
use crate::registry::ServiceRegistry;
use crate::service_url::{self, ServiceUrl};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Local metadata cache backed by process memory.
///
/// Thread-safe via internal `RwLock`s. The [`MetadataInfo`] it owns is shared
/// with callers as an `Arc`, so revision and reported state are visible to
/// every holder.
pub struct InMemoryMetadataService {
    info: Arc<MetadataInfo>,
    /// Exported URLs by service key.
    exported: RwLock<BTreeMap<String, Vec<ServiceUrl>>>,
    subscribed: RwLock<Vec<ServiceUrl>>,
    /// JSON definitions by service key.
    definitions: RwLock<HashMap<String, String>>,
}

impl InMemoryMetadataService {
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            info: Arc::new(MetadataInfo::new(application)),
            exported: RwLock::new(BTreeMap::new()),
            subscribed: RwLock::new(Vec::new()),
            definitions: RwLock::new(HashMap::new()),
        }
    }

    pub fn application(&self) -> &str {
        self.info.app()
    }

    /// Shared handle to the application-wide metadata info.
    pub fn info(&self) -> Arc<MetadataInfo> {
        Arc::clone(&self.info)
    }

    fn lock_error(what: &str) -> MetasyncError {
        MetasyncError::Other(format!("Failed to acquire {} lock", what))
    }

    /// Refresh the info entry for `changed`'s service and protocol.
    ///
    /// The info keeps one entry per protocol. It always describes the
    /// smallest URL in string order, so the revision depends only on the set
    /// of exported URLs and not on the order they arrived in. `urls` must be
    /// sorted that way.
    fn sync_info(info: &MetadataInfo, urls: &[ServiceUrl], changed: &ServiceUrl) {
        match urls.iter().find(|u| u.protocol == changed.protocol) {
            Some(first) => {
                info.add_exported(ServiceInfo::from_url(first));
            }
            None => {
                info.remove_exported(&ServiceInfo::from_url(changed).match_key());
            }
        }
    }

    /// Record an exported URL. Returns `false` if it was already exported.
    pub fn export_url(&self, url: &ServiceUrl) -> Result<bool> {
        let mut exported = self.exported.write().map_err(|_| Self::lock_error("exported"))?;
        let urls = exported.entry(url.service_key()).or_default();
        if urls.contains(url) {
            return Ok(false);
        }
        urls.push(url.clone());
        urls.sort_by_cached_key(|u| u.to_string());
        Self::sync_info(&self.info, urls, url);
        debug!("Exported {} ({})", url.service_key(), url.protocol);
        Ok(true)
    }

    /// Forget an exported URL. Returns `false` if it was not exported.
    pub fn unexport_url(&self, url: &ServiceUrl) -> Result<bool> {
        let mut exported = self.exported.write().map_err(|_| Self::lock_error("exported"))?;
        let key = url.service_key();
        let Some(urls) = exported.get_mut(&key) else {
            return Ok(false);
        };
        let before = urls.len();
        urls.retain(|u| u != url);
        if urls.len() == before {
            return Ok(false);
        }

        Self::sync_info(&self.info, urls, url);
        if urls.is_empty() {
            exported.remove(&key);
        }
        debug!("Unexported {} ({})", key, url.protocol);
        Ok(true)
    }

    pub fn subscribe_url(&self, url: &ServiceUrl) -> Result<bool> {
        let mut subscribed = self.subscribed.write().map_err(|_| Self::lock_error("subscribed"))?;
        if subscribed.contains(url) {
            return Ok(false);
        }
        subscribed.push(url.clone());
        self.info.add_subscribed(ServiceInfo::from_url(url));
        Ok(true)
    }

    pub fn unsubscribe_url(&self, url: &ServiceUrl) -> Result<bool> {
        let mut subscribed = self.subscribed.write().map_err(|_| Self::lock_error("subscribed"))?;
        let before = subscribed.len();
        subscribed.retain(|u| u != url);
        if subscribed.len() == before {
            return Ok(false);
        }
        if !subscribed.iter().any(|u| u.service_key() == url.service_key()) {
            self.info.remove_subscribed(&ServiceInfo::from_url(url).match_key());
        }
        Ok(true)
    }

    /// Build and keep the definition of a provider URL locally.
    ///
    /// Consumer URLs and URLs failing the provider gate are skipped.
    pub fn publish_service_definition(
        &self,
        url: &ServiceUrl,
        registry: &ServiceRegistry,
    ) -> Result<DefinitionOutcome> {
        if Side::of_url(url) != Side::Provider {
            return Ok(DefinitionOutcome::Skipped(SkipReason::NotProvider));
        }
        let definition = match provider_definition(url, registry) {
            Ok(definition) => definition,
            Err(reason) => return Ok(DefinitionOutcome::Skipped(reason)),
        };

        let json = definition.to_json()?;
        self.definitions
            .write()
            .map_err(|_| Self::lock_error("definitions"))?
            .insert(url.service_key(), json);
        Ok(DefinitionOutcome::Provider(MetadataIdentifier::from_url(
            url,
            Side::Provider,
        )))
    }
}

impl LocalMetadataService for InMemoryMetadataService {
    fn metadata_info(&self, revision: &str) -> Option<Arc<MetadataInfo>> {
        if revision.is_empty() || self.info.calc_and_get_revision() == revision {
            Some(self.info())
        } else {
            None
        }
    }

    fn exported_urls(
        &self,
        service_interface: &str,
        group: &str,
        version: &str,
        protocol: &str,
    ) -> Result<Vec<ServiceUrl>> {
        let exported = self.exported.read().map_err(|_| Self::lock_error("exported"))?;
        let matches_protocol = |u: &&ServiceUrl| protocol.is_empty() || u.protocol == protocol;

        if service_interface == MetadataConfig::ALL_SERVICE_INTERFACES {
            return Ok(exported
                .values()
                .flatten()
                .filter(matches_protocol)
                .cloned()
                .collect());
        }

        let key = service_url::service_key(service_interface, group, version);
        Ok(exported
            .get(&key)
            .map(|urls| urls.iter().filter(matches_protocol).cloned().collect())
            .unwrap_or_default())
    }

    fn subscribed_urls(&self) -> Result<Vec<ServiceUrl>> {
        let subscribed = self.subscribed.read().map_err(|_| Self::lock_error("subscribed"))?;
        let mut urls = subscribed.clone();
        urls.sort_by_cached_key(|u| u.to_string());
        Ok(urls)
    }

    fn service_definition(
        &self,
        interface_name: &str,
        group: &str,
        version: &str,
    ) -> Result<String> {
        self.service_definition_by_service_key(&service_url::service_key(
            interface_name,
            group,
            version,
        ))
    }

    fn service_definition_by_service_key(&self, service_key: &str) -> Result<String> {
        self.definitions
            .read()
            .map_err(|_| Self::lock_error("definitions"))?
            .get(service_key)
            .cloned()
            .ok_or_else(|| MetasyncError::not_found(service_key))
    }
}
