//! Application metadata snapshot and its revision.
//!
//! [`MetadataInfo`] is the live, shared view of what this application exports
//! and subscribes to. It is owned by the local cache and handed out as
//! `Arc<MetadataInfo>`; the synchronization service only computes its
//! revision and flips the reported flag. [`MetadataRecord`] is the serialized
//! form that travels to the remote report.

use crate::config::MetadataConfig;
use crate::service_url::{self, ServiceUrl};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// One exported or subscribed service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    pub protocol: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl ServiceInfo {
    pub fn from_url(url: &ServiceUrl) -> Self {
        Self {
            name: url.interface().to_string(),
            group: url.group().to_string(),
            version: url.version().to_string(),
            protocol: url.protocol.clone(),
            path: url.path.clone(),
            params: url.params().clone(),
        }
    }

    /// `group/name:version`.
    pub fn service_key(&self) -> String {
        service_url::service_key(&self.name, &self.group, &self.version)
    }

    /// `group/name:version:protocol`, unique per exported endpoint kind.
    pub fn match_key(&self) -> String {
        format!("{}:{}", self.service_key(), self.protocol)
    }
}

/// Serialized application metadata as stored remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub app: String,
    pub revision: String,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceInfo>,
}

#[derive(Debug, Default)]
struct InfoState {
    exported: BTreeMap<String, ServiceInfo>,
    subscribed: BTreeMap<String, ServiceInfo>,
    revision: Option<String>,
}

/// Live metadata of one application instance.
#[derive(Debug)]
pub struct MetadataInfo {
    app: String,
    state: RwLock<InfoState>,
    reported: AtomicBool,
}

impl MetadataInfo {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            state: RwLock::new(InfoState::default()),
            reported: AtomicBool::new(false),
        }
    }

    /// Rebuild a metadata view from a fetched record.
    ///
    /// The result counts as reported: it came from the store.
    pub fn from_record(record: MetadataRecord) -> Self {
        let revision = (!record.revision.is_empty()).then_some(record.revision);
        Self {
            app: record.app,
            state: RwLock::new(InfoState {
                exported: record.services,
                subscribed: BTreeMap::new(),
                revision,
            }),
            reported: AtomicBool::new(true),
        }
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    fn read(&self) -> RwLockReadGuard<'_, InfoState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, InfoState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add an exported service. Returns `false` if it was already present.
    ///
    /// A change invalidates the revision and clears the reported flag.
    pub fn add_exported(&self, service: ServiceInfo) -> bool {
        let mut state = self.write();
        let key = service.match_key();
        if state.exported.get(&key) == Some(&service) {
            return false;
        }
        state.exported.insert(key, service);
        self.invalidate(&mut state);
        true
    }

    pub fn remove_exported(&self, match_key: &str) -> bool {
        let mut state = self.write();
        if state.exported.remove(match_key).is_none() {
            return false;
        }
        self.invalidate(&mut state);
        true
    }

    /// Subscriptions do not affect the revision.
    pub fn add_subscribed(&self, service: ServiceInfo) -> bool {
        let key = service.match_key();
        self.write().subscribed.insert(key, service).is_none()
    }

    pub fn remove_subscribed(&self, match_key: &str) -> bool {
        self.write().subscribed.remove(match_key).is_some()
    }

    fn invalidate(&self, state: &mut InfoState) {
        state.revision = None;
        self.reported.store(false, Ordering::SeqCst);
    }

    pub fn exported_services(&self) -> Vec<ServiceInfo> {
        self.read().exported.values().cloned().collect()
    }

    pub fn subscribed_services(&self) -> Vec<ServiceInfo> {
        self.read().subscribed.values().cloned().collect()
    }

    /// Cached revision, if one has been computed since the last change.
    pub fn revision(&self) -> Option<String> {
        self.read().revision.clone()
    }

    /// Return the revision, computing and caching it when stale.
    pub fn calc_and_get_revision(&self) -> String {
        if let Some(revision) = self.read().revision.clone() {
            return revision;
        }

        let mut state = self.write();
        // Another writer may have filled it between the two locks.
        if let Some(revision) = state.revision.clone() {
            return revision;
        }
        let revision = compute_revision(&state.exported);
        state.revision = Some(revision.clone());
        revision
    }

    pub fn has_reported(&self) -> bool {
        self.reported.load(Ordering::SeqCst)
    }

    /// Mark reported only if `revision` is still current.
    ///
    /// Returns `false` when a change landed after the snapshot was taken, in
    /// which case the flag stays clear and the next publish picks it up.
    pub fn mark_reported_revision(&self, revision: &str) -> bool {
        let state = self.write();
        if state.revision.as_deref() != Some(revision) {
            return false;
        }
        self.reported.store(true, Ordering::SeqCst);
        true
    }

    /// Snapshot for publication, computing the revision if needed.
    pub fn to_record(&self) -> MetadataRecord {
        loop {
            let revision = self.calc_and_get_revision();
            let state = self.read();
            // Services and revision must come from the same generation.
            if state.revision.as_deref() == Some(revision.as_str()) {
                return MetadataRecord {
                    app: self.app.clone(),
                    revision,
                    services: state.exported.clone(),
                };
            }
        }
    }
}

/// SHA-256 over exported services in match-key order, params sorted by key.
fn compute_revision(exported: &BTreeMap<String, ServiceInfo>) -> String {
    if exported.is_empty() {
        return MetadataConfig::EMPTY_REVISION.to_string();
    }

    let mut hasher = Sha256::new();
    for (match_key, service) in exported {
        hasher.update(match_key.as_bytes());
        hasher.update(b"\n");
        for (key, value) in &service.params {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}
