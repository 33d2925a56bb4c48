//! Registry of service implementations known to this process.
//!
//! Exporters register each implementation under its protocol and service key
//! so the metadata layer can later describe its methods. Thread-safe via an
//! internal `RwLock`; handles are cheap to clone.

use crate::service_url::ServiceUrl;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Signature of one invocable method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDescriptor {
    pub name: String,
    pub parameter_types: Vec<String>,
    pub return_types: Vec<String>,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter_types: Vec::new(),
            return_types: Vec::new(),
        }
    }

    pub fn with_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameter_types = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_returns<I, S>(mut self, returns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.return_types = returns.into_iter().map(Into::into).collect();
        self
    }
}

/// A registered service implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredService {
    /// Implementation name, used when the URL carries no interface.
    pub name: String,
    pub methods: Vec<MethodDescriptor>,
}

impl RegisteredService {
    pub fn new(name: impl Into<String>, methods: Vec<MethodDescriptor>) -> Self {
        Self {
            name: name.into(),
            methods,
        }
    }
}

type ServiceMap = HashMap<String, HashMap<String, Arc<RegisteredService>>>;

/// Services registered per protocol, keyed by service key.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: Arc<RwLock<ServiceMap>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, ServiceMap> {
        self.services.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ServiceMap> {
        self.services.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register (or replace) a service under `protocol` and `service_key`.
    pub fn register(&self, protocol: &str, service_key: &str, service: RegisteredService) {
        debug!("Registering service {} under {}://{}", service.name, protocol, service_key);
        self.write()
            .entry(protocol.to_string())
            .or_default()
            .insert(service_key.to_string(), Arc::new(service));
    }

    /// Register the service described by an export URL.
    pub fn register_for_url(&self, url: &ServiceUrl, service: RegisteredService) {
        self.register(&url.protocol, &url.service_key(), service);
    }

    pub fn unregister(&self, protocol: &str, service_key: &str) -> bool {
        self.write()
            .get_mut(protocol)
            .map(|by_key| by_key.remove(service_key).is_some())
            .unwrap_or(false)
    }

    pub fn get_by_service_key(
        &self,
        protocol: &str,
        service_key: &str,
    ) -> Option<Arc<RegisteredService>> {
        self.read()
            .get(protocol)?
            .get(service_key)
            .cloned()
    }
}
