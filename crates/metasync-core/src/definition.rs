//! Structural service definitions.
//!
//! A [`ServiceDefinition`] describes a provider interface (methods and the
//! types they mention) so consumers can understand its contract without the
//! implementation. Only concrete provider interfaces get one.

use crate::config::MetadataConfig;
use crate::error::Result;
use crate::identifier::MetadataIdentifier;
use crate::registry::{RegisteredService, ServiceRegistry};
use crate::service_url::ServiceUrl;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Why a provider definition was not published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The URL carries no `interface` parameter.
    EmptyInterface,
    /// Generic interfaces have no fixed structure to describe.
    GenericInterface,
    /// Nothing is registered under the URL's protocol and service key.
    ServiceNotRegistered,
    /// The URL describes a consumer, which has no structural definition.
    NotProvider,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::EmptyInterface => "interface name is empty",
            SkipReason::GenericInterface => "interface is generic",
            SkipReason::ServiceNotRegistered => "no registered service for url",
            SkipReason::NotProvider => "url is not a provider",
        })
    }
}

/// Result of publishing a service definition.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum DefinitionOutcome {
    /// A structural definition was stored for a provider.
    Provider(MetadataIdentifier),
    /// The reference parameters were stored for a consumer.
    Consumer(MetadataIdentifier),
    /// Nothing was stored.
    Skipped(SkipReason),
}

impl DefinitionOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, DefinitionOutcome::Skipped(_))
    }
}

/// Resolve and build the definition for a provider URL.
///
/// Applies the provider gate: a non-empty, non-generic interface with a
/// registered implementation.
pub fn provider_definition(
    url: &ServiceUrl,
    registry: &ServiceRegistry,
) -> std::result::Result<ServiceDefinition, SkipReason> {
    let interface = url.get_param(MetadataConfig::INTERFACE_KEY, "");
    if interface.is_empty() {
        return Err(SkipReason::EmptyInterface);
    }
    if url.get_param_bool(MetadataConfig::GENERIC_KEY, false) {
        return Err(SkipReason::GenericInterface);
    }
    let service = registry
        .get_by_service_key(&url.protocol, &url.service_key())
        .ok_or(SkipReason::ServiceNotRegistered)?;
    Ok(build_service_definition(&service, url))
}

/// One method of a service definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDefinition {
    pub name: String,
    pub parameter_types: Vec<String>,
    pub return_type: String,
}

/// A type referenced by a method signature.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDefinition {
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Structural description of a provider interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    pub canonical_name: String,
    pub code_source: String,
    pub methods: Vec<MethodDefinition>,
    pub types: Vec<TypeDefinition>,
    /// Export URL parameters, kept so the definition is self-describing.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl ServiceDefinition {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Build the definition of `service` as exported through `url`.
pub fn build_service_definition(service: &RegisteredService, url: &ServiceUrl) -> ServiceDefinition {
    let mut types = BTreeSet::new();
    let methods = service
        .methods
        .iter()
        .map(|m| {
            types.extend(m.parameter_types.iter().cloned());
            types.extend(m.return_types.iter().cloned());
            MethodDefinition {
                name: m.name.clone(),
                parameter_types: m.parameter_types.clone(),
                // Multiple results are flattened into a single tuple-like name.
                return_type: m.return_types.join(","),
            }
        })
        .collect();

    ServiceDefinition {
        canonical_name: url
            .get_param(MetadataConfig::INTERFACE_KEY, &service.name)
            .to_string(),
        code_source: url.path.clone(),
        methods,
        types: types
            .into_iter()
            .map(|type_name| TypeDefinition { type_name })
            .collect(),
        parameters: url.params().clone(),
    }
}
