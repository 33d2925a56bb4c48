//! Remote-store keys for metadata records.
//!
//! Identifiers are plain values: the same tuple always yields equal
//! identifiers and the same key string, across processes. Every field is
//! percent-encoded before joining, so two distinct tuples can never render
//! to the same key.

use crate::config::MetadataConfig;
use crate::service_url::ServiceUrl;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a metadata entry describes an exposed or a consumed interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Provider,
    Consumer,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Provider => MetadataConfig::PROVIDER_SIDE,
            Side::Consumer => MetadataConfig::CONSUMER_SIDE,
        }
    }

    /// Read the side from a URL `side` parameter value.
    ///
    /// Only the exact provider literal selects [`Side::Provider`]; anything
    /// else, including an absent value, is a consumer.
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some(MetadataConfig::PROVIDER_SIDE) => Side::Provider,
            _ => Side::Consumer,
        }
    }

    pub fn of_url(url: &ServiceUrl) -> Self {
        Self::from_param(url.params().get(MetadataConfig::SIDE_KEY).map(String::as_str))
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of a provider definition or consumer parameter record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetadataIdentifier {
    pub service_interface: String,
    pub version: String,
    pub group: String,
    pub side: Side,
}

impl MetadataIdentifier {
    /// Build an identifier, applying the version and group defaults.
    pub fn new(
        service_interface: impl Into<String>,
        version: Option<&str>,
        group: Option<&str>,
        side: Side,
    ) -> Self {
        let group = match group {
            Some(g) if !g.is_empty() => g,
            _ => MetadataConfig::DEFAULT_GROUP,
        };
        Self {
            service_interface: service_interface.into(),
            version: version.unwrap_or_default().to_string(),
            group: group.to_string(),
            side,
        }
    }

    /// Identifier for the interface described by `url`.
    pub fn from_url(url: &ServiceUrl, side: Side) -> Self {
        Self::new(
            url.get_param(MetadataConfig::INTERFACE_KEY, ""),
            Some(url.version()),
            Some(url.group()),
            side,
        )
    }

    /// `interface:version:group:side` with each field percent-encoded.
    pub fn identifier_key(&self) -> String {
        join_key(&[
            self.service_interface.as_str(),
            self.version.as_str(),
            self.group.as_str(),
            self.side.as_str(),
        ])
    }

    /// `metadata/interface/version/group/side`, empty fields kept as empty segments.
    pub fn path_key(&self) -> String {
        join_path(&[
            self.service_interface.as_str(),
            self.version.as_str(),
            self.group.as_str(),
            self.side.as_str(),
        ])
    }
}

impl fmt::Display for MetadataIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier_key())
    }
}

/// Key of an application's published metadata at a given revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberMetadataIdentifier {
    pub application: String,
    pub revision: String,
}

impl SubscriberMetadataIdentifier {
    pub fn new(application: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            revision: revision.into(),
        }
    }

    pub fn identifier_key(&self) -> String {
        join_key(&[self.application.as_str(), self.revision.as_str()])
    }

    pub fn path_key(&self) -> String {
        join_path(&[self.application.as_str(), self.revision.as_str()])
    }
}

impl fmt::Display for SubscriberMetadataIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier_key())
    }
}

fn join_key(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| urlencoding::encode(p).into_owned())
        .collect::<Vec<_>>()
        .join(MetadataConfig::KEY_SEPARATOR)
}

// Empty segments stay in place so every field keeps its position.
fn join_path(parts: &[&str]) -> String {
    let mut path = String::from(MetadataConfig::PATH_ROOT);
    for part in parts {
        path.push('/');
        path.push_str(&urlencoding::encode(part));
    }
    path
}
