//! Export/reference URL value type.
//!
//! A [`ServiceUrl`] is the descriptor a service exporter or a reference
//! consumer hands to the metadata layer: protocol, address, path and a
//! sorted parameter map. Grammar handling is delegated to the `url` crate.

use crate::config::MetadataConfig;
use crate::error::{MetasyncError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A service export or reference URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceUrl {
    pub protocol: String,
    pub host: String,
    pub port: Option<u16>,
    /// Path without the leading slash, usually the interface name.
    pub path: String,
    pub params: BTreeMap<String, String>,
}

impl ServiceUrl {
    /// Create a URL with no parameters.
    pub fn new(
        protocol: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
            port,
            path: path.into(),
            params: BTreeMap::new(),
        }
    }

    /// Parse a URL such as `tri://10.0.0.5:20000/com.foo.Bar?side=provider`.
    pub fn parse(input: &str) -> Result<Self> {
        let parsed = url::Url::parse(input).map_err(|e| MetasyncError::Validation {
            field: "url".to_string(),
            message: format!("{}: {}", input, e),
        })?;

        let params = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        Ok(Self {
            protocol: parsed.scheme().to_string(),
            host: parsed.host_str().unwrap_or_default().to_string(),
            port: parsed.port(),
            path: parsed.path().trim_start_matches('/').to_string(),
            params,
        })
    }

    /// Builder-style parameter setter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Parameter value, or `default` when absent or empty.
    pub fn get_param<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.params.get(key) {
            Some(value) if !value.is_empty() => value,
            _ => default,
        }
    }

    /// Boolean parameter; unparseable values fall back to `default`.
    pub fn get_param_bool(&self, key: &str, default: bool) -> bool {
        self.params
            .get(key)
            .and_then(|v| v.trim().parse::<bool>().ok())
            .unwrap_or(default)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Interface name: the `interface` parameter, else the path.
    pub fn interface(&self) -> &str {
        self.get_param(MetadataConfig::INTERFACE_KEY, &self.path)
    }

    pub fn group(&self) -> &str {
        self.get_param(MetadataConfig::GROUP_KEY, "")
    }

    pub fn version(&self) -> &str {
        self.get_param(MetadataConfig::VERSION_KEY, "")
    }

    /// `group/interface:version`, empty parts omitted.
    pub fn service_key(&self) -> String {
        service_key(self.interface(), self.group(), self.version())
    }
}

/// Build a service key from its parts.
pub fn service_key(interface: &str, group: &str, version: &str) -> String {
    let mut key = String::with_capacity(interface.len() + group.len() + version.len() + 2);
    if !group.is_empty() {
        key.push_str(group);
        key.push('/');
    }
    key.push_str(interface);
    if !version.is_empty() {
        key.push(':');
        key.push_str(version);
    }
    key
}

impl fmt::Display for ServiceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        write!(f, "/{}", self.path)?;
        let mut sep = '?';
        for (key, value) in &self.params {
            write!(
                f,
                "{}{}={}",
                sep,
                urlencoding::encode(key),
                urlencoding::encode(value)
            )?;
            sep = '&';
        }
        Ok(())
    }
}
