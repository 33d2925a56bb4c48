//! Centralized configuration for metadata synchronization.
//!
//! Constant holders for the well-known URL keys and defaults shared by the
//! identifier builder, the local cache and the synchronization service, plus
//! the deserializable [`ReportConfig`] used to build a remote report.

use crate::error::{MetasyncError, Result};
use crate::report::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Well-known URL parameter keys and metadata defaults.
pub struct MetadataConfig;

impl MetadataConfig {
    pub const INTERFACE_KEY: &'static str = "interface";
    pub const GENERIC_KEY: &'static str = "generic";
    pub const SIDE_KEY: &'static str = "side";
    pub const VERSION_KEY: &'static str = "version";
    pub const GROUP_KEY: &'static str = "group";

    /// Group used when a URL carries none.
    pub const DEFAULT_GROUP: &'static str = "dubbo";
    pub const PROVIDER_SIDE: &'static str = "provider";
    pub const CONSUMER_SIDE: &'static str = "consumer";

    /// Service instance property carrying the exported-services revision.
    pub const EXPORTED_SERVICES_REVISION_PROPERTY_NAME: &'static str = "dubbo.metadata.revision";

    /// Revision of an application that exports nothing.
    pub const EMPTY_REVISION: &'static str = "0";

    /// Interface selector matching every exported service.
    pub const ALL_SERVICE_INTERFACES: &'static str = "*";

    /// Root segment of path-style store keys.
    pub const PATH_ROOT: &'static str = "metadata";
    pub const KEY_SEPARATOR: &'static str = ":";
}

/// Defaults for the remote report layer.
pub struct ReportDefaults;

impl ReportDefaults {
    pub const MEMORY_ADDRESS: &'static str = "memory://";
    pub const RETRY_ATTEMPTS: u32 = 3;
    pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);
    pub const SQLITE_BUSY_TIMEOUT_MS: u32 = 5_000;
}

/// Which backend a [`ReportConfig`] address selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportBackend {
    /// Process-local map, mostly for tests and single-node setups.
    Memory,
    /// SQLite file shared by every process on the host.
    Sqlite(PathBuf),
}

/// Configuration for the remote metadata report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReportConfig {
    /// Backend address, `memory://` or `sqlite:///path/to/reports.db`.
    pub address: String,
    /// Retry policy applied to provider/consumer store writes.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            address: ReportDefaults::MEMORY_ADDRESS.to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl ReportConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Resolve the address into a backend selection.
    pub fn backend(&self) -> Result<ReportBackend> {
        let parsed = url::Url::parse(&self.address).map_err(|e| MetasyncError::Config {
            message: format!("invalid report address {:?}: {}", self.address, e),
        })?;

        match parsed.scheme() {
            "memory" => Ok(ReportBackend::Memory),
            "sqlite" => {
                // `sqlite://data/x.db` would silently put `data` in the host.
                if parsed.host_str().is_some_and(|host| !host.is_empty()) {
                    return Err(MetasyncError::Config {
                        message: format!(
                            "sqlite report address must be absolute (sqlite:///path): {}",
                            self.address
                        ),
                    });
                }
                let path = urlencoding::decode(parsed.path()).map_err(|e| MetasyncError::Config {
                    message: format!("invalid sqlite report path in {}: {}", self.address, e),
                })?;
                if path.is_empty() || path == "/" {
                    return Err(MetasyncError::Config {
                        message: format!("sqlite report address has no path: {}", self.address),
                    });
                }
                Ok(ReportBackend::Sqlite(PathBuf::from(path.into_owned())))
            }
            other => Err(MetasyncError::Config {
                message: format!("unsupported report scheme: {}", other),
            }),
        }
    }
}
