//! Remote metadata report.
//!
//! The report is the durable store every node in the cluster reads other
//! applications' metadata from. Backends implement [`MetadataReport`];
//! [`DelegateReport`] wraps one with serialization, retries and failed-write
//! bookkeeping.
//!
//! # Backends
//!
//! - [`MemoryMetadataReport`]: process-local, for tests and single-node use
//! - [`SqliteMetadataReport`]: a SQLite file shared by processes on a host
//!
//! [`build_report`] picks one from a [`ReportConfig`] address.

mod delegate;
mod memory;
mod retry;
mod sqlite;
mod traits;

pub use delegate::DelegateReport;
pub use memory::MemoryMetadataReport;
pub use retry::{retry_async, RetryConfig, RetryStats};
pub use sqlite::SqliteMetadataReport;
pub use traits::{MetadataReport, RecordKind};

use crate::config::{ReportBackend, ReportConfig};
use crate::error::Result;
use std::sync::Arc;
use tracing::debug;

/// Create the backend selected by `config.address`.
pub fn build_report(config: &ReportConfig) -> Result<Arc<dyn MetadataReport>> {
    match config.backend()? {
        ReportBackend::Memory => {
            debug!("Using in-memory metadata report");
            Ok(Arc::new(MemoryMetadataReport::new()))
        }
        ReportBackend::Sqlite(path) => {
            debug!("Using SQLite metadata report at {}", path.display());
            Ok(Arc::new(SqliteMetadataReport::open(&path)?))
        }
    }
}
