//! Metasync - Service metadata synchronization for RPC applications.
//!
//! This crate keeps an application's exported-service metadata in step with a
//! shared remote metadata report. Providers publish their metadata under a
//! content-derived revision; consumers fetch another application's metadata by
//! the revision its instances advertise. Per-service definitions (provider
//! method signatures, consumer reference parameters) are stored alongside.
//!
//! # Example
//!
//! ```rust,ignore
//! use metasync::{
//!     InMemoryMetadataService, MetadataServiceCell, RemoteMetadataService, ReportConfig,
//!     ServiceRegistry, ServiceUrl,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> metasync::Result<()> {
//!     let local = Arc::new(InMemoryMetadataService::new("greeter-app"));
//!     local.export_url(&ServiceUrl::parse(
//!         "tri://10.0.0.7:20000/com.demo.Greeter?interface=com.demo.Greeter&side=provider",
//!     )?)?;
//!
//!     let cell = MetadataServiceCell::new();
//!     let service = cell
//!         .get_or_init(|| async {
//!             RemoteMetadataService::connect(
//!                 &ReportConfig::new("sqlite:///var/lib/metasync/reports.db"),
//!                 local.clone(),
//!                 ServiceRegistry::new(),
//!             )
//!         })
//!         .await?;
//!
//!     let outcome = service.publish_metadata("greeter-app").await;
//!     println!("Publish: {:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod definition;
pub mod error;
pub mod identifier;
pub mod info;
pub mod instance;
pub mod local;
pub mod registry;
pub mod report;
pub mod service;
pub mod service_url;

// Re-export commonly used types
pub use config::{MetadataConfig, ReportBackend, ReportConfig, ReportDefaults};
pub use definition::{DefinitionOutcome, ServiceDefinition, SkipReason};
pub use error::{MetasyncError, Result};
pub use identifier::{MetadataIdentifier, Side, SubscriberMetadataIdentifier};
pub use info::{MetadataInfo, MetadataRecord, ServiceInfo};
pub use instance::{DefaultServiceInstance, ServiceInstance};
pub use local::{InMemoryMetadataService, LocalMetadataService};
pub use registry::{MethodDescriptor, RegisteredService, ServiceRegistry};
pub use report::{
    build_report, DelegateReport, MemoryMetadataReport, MetadataReport, RetryConfig,
    SqliteMetadataReport,
};
pub use service::{MetadataServiceCell, PublishOutcome, RemoteMetadataService};
pub use service_url::ServiceUrl;
