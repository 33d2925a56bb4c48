//! Local metadata cache.
//!
//! Holds this process's own exported and subscribed services and serves
//! lookups for them. The synchronization service consumes it through the
//! [`LocalMetadataService`] trait; [`InMemoryMetadataService`] is the
//! process-local implementation.

mod memory;
mod traits;

pub use memory::InMemoryMetadataService;
pub use traits::LocalMetadataService;
