//! Cluster resolution: where the discovery servers are
//!
//! Resolvers produce an ordered [`ResolutionSnapshot`] of candidate
//! endpoints. They compose:
//!
//! ```text
//! AsyncResolver
//!   └─ ZoneAffinityResolver
//!        └─ CompoundResolver
//!             ├─ RegistrySnapshotResolver   (local registry cache, no I/O)
//!             └─ RemoteBootstrapResolver    (one query against a seed)
//!                  └─ StaticResolver        (configured service URLs)
//! ```
//!
//! "No endpoints" is an empty snapshot, never an error. Errors mean the
//! resolver could not find out at all (I/O or parse failure).

mod async_resolver;
mod compound;
mod registry;
mod remote;
mod r#static;
mod zone_affinity;

pub use async_resolver::{AsyncResolver, ResolverStats};
pub use compound::CompoundResolver;
pub use r#static::StaticResolver;
pub use registry::RegistrySnapshotResolver;
pub use remote::RemoteBootstrapResolver;
pub use zone_affinity::ZoneAffinityResolver;

use crate::endpoint::ResolutionSnapshot;
use crate::error::Result;
use async_trait::async_trait;

/// Source of candidate discovery endpoints for a region
#[async_trait]
pub trait ClusterResolver: Send + Sync {
    /// Region the endpoints are resolved for
    fn region(&self) -> &str;

    /// Current best-known endpoints; bounded latency
    async fn resolve(&self) -> Result<ResolutionSnapshot>;

    /// Resolver name for logs and metrics
    fn backend_name(&self) -> &'static str;
}
