//! Wayfinder - Resilient client transport for Eureka-style service discovery
//!
//! This crate decides which discovery server to talk to, keeps that decision
//! fresh, and makes each logical request survive individual server failures,
//! redirects and partitions.
//!
//! # Architecture
//!
//! - **Resolvers**: static config, local registry cache and remote bootstrap
//!   sources, composed with zone affinity and refreshed in the background
//! - **Transport**: typed discovery operations over a `reqwest` wire client
//! - **Decorators**: metrics, redirect following, failover across endpoints,
//!   periodic session rotation, registration/query split
//! - **Factory**: explicit wiring of the standard pipeline
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use wayfinder::{create_standard_client_factory, ClientConfig, ClientFactory, HttpTransportFactory, LocalRegistry};
//!
//! # async fn run() -> wayfinder::Result<()> {
//! let config = ClientConfig::default();
//! let registry = Arc::new(LocalRegistry::new(config.registry_staleness()));
//! let transport = Arc::new(HttpTransportFactory::new(&config)?);
//!
//! let factory = create_standard_client_factory(&config, registry, transport)?;
//! let client = factory.new_client()?;
//! let response = client.get_applications().await?;
//! println!("status {}", response.status);
//! factory.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod endpoint;
pub mod error;
pub mod factory;
pub mod metrics;
pub mod model;
pub mod registry;
pub mod resolver;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::{ClientConfig, InstanceConfig};
pub use endpoint::{Endpoint, EndpointRole, ResolutionSnapshot};
pub use error::{DiscoveryError, Result};
pub use factory::{create_standard_client_factory, create_standard_cluster_resolver, StandardClientFactory};
pub use model::{ActionType, Application, Applications, InstanceInfo, InstanceStatus};
pub use registry::{DeltaOutcome, FetchKind, LocalRegistry, RegistrySource};
pub use resolver::{
    AsyncResolver, ClusterResolver, CompoundResolver, RegistrySnapshotResolver, RemoteBootstrapResolver,
    ResolverStats, StaticResolver, ZoneAffinityResolver,
};
pub use transport::{
    ClientFactory, DiscoveryHttpClient, DiscoveryRequest, DiscoveryResponse, HttpTransportFactory,
    LegacyEvaluator, RequestKind, ResponseBody, ServerStatusEvaluator, StatusVerdict, TransportClientFactory,
};
