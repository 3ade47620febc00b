//! Resolution from the locally cached registry

use super::ClusterResolver;
use crate::endpoint::{Endpoint, EndpointRole, ResolutionSnapshot};
use crate::error::Result;
use crate::registry::RegistrySource;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Endpoints from the UP instances of the read-cluster application
///
/// Never performs I/O. Returns an empty snapshot while the registry is cold.
pub struct RegistrySnapshotResolver {
    region: String,
    source: Arc<dyn RegistrySource>,
    app_name: String,
    context_path: String,
}

impl RegistrySnapshotResolver {
    pub fn new(
        region: impl Into<String>,
        source: Arc<dyn RegistrySource>,
        app_name: impl Into<String>,
        context_path: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            source,
            app_name: app_name.into(),
            context_path: context_path.into(),
        }
    }
}

#[async_trait]
impl ClusterResolver for RegistrySnapshotResolver {
    fn region(&self) -> &str {
        &self.region
    }

    async fn resolve(&self) -> Result<ResolutionSnapshot> {
        let Some(instances) = self.source.lookup(&self.app_name) else {
            debug!(app = %self.app_name, "Registry has no entry for read cluster");
            return Ok(ResolutionSnapshot::empty(self.region.clone()));
        };

        let endpoints: Vec<Endpoint> = instances
            .iter()
            .filter(|instance| instance.is_up())
            .map(|instance| Endpoint::from_instance(instance, &self.context_path, EndpointRole::Query))
            .collect();

        debug!(
            app = %self.app_name,
            instances = instances.len(),
            endpoints = endpoints.len(),
            "Resolved endpoints from local registry"
        );
        Ok(ResolutionSnapshot::new(self.region.clone(), endpoints))
    }

    fn backend_name(&self) -> &'static str {
        "registry"
    }
}
