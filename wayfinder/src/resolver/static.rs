//! Static cluster resolution from configuration
//!
//! Endpoints come from the configured `service_urls` of every availability
//! zone in the region. No I/O and no caching; the same configuration always
//! yields the same ordered snapshot. Mostly used as the seed for the remote
//! bootstrap resolver.

use super::ClusterResolver;
use crate::config::ClientConfig;
use crate::endpoint::{Endpoint, EndpointRole, ResolutionSnapshot};
use crate::error::Result;
use async_trait::async_trait;
use tracing::debug;

/// Resolver over a fixed list of endpoints
pub struct StaticResolver {
    region: String,
    endpoints: Vec<Endpoint>,
}

impl StaticResolver {
    /// Build from configuration with Query-role endpoints
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::from_config_with_role(config, EndpointRole::Query)
    }

    /// Build from configuration
    ///
    /// Zones are taken in the configured order of the region. When the region
    /// lists no zones, every zone with service URLs is used, sorted by name.
    /// A URL that does not parse is a configuration error.
    pub fn from_config_with_role(config: &ClientConfig, role: EndpointRole) -> Result<Self> {
        let mut zones: Vec<String> = config.zones_for(&config.region).to_vec();
        if zones.is_empty() {
            zones = config.service_urls.keys().cloned().collect();
            zones.sort();
        }

        let mut endpoints = Vec::new();
        for zone in &zones {
            let Some(urls) = config.service_urls.get(zone) else {
                debug!(zone = %zone, "No service URLs configured for zone");
                continue;
            };
            for url in urls {
                endpoints.push(Endpoint::from_url(url, zone.clone(), role)?);
            }
        }

        debug!(
            region = %config.region,
            zones = zones.len(),
            endpoints = endpoints.len(),
            "Built static endpoint list"
        );

        Ok(Self {
            region: config.region.clone(),
            endpoints,
        })
    }

    /// Resolver over an explicit endpoint list
    pub fn from_endpoints(region: impl Into<String>, endpoints: Vec<Endpoint>) -> Self {
        Self {
            region: region.into(),
            endpoints,
        }
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}

#[async_trait]
impl ClusterResolver for StaticResolver {
    fn region(&self) -> &str {
        &self.region
    }

    async fn resolve(&self) -> Result<ResolutionSnapshot> {
        Ok(ResolutionSnapshot::new(self.region.clone(), self.endpoints.clone()))
    }

    fn backend_name(&self) -> &'static str {
        "static"
    }
}
