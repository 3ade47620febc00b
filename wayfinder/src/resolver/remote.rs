//! Bootstrap resolution through a remote discovery query
//!
//! Asks one seed server for the instances of the read-cluster application and
//! turns them into query endpoints. Used when the local registry is cold.

use super::ClusterResolver;
use crate::endpoint::{Endpoint, EndpointRole, ResolutionSnapshot};
use crate::error::Result;
use crate::transport::TransportClientFactory;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct RemoteBootstrapResolver {
    bootstrap: Arc<dyn ClusterResolver>,
    factory: Arc<dyn TransportClientFactory>,
    app_name: String,
    context_path: String,
}

impl RemoteBootstrapResolver {
    pub fn new(
        bootstrap: Arc<dyn ClusterResolver>,
        factory: Arc<dyn TransportClientFactory>,
        app_name: impl Into<String>,
        context_path: impl Into<String>,
    ) -> Self {
        Self {
            bootstrap,
            factory,
            app_name: app_name.into(),
            context_path: context_path.into(),
        }
    }

    /// One query against one seed; `None` on any failure
    async fn query(&self, seed: &Endpoint) -> Option<Vec<Endpoint>> {
        let client = match self.factory.new_client(seed) {
            Ok(client) => client,
            Err(e) => {
                warn!(seed = %seed.address(), error = %e, "Cannot create bootstrap client");
                return None;
            }
        };

        let result = client.get_application(&self.app_name).await;
        client.shutdown();

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(seed = %seed.address(), error = %e, "Bootstrap query failed");
                return None;
            }
        };
        if !response.is_success() {
            warn!(seed = %seed.address(), status = response.status, "Bootstrap query rejected");
            return None;
        }
        let Some(application) = response.application() else {
            warn!(seed = %seed.address(), "Bootstrap response carried no application");
            return None;
        };

        Some(
            application
                .instances
                .iter()
                .filter(|instance| instance.is_up())
                .map(|instance| Endpoint::from_instance(instance, &self.context_path, EndpointRole::Query))
                .collect(),
        )
    }
}

#[async_trait]
impl ClusterResolver for RemoteBootstrapResolver {
    fn region(&self) -> &str {
        self.bootstrap.region()
    }

    async fn resolve(&self) -> Result<ResolutionSnapshot> {
        let region = self.bootstrap.region().to_string();
        let seeds = match self.bootstrap.resolve().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Bootstrap resolution failed");
                return Ok(ResolutionSnapshot::empty(region));
            }
        };

        let Some(seed) = seeds.endpoints.choose(&mut rand::thread_rng()).cloned() else {
            warn!(region = %region, "No bootstrap endpoints configured");
            return Ok(ResolutionSnapshot::empty(region));
        };

        match self.query(&seed).await {
            Some(endpoints) => {
                debug!(
                    seed = %seed.address(),
                    app = %self.app_name,
                    endpoints = endpoints.len(),
                    "Resolved read cluster from bootstrap server"
                );
                Ok(ResolutionSnapshot::new(region, endpoints))
            }
            None => Ok(ResolutionSnapshot::empty(region)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Application, InstanceInfo, InstanceStatus};
    use crate::resolver::StaticResolver;
    use crate::testing::{endpoint, FixedResolver, Reply, ScriptedTransport};
    use crate::transport::ResponseBody;

    fn read_cluster() -> Application {
        Application::new("DISCOVERY-READ")
            .with_instance(InstanceInfo::new("discovery-read", "r-1", "read-1", 8080).with_zone("z1"))
            .with_instance(
                InstanceInfo::new("discovery-read", "r-2", "read-2", 8080).with_status(InstanceStatus::Down),
            )
    }

    fn remote(seeds: Vec<Endpoint>, transport: Arc<ScriptedTransport>) -> RemoteBootstrapResolver {
        RemoteBootstrapResolver::new(
            Arc::new(StaticResolver::from_endpoints("us-east-1", seeds)),
            transport,
            "DISCOVERY-READ",
            "eureka/v2",
        )
    }

    #[tokio::test]
    async fn test_converts_up_instances() {
        let seed = endpoint("seed", "z1");
        let transport = ScriptedTransport::new();
        transport.script(&seed, vec![Reply::Body(200, ResponseBody::Application(read_cluster()))]);

        let snapshot = remote(vec![seed.clone()], transport.clone()).resolve().await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.endpoints[0].host(), "read-1");
        assert_eq!(snapshot.endpoints[0].role(), EndpointRole::Query);
        assert_eq!(transport.calls_to(&seed), 1);
        assert_eq!(transport.shutdowns_for(&seed), 1);
    }

    #[tokio::test]
    async fn test_single_query_without_retry() {
        let seeds = vec![endpoint("seed-1", "z1"), endpoint("seed-2", "z1")];
        let transport = ScriptedTransport::new();

        let snapshot = remote(seeds, transport.clone()).resolve().await.unwrap();

        assert!(snapshot.is_empty());
        assert_eq!(transport.call_log().len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_empty() {
        let seed = endpoint("seed", "z1");

        let transport = ScriptedTransport::new();
        transport.script(&seed, vec![Reply::Status(503)]);
        assert!(remote(vec![seed.clone()], transport).resolve().await.unwrap().is_empty());

        let transport = ScriptedTransport::new();
        transport.script(&seed, vec![Reply::Status(200)]);
        assert!(remote(vec![seed.clone()], transport).resolve().await.unwrap().is_empty());

        let transport = ScriptedTransport::new();
        assert!(remote(vec![], transport.clone()).resolve().await.unwrap().is_empty());
        assert_eq!(transport.clients_created(), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_error_is_empty() {
        let bootstrap = FixedResolver::new(vec![endpoint("seed", "z1")]);
        bootstrap.set_failing(true);
        let transport = ScriptedTransport::new();
        let resolver = RemoteBootstrapResolver::new(bootstrap, transport.clone(), "DISCOVERY-READ", "eureka/v2");

        assert!(resolver.resolve().await.unwrap().is_empty());
        assert_eq!(transport.clients_created(), 0);
    }
}
