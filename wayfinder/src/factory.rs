//! Standard wiring of resolvers and client pipelines
//!
//! Builds, in dependency order:
//!
//! ```text
//! transport ─ MetricsCollectingFactory ─┬─ RemoteBootstrapResolver (seed queries)
//!                                       └─ RedirectingFactory ─ RetryableFactory × 2
//!
//! AsyncResolver(ZoneAffinityResolver(CompoundResolver(registry, remote(static))))
//!
//! new_client() → SplitClient(Sessioned(registration), Sessioned(query))
//! ```

use crate::config::ClientConfig;
use crate::error::{DiscoveryError, Result};
use crate::registry::RegistrySource;
use crate::resolver::{
    AsyncResolver, ClusterResolver, CompoundResolver, RegistrySnapshotResolver,
    RemoteBootstrapResolver, StaticResolver, ZoneAffinityResolver,
};
use crate::transport::{
    ClientFactory, DiscoveryHttpClient, LegacyEvaluator, MetricsCollectingFactory, RedirectingFactory,
    RetryableFactory, ServerStatusEvaluator, SessionedClient, SplitClient, TransportClientFactory,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};

/// Build and start the shared cluster resolver
///
/// Must be called inside a tokio runtime.
pub fn create_standard_cluster_resolver(
    config: &ClientConfig,
    registry: Arc<dyn RegistrySource>,
    transport: Arc<dyn TransportClientFactory>,
) -> Result<Arc<AsyncResolver>> {
    config.validate()?;
    let bootstrap = Arc::new(StaticResolver::from_config(config)?);
    let remote = Arc::new(RemoteBootstrapResolver::new(
        bootstrap,
        transport,
        config.read_cluster_app_name.clone(),
        config.service_context_path.clone(),
    ));
    let local = Arc::new(RegistrySnapshotResolver::new(
        config.region.clone(),
        registry,
        config.read_cluster_app_name.clone(),
        config.service_context_path.clone(),
    ));
    let compound = Arc::new(CompoundResolver::new(local, remote));
    let zoned = Arc::new(ZoneAffinityResolver::new(
        compound,
        config.my_zone(),
        config.zone_affinity,
    ));

    let resolver = Arc::new(AsyncResolver::new(
        zoned,
        config.refresh_interval(),
        config.initial_delay(),
    ));
    resolver.start()?;

    info!(
        region = %config.region,
        zone = %config.my_zone(),
        read_cluster = %config.read_cluster_app_name,
        "Cluster resolver started"
    );
    Ok(resolver)
}

/// Build the standard client factory over a wire transport
///
/// Must be called inside a tokio runtime.
pub fn create_standard_client_factory(
    config: &ClientConfig,
    registry: Arc<dyn RegistrySource>,
    transport: Arc<dyn TransportClientFactory>,
) -> Result<StandardClientFactory> {
    let measured: Arc<dyn TransportClientFactory> = Arc::new(MetricsCollectingFactory::new(transport.clone()));
    let resolver = create_standard_cluster_resolver(config, registry, measured.clone())?;
    let redirecting: Arc<dyn TransportClientFactory> = Arc::new(RedirectingFactory::new(measured));
    let evaluator: Arc<dyn ServerStatusEvaluator> = Arc::new(LegacyEvaluator);

    let shared: Arc<dyn ClusterResolver> = resolver.clone();
    let pipeline = |name: &str| -> Arc<dyn ClientFactory> {
        Arc::new(
            RetryableFactory::new(name, shared.clone(), redirecting.clone(), evaluator.clone())
                .with_quarantine_ratio(config.quarantine_ratio),
        )
    };

    Ok(StandardClientFactory {
        registration: pipeline("registration"),
        query: pipeline("query"),
        resolver,
        transport,
        reconnect_interval: config.reconnect_interval(),
        jitter_ratio: config.reconnect_jitter_ratio,
        clients: Mutex::new(Vec::new()),
        shut_down: AtomicBool::new(false),
    })
}

/// Root object owning the resolver, the transport and every client it built
pub struct StandardClientFactory {
    resolver: Arc<AsyncResolver>,
    transport: Arc<dyn TransportClientFactory>,
    registration: Arc<dyn ClientFactory>,
    query: Arc<dyn ClientFactory>,
    reconnect_interval: Duration,
    jitter_ratio: f64,
    clients: Mutex<Vec<Weak<SplitClient>>>,
    shut_down: AtomicBool,
}

impl StandardClientFactory {
    /// Resolver shared by both pipelines
    pub fn resolver(&self) -> &Arc<AsyncResolver> {
        &self.resolver
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn session(&self, name: &str, factory: &Arc<dyn ClientFactory>) -> Arc<dyn DiscoveryHttpClient> {
        Arc::new(
            SessionedClient::new(name, factory.clone(), self.reconnect_interval)
                .with_jitter_ratio(self.jitter_ratio),
        )
    }
}

impl ClientFactory for StandardClientFactory {
    fn new_client(&self) -> Result<Arc<dyn DiscoveryHttpClient>> {
        if self.is_shut_down() {
            return Err(DiscoveryError::Shutdown);
        }

        let client = Arc::new(SplitClient::new(
            self.session("registration", &self.registration),
            self.session("query", &self.query),
        ));

        let mut clients = self.clients.lock();
        clients.retain(|c| c.strong_count() > 0);
        clients.push(Arc::downgrade(&client));
        debug!(live_clients = clients.len(), "Built discovery client");

        Ok(client)
    }

    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        self.resolver.shutdown();
        let clients: Vec<Weak<SplitClient>> = self.clients.lock().drain(..).collect();
        for client in clients.iter().filter_map(Weak::upgrade) {
            client.shutdown();
        }
        self.transport.shutdown();
        info!(clients = clients.len(), "Discovery client factory shut down");
    }
}

impl Drop for StandardClientFactory {
    fn drop(&mut self) {
        self.shutdown();
    }
}
