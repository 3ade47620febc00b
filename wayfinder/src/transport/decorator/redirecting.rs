//! Single-hop redirect following
//!
//! A redirect answer is followed exactly once. If the target answers with
//! another redirect, that response is returned as-is to the caller. A target
//! that served the request successfully is pinned and receives subsequent
//! requests directly until it fails at the transport level.

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::metrics;
use crate::transport::{DiscoveryHttpClient, DiscoveryRequest, DiscoveryResponse, TransportClientFactory};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

struct Pinned {
    endpoint: Endpoint,
    client: Arc<dyn DiscoveryHttpClient>,
}

pub struct RedirectingClient {
    endpoint: Endpoint,
    delegate: Arc<dyn DiscoveryHttpClient>,
    factory: Arc<dyn TransportClientFactory>,
    pinned: RwLock<Option<Pinned>>,
}

impl RedirectingClient {
    pub fn new(endpoint: Endpoint, factory: Arc<dyn TransportClientFactory>) -> Result<Self> {
        let delegate = factory.new_client(&endpoint)?;
        Ok(Self {
            endpoint,
            delegate,
            factory,
            pinned: RwLock::new(None),
        })
    }

    /// Endpoint currently receiving requests
    pub fn current_endpoint(&self) -> Endpoint {
        self.pinned
            .read()
            .as_ref()
            .map(|p| p.endpoint.clone())
            .unwrap_or_else(|| self.endpoint.clone())
    }

    fn current(&self) -> (Endpoint, Arc<dyn DiscoveryHttpClient>, bool) {
        match self.pinned.read().as_ref() {
            Some(p) => (p.endpoint.clone(), p.client.clone(), true),
            None => (self.endpoint.clone(), self.delegate.clone(), false),
        }
    }

    fn pin(&self, endpoint: Endpoint, client: Arc<dyn DiscoveryHttpClient>) {
        debug!(from = %self.endpoint.address(), to = %endpoint.address(), "Pinning redirect target");
        let previous = self.pinned.write().replace(Pinned { endpoint, client });
        if let Some(previous) = previous {
            previous.client.shutdown();
        }
    }

    fn unpin(&self, endpoint: &Endpoint) {
        let mut pinned = self.pinned.write();
        if pinned.as_ref().is_some_and(|p| &p.endpoint == endpoint) {
            if let Some(previous) = pinned.take() {
                previous.client.shutdown();
            }
        }
    }
}

#[async_trait]
impl DiscoveryHttpClient for RedirectingClient {
    async fn execute(&self, request: &DiscoveryRequest) -> Result<DiscoveryResponse> {
        let (origin, client, is_pinned) = self.current();

        let response = match client.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                if is_pinned {
                    warn!(endpoint = %origin.address(), error = %e, "Pinned redirect target failed, reverting");
                    self.unpin(&origin);
                }
                return Err(e);
            }
        };

        if !response.is_redirect() {
            return Ok(response);
        }
        let location = match response.location.clone() {
            Some(location) => location,
            None => return Ok(response),
        };

        let target = Endpoint::from_redirect(&location, &request.path(), &origin)?;
        debug!(
            request = request.kind().as_str(),
            from = %origin.address(),
            to = %target.address(),
            "Following redirect"
        );
        metrics::record_redirect(request.kind().as_str());

        let follow = self.factory.new_client(&target)?;
        let result = follow.execute(request).await;
        match &result {
            Ok(r) if r.is_success() => self.pin(target, follow),
            _ => follow.shutdown(),
        }
        result
    }

    fn shutdown(&self) {
        if let Some(pinned) = self.pinned.write().take() {
            pinned.client.shutdown();
        }
        self.delegate.shutdown();
    }
}

/// Wraps clients for an endpoint in a [`RedirectingClient`]
pub struct RedirectingFactory {
    delegate: Arc<dyn TransportClientFactory>,
}

impl RedirectingFactory {
    pub fn new(delegate: Arc<dyn TransportClientFactory>) -> Self {
        Self { delegate }
    }
}

impl TransportClientFactory for RedirectingFactory {
    fn new_client(&self, endpoint: &Endpoint) -> Result<Arc<dyn DiscoveryHttpClient>> {
        Ok(Arc::new(RedirectingClient::new(
            endpoint.clone(),
            self.delegate.clone(),
        )?))
    }

    fn shutdown(&self) {
        self.delegate.shutdown();
    }
}
