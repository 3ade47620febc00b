//! Failover across candidate endpoints
//!
//! Per logical call:
//!
//! ```text
//! Start → TryEndpoint(0) → Accept  → Done (endpoint becomes sticky)
//!                        → Retry   → TryEndpoint(1) → ... → Failed(AllEndpointsExhausted)
//!                        → Fatal   → Failed(NonRetryableClientError)
//! ```
//!
//! Candidates come from the resolver on every call. The sticky endpoint (the
//! last one that accepted a request) is tried first while it is still a
//! candidate; endpoints that failed recently are tried after the others.
//! Every distinct candidate is attempted at most once, one at a time.

use crate::endpoint::Endpoint;
use crate::error::{DiscoveryError, Result};
use crate::metrics;
use crate::resolver::ClusterResolver;
use crate::transport::{
    ClientFactory, DiscoveryHttpClient, DiscoveryRequest, DiscoveryResponse, ServerStatusEvaluator,
    StatusVerdict, TransportClientFactory,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Quarantine ratio matching long-standing discovery clients
pub const DEFAULT_QUARANTINE_RATIO: f64 = 0.66;

fn same_client(a: &Arc<dyn DiscoveryHttpClient>, b: &Arc<dyn DiscoveryHttpClient>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[derive(Clone)]
struct Sticky {
    endpoint: Endpoint,
    client: Arc<dyn DiscoveryHttpClient>,
}

pub struct RetryableClient {
    name: String,
    resolver: Arc<dyn ClusterResolver>,
    factory: Arc<dyn TransportClientFactory>,
    evaluator: Arc<dyn ServerStatusEvaluator>,
    /// Shared by every caller of this instance
    sticky: Mutex<Option<Sticky>>,
    quarantine: Mutex<HashSet<Endpoint>>,
    quarantine_ratio: f64,
    shut_down: AtomicBool,
}

impl RetryableClient {
    pub fn new(
        name: impl Into<String>,
        resolver: Arc<dyn ClusterResolver>,
        factory: Arc<dyn TransportClientFactory>,
        evaluator: Arc<dyn ServerStatusEvaluator>,
    ) -> Self {
        Self {
            name: name.into(),
            resolver,
            factory,
            evaluator,
            sticky: Mutex::new(None),
            quarantine: Mutex::new(HashSet::new()),
            quarantine_ratio: DEFAULT_QUARANTINE_RATIO,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn with_quarantine_ratio(mut self, ratio: f64) -> Self {
        self.quarantine_ratio = ratio;
        self
    }

    /// Endpoint that served the last accepted request, if any
    pub fn sticky_endpoint(&self) -> Option<Endpoint> {
        self.sticky.lock().as_ref().map(|s| s.endpoint.clone())
    }

    /// Endpoints currently deprioritised after a failure
    pub fn quarantined(&self) -> Vec<Endpoint> {
        self.quarantine.lock().iter().cloned().collect()
    }

    /// Candidate order for one call: sticky first, then resolver order with
    /// quarantined endpoints moved to the back. Duplicates are dropped.
    fn order_candidates(&self, endpoints: &[Endpoint], sticky: Option<&Endpoint>) -> Vec<Endpoint> {
        let mut seen = HashSet::new();
        let distinct: Vec<Endpoint> = endpoints
            .iter()
            .filter(|ep| seen.insert((*ep).clone()))
            .cloned()
            .collect();

        let quarantine = {
            let mut quarantine = self.quarantine.lock();
            quarantine.retain(|ep| distinct.contains(ep));
            let threshold = (distinct.len() as f64 * self.quarantine_ratio).ceil() as usize;
            if !quarantine.is_empty() && quarantine.len() >= threshold {
                debug!(
                    client = %self.name,
                    quarantined = quarantine.len(),
                    candidates = distinct.len(),
                    "Quarantine covers too many candidates, clearing"
                );
                quarantine.clear();
            }
            metrics::record_quarantine_size(quarantine.len());
            quarantine.clone()
        };

        let mut ordered = Vec::with_capacity(distinct.len());
        if let Some(sticky) = sticky.filter(|ep| distinct.contains(ep)) {
            ordered.push(sticky.clone());
        }
        let rest = distinct.iter().filter(|ep| Some(*ep) != ordered.first());
        let (healthy, failed): (Vec<&Endpoint>, Vec<&Endpoint>) =
            rest.partition(|ep| !quarantine.contains(*ep));
        ordered.extend(healthy.into_iter().cloned());
        ordered.extend(failed.into_iter().cloned());
        ordered
    }

    fn accept(&self, endpoint: &Endpoint, client: Arc<dyn DiscoveryHttpClient>) {
        self.quarantine.lock().remove(endpoint);
        let mut sticky = self.sticky.lock();
        // Checked under the lock so shutdown() always sees what is installed
        if self.shut_down.load(Ordering::SeqCst) {
            drop(sticky);
            client.shutdown();
            return;
        }
        if let Some(current) = sticky.as_ref().filter(|s| &s.endpoint == endpoint) {
            let reused = same_client(&current.client, &client);
            drop(sticky);
            if !reused {
                client.shutdown();
            }
            return;
        }
        let previous = sticky.replace(Sticky {
            endpoint: endpoint.clone(),
            client,
        });
        drop(sticky);
        if let Some(previous) = previous {
            previous.client.shutdown();
        }
    }

    fn reject(&self, endpoint: &Endpoint, client: Arc<dyn DiscoveryHttpClient>) {
        self.quarantine.lock().insert(endpoint.clone());
        let previous = {
            let mut sticky = self.sticky.lock();
            if sticky.as_ref().is_some_and(|s| &s.endpoint == endpoint) {
                sticky.take()
            } else {
                None
            }
        };
        if let Some(previous) = previous.filter(|p| !same_client(&p.client, &client)) {
            previous.client.shutdown();
        }
        client.shutdown();
    }

    /// Release a client that answered with a fatal status, unless it is sticky
    fn release(&self, endpoint: &Endpoint, client: Arc<dyn DiscoveryHttpClient>) {
        let is_sticky = self
            .sticky
            .lock()
            .as_ref()
            .is_some_and(|s| &s.endpoint == endpoint);
        if !is_sticky {
            client.shutdown();
        }
    }
}

#[async_trait]
impl DiscoveryHttpClient for RetryableClient {
    async fn execute(&self, request: &DiscoveryRequest) -> Result<DiscoveryResponse> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(DiscoveryError::Shutdown);
        }
        let kind = request.kind();

        let snapshot = match self.resolver.resolve().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(client = %self.name, error = %e, "Endpoint resolution failed");
                return Err(DiscoveryError::NoAvailableEndpoints);
            }
        };
        if snapshot.is_empty() {
            warn!(client = %self.name, request = kind.as_str(), "No endpoints to try");
            return Err(DiscoveryError::NoAvailableEndpoints);
        }

        let sticky = self.sticky.lock().clone();
        let candidates = self.order_candidates(&snapshot.endpoints, sticky.as_ref().map(|s| &s.endpoint));
        let mut last_error = DiscoveryError::NoAvailableEndpoints;

        for (attempt, endpoint) in candidates.iter().enumerate() {
            if attempt > 0 {
                metrics::record_retry(kind.as_str());
            }

            let client = match &sticky {
                Some(s) if &s.endpoint == endpoint => s.client.clone(),
                _ => match self.factory.new_client(endpoint) {
                    Ok(client) => client,
                    Err(e) => {
                        warn!(client = %self.name, endpoint = %endpoint.address(), error = %e, "Cannot create client");
                        self.quarantine.lock().insert(endpoint.clone());
                        last_error = e;
                        continue;
                    }
                },
            };

            debug!(
                client = %self.name,
                request = kind.as_str(),
                endpoint = %endpoint.address(),
                attempt,
                "Attempting request"
            );

            match client.execute(request).await {
                Ok(response) => match self.evaluator.evaluate(kind, response.status) {
                    StatusVerdict::Accept => {
                        self.accept(endpoint, client);
                        return Ok(response);
                    }
                    StatusVerdict::Fatal => {
                        self.release(endpoint, client);
                        return Err(DiscoveryError::NonRetryableClientError {
                            status: response.status,
                            endpoint: endpoint.address(),
                        });
                    }
                    StatusVerdict::Retry => {
                        warn!(
                            client = %self.name,
                            request = kind.as_str(),
                            endpoint = %endpoint.address(),
                            status = response.status,
                            "Retryable response, trying next endpoint"
                        );
                        last_error = DiscoveryError::RetryableServerError {
                            status: response.status,
                            endpoint: endpoint.address(),
                        };
                    }
                },
                Err(e) => {
                    warn!(
                        client = %self.name,
                        request = kind.as_str(),
                        endpoint = %endpoint.address(),
                        error = %e,
                        "Request failed, trying next endpoint"
                    );
                    last_error = e;
                }
            }
            self.reject(endpoint, client);
        }

        metrics::record_exhausted(kind.as_str(), candidates.len());
        Err(DiscoveryError::AllEndpointsExhausted {
            attempts: candidates.len(),
            last: Box::new(last_error),
        })
    }

    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(sticky) = self.sticky.lock().take() {
            sticky.client.shutdown();
        }
    }
}

/// Builds a fresh [`RetryableClient`] per session
pub struct RetryableFactory {
    name: String,
    resolver: Arc<dyn ClusterResolver>,
    delegate: Arc<dyn TransportClientFactory>,
    evaluator: Arc<dyn ServerStatusEvaluator>,
    quarantine_ratio: f64,
}

impl RetryableFactory {
    pub fn new(
        name: impl Into<String>,
        resolver: Arc<dyn ClusterResolver>,
        delegate: Arc<dyn TransportClientFactory>,
        evaluator: Arc<dyn ServerStatusEvaluator>,
    ) -> Self {
        Self {
            name: name.into(),
            resolver,
            delegate,
            evaluator,
            quarantine_ratio: DEFAULT_QUARANTINE_RATIO,
        }
    }

    pub fn with_quarantine_ratio(mut self, ratio: f64) -> Self {
        self.quarantine_ratio = ratio;
        self
    }
}

impl ClientFactory for RetryableFactory {
    fn new_client(&self) -> Result<Arc<dyn DiscoveryHttpClient>> {
        Ok(Arc::new(
            RetryableClient::new(
                self.name.clone(),
                self.resolver.clone(),
                self.delegate.clone(),
                self.evaluator.clone(),
            )
            .with_quarantine_ratio(self.quarantine_ratio),
        ))
    }

    fn shutdown(&self) {
        self.delegate.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{endpoint, FixedResolver, Reply, ScriptedTransport};
    use crate::transport::{HttpSuccessEvaluator, LegacyEvaluator, RequestKind};

    /// Marks every response retryable
    struct AlwaysRetry;

    impl ServerStatusEvaluator for AlwaysRetry {
        fn evaluate(&self, _kind: RequestKind, _status: u16) -> StatusVerdict {
            StatusVerdict::Retry
        }

        fn name(&self) -> &'static str {
            "always_retry"
        }
    }

    fn client_for(
        resolver: Arc<FixedResolver>,
        transport: Arc<ScriptedTransport>,
        evaluator: Arc<dyn ServerStatusEvaluator>,
    ) -> RetryableClient {
        RetryableClient::new("test", resolver, transport, evaluator)
    }

    #[tokio::test]
    async fn test_fails_over_to_second_endpoint() {
        let (s1, s2, s3) = (endpoint("s1", "z1"), endpoint("s2", "z1"), endpoint("s3", "z1"));
        let resolver = FixedResolver::new(vec![s1.clone(), s2.clone(), s3.clone()]);
        let transport = ScriptedTransport::new();
        transport.script(&s1, vec![Reply::Status(503)]);
        transport.script(&s2, vec![Reply::Status(200)]);

        let client = client_for(resolver, transport.clone(), Arc::new(HttpSuccessEvaluator));
        let response = client.get_applications().await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(transport.call_log(), vec![s1.address(), s2.address()]);
        assert_eq!(client.sticky_endpoint(), Some(s2));
    }

    #[tokio::test]
    async fn test_empty_candidates_fail_without_attempts() {
        let resolver = FixedResolver::new(vec![]);
        let transport = ScriptedTransport::new();

        let client = client_for(resolver, transport.clone(), Arc::new(LegacyEvaluator));
        let err = client.get_applications().await.unwrap_err();

        assert!(matches!(err, DiscoveryError::NoAvailableEndpoints));
        assert!(transport.call_log().is_empty());
        assert_eq!(transport.clients_created(), 0);
    }

    #[tokio::test]
    async fn test_attempts_each_candidate_exactly_once() {
        for n in 1..=5 {
            let endpoints: Vec<Endpoint> = (0..n).map(|i| endpoint(&format!("s{}", i), "z1")).collect();
            let resolver = FixedResolver::new(endpoints.clone());
            let transport = ScriptedTransport::new();
            for ep in &endpoints {
                transport.script(ep, vec![Reply::Status(200)]);
            }

            let client = client_for(resolver, transport.clone(), Arc::new(AlwaysRetry));
            let err = client.get_applications().await.unwrap_err();

            match err {
                DiscoveryError::AllEndpointsExhausted { attempts, last } => {
                    assert_eq!(attempts, n);
                    assert!(matches!(*last, DiscoveryError::RetryableServerError { status: 200, .. }));
                }
                other => panic!("unexpected error {:?}", other),
            }
            assert_eq!(transport.call_log().len(), n);
        }
    }

    #[tokio::test]
    async fn test_duplicate_candidates_are_tried_once() {
        let s1 = endpoint("s1", "z1");
        let resolver = FixedResolver::new(vec![s1.clone(), s1.clone()]);
        let transport = ScriptedTransport::new();
        transport.script(&s1, vec![Reply::Fail]);

        let client = client_for(resolver, transport.clone(), Arc::new(LegacyEvaluator));
        let err = client.get_applications().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::AllEndpointsExhausted { attempts: 1, .. }));
        assert_eq!(transport.calls_to(&s1), 1);
    }

    #[tokio::test]
    async fn test_sticky_endpoint_goes_first() {
        let (s1, s2, s3) = (endpoint("s1", "z1"), endpoint("s2", "z1"), endpoint("s3", "z1"));
        let resolver = FixedResolver::new(vec![s1.clone(), s2.clone(), s3.clone()]);
        let transport = ScriptedTransport::new();
        transport.script(&s1, vec![Reply::Fail, Reply::Status(200)]);
        transport.script(&s2, vec![Reply::Status(200)]);

        let client = client_for(resolver.clone(), transport.clone(), Arc::new(LegacyEvaluator));
        client.get_applications().await.unwrap();
        assert_eq!(client.sticky_endpoint(), Some(s2.clone()));

        // s2 is now first even though the resolver lists it second
        resolver.set(vec![s3.clone(), s1.clone(), s2.clone()]);
        client.get_applications().await.unwrap();
        assert_eq!(transport.call_log().last(), Some(&s2.address()));
        assert_eq!(transport.calls_to(&s3), 0);
        // The sticky client is reused instead of rebuilt
        assert_eq!(transport.clients_created_for(&s2), 1);
    }

    #[tokio::test]
    async fn test_sticky_dropped_when_no_longer_candidate() {
        let (s1, s2) = (endpoint("s1", "z1"), endpoint("s2", "z1"));
        let resolver = FixedResolver::new(vec![s1.clone()]);
        let transport = ScriptedTransport::new();
        transport.script(&s1, vec![Reply::Status(200)]);
        transport.script(&s2, vec![Reply::Status(200)]);

        let client = client_for(resolver.clone(), transport.clone(), Arc::new(LegacyEvaluator));
        client.get_applications().await.unwrap();

        resolver.set(vec![s2.clone()]);
        client.get_applications().await.unwrap();
        assert_eq!(client.sticky_endpoint(), Some(s2));
        assert_eq!(transport.shutdowns_for(&s1), 1);
    }

    #[tokio::test]
    async fn test_fatal_status_stops_immediately() {
        let (s1, s2) = (endpoint("s1", "z1"), endpoint("s2", "z1"));
        let resolver = FixedResolver::new(vec![s1.clone(), s2.clone()]);
        let transport = ScriptedTransport::new();
        transport.script(&s1, vec![Reply::Status(400)]);

        let client = client_for(resolver, transport.clone(), Arc::new(HttpSuccessEvaluator));
        let err = client.get_applications().await.unwrap_err();

        assert!(matches!(err, DiscoveryError::NonRetryableClientError { status: 400, .. }));
        assert_eq!(transport.calls_to(&s2), 0);
        assert!(client.sticky_endpoint().is_none());
    }

    #[tokio::test]
    async fn test_failed_endpoint_tried_last_next_time() {
        let (s1, s2, s3) = (endpoint("s1", "z1"), endpoint("s2", "z1"), endpoint("s3", "z1"));
        let resolver = FixedResolver::new(vec![s1.clone(), s2.clone(), s3.clone()]);
        let transport = ScriptedTransport::new();
        transport.script(&s1, vec![Reply::Fail]);
        transport.script(&s2, vec![Reply::Status(200), Reply::Fail]);
        transport.script(&s3, vec![Reply::Status(200)]);

        let client = client_for(resolver, transport.clone(), Arc::new(LegacyEvaluator));
        client.get_applications().await.unwrap();
        assert_eq!(client.quarantined(), vec![s1.clone()]);

        // s2 (sticky) fails, then s3 is preferred over the quarantined s1
        client.get_applications().await.unwrap();
        assert_eq!(
            transport.call_log(),
            vec![s1.address(), s2.address(), s2.address(), s3.address()]
        );
    }

    #[tokio::test]
    async fn test_quarantine_clears_when_too_large() {
        let (s1, s2) = (endpoint("s1", "z1"), endpoint("s2", "z1"));
        let resolver = FixedResolver::new(vec![s1.clone(), s2.clone()]);
        let transport = ScriptedTransport::new();
        transport.script(&s1, vec![Reply::Fail, Reply::Status(200)]);
        transport.script(&s2, vec![Reply::Fail]);

        let client = client_for(resolver, transport.clone(), Arc::new(LegacyEvaluator));
        assert!(client.get_applications().await.is_err());
        assert_eq!(client.quarantined().len(), 2);

        // Both quarantined: the quarantine resets and resolver order applies again
        client.get_applications().await.unwrap();
        assert_eq!(client.sticky_endpoint(), Some(s1));
        assert!(client.quarantined().is_empty());
    }

    #[tokio::test]
    async fn test_resolution_error_means_no_endpoints() {
        let resolver = FixedResolver::new(vec![endpoint("s1", "z1")]);
        resolver.set_failing(true);
        let transport = ScriptedTransport::new();

        let client = client_for(resolver, transport.clone(), Arc::new(LegacyEvaluator));
        assert!(matches!(
            client.get_applications().await,
            Err(DiscoveryError::NoAvailableEndpoints)
        ));
        assert!(transport.call_log().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_calls() {
        let s1 = endpoint("s1", "z1");
        let resolver = FixedResolver::new(vec![s1.clone()]);
        let transport = ScriptedTransport::new();
        transport.script(&s1, vec![Reply::Status(200)]);

        let client = client_for(resolver, transport.clone(), Arc::new(LegacyEvaluator));
        client.get_applications().await.unwrap();
        client.shutdown();
        client.shutdown();

        assert!(matches!(client.get_applications().await, Err(DiscoveryError::Shutdown)));
        assert_eq!(transport.shutdowns_for(&s1), 1);
    }

    #[tokio::test]
    async fn test_renew_fails_over_on_server_error() {
        let (s1, s2) = (endpoint("s1", "z1"), endpoint("s2", "z1"));
        let resolver = FixedResolver::new(vec![s1.clone(), s2.clone()]);
        let transport = ScriptedTransport::new();
        transport.script(&s1, vec![Reply::Status(503)]);
        transport.script(&s2, vec![Reply::Status(200)]);

        let client = client_for(resolver, transport.clone(), Arc::new(LegacyEvaluator));
        let response = client.renew("BILLING", "b-1", None).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(transport.call_log(), vec![s1.address(), s2.address()]);
        assert_eq!(client.sticky_endpoint(), Some(s2));
    }

    #[tokio::test]
    async fn test_renew_unknown_lease_is_final() {
        let (s1, s2) = (endpoint("s1", "z1"), endpoint("s2", "z1"));
        let resolver = FixedResolver::new(vec![s1.clone(), s2.clone()]);
        let transport = ScriptedTransport::new();
        transport.script(&s1, vec![Reply::Status(404)]);

        let client = client_for(resolver, transport.clone(), Arc::new(LegacyEvaluator));
        let response = client.renew("BILLING", "b-1", None).await.unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(transport.calls_to(&s2), 0);
    }

    #[test]
    fn test_accept_on_same_sticky_releases_duplicate_client() {
        let s1 = endpoint("s1", "z1");
        let transport = ScriptedTransport::new();
        let client = client_for(FixedResolver::new(vec![s1.clone()]), transport.clone(), Arc::new(LegacyEvaluator));

        let first = transport.new_client(&s1).unwrap();
        client.accept(&s1, first.clone());
        client.accept(&s1, first);
        assert_eq!(transport.shutdowns_for(&s1), 0);

        // A second caller built its own client for the same endpoint
        client.accept(&s1, transport.new_client(&s1).unwrap());
        assert_eq!(transport.shutdowns_for(&s1), 1);
        assert_eq!(client.sticky_endpoint(), Some(s1));
    }

    #[test]
    fn test_reject_releases_replaced_sticky_client() {
        let s1 = endpoint("s1", "z1");
        let transport = ScriptedTransport::new();
        let client = client_for(FixedResolver::new(vec![s1.clone()]), transport.clone(), Arc::new(LegacyEvaluator));

        client.accept(&s1, transport.new_client(&s1).unwrap());
        client.reject(&s1, transport.new_client(&s1).unwrap());

        assert_eq!(transport.shutdowns_for(&s1), 2);
        assert!(client.sticky_endpoint().is_none());
    }

    #[test]
    fn test_accept_after_shutdown_does_not_install_sticky() {
        let s1 = endpoint("s1", "z1");
        let transport = ScriptedTransport::new();
        let client = client_for(FixedResolver::new(vec![s1.clone()]), transport.clone(), Arc::new(LegacyEvaluator));
        client.shutdown();

        client.accept(&s1, transport.new_client(&s1).unwrap());

        assert!(client.sticky_endpoint().is_none());
        assert_eq!(transport.shutdowns_for(&s1), 1);
    }
}
