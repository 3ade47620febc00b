//! Periodic delegate rotation
//!
//! Recreates the delegate client once its session expires so connections
//! drift away from any single server over time, even a healthy one. The
//! expiry check happens when a request is dispatched; there is no timer.
//! Each session length is the reconnect interval shifted by random jitter so
//! that many clients started together do not rotate together.
//!
//! A rotated-out delegate is shut down once the last request still running
//! on it finishes. Callers that picked it up just before rotation are not
//! affected.

use crate::error::{DiscoveryError, Result};
use crate::metrics;
use crate::transport::{ClientFactory, DiscoveryHttpClient, DiscoveryRequest, DiscoveryResponse};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

struct Session {
    client: Arc<dyn DiscoveryHttpClient>,
    created_at: Instant,
    duration: Duration,
    in_flight: AtomicUsize,
    retired: AtomicBool,
    closed: AtomicBool,
}

impl Session {
    fn new(client: Arc<dyn DiscoveryHttpClient>, duration: Duration) -> Self {
        Self {
            client,
            created_at: Instant::now(),
            duration,
            in_flight: AtomicUsize::new(0),
            retired: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.duration
    }

    /// Register a request on this session; `None` once it is retired
    fn enter(self: &Arc<Self>) -> Option<InFlight> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight(self.clone());
        if self.retired.load(Ordering::SeqCst) {
            return None;
        }
        Some(guard)
    }

    /// Take the session out of service; closes now if idle
    fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
        if self.in_flight.load(Ordering::SeqCst) == 0 {
            self.close();
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.client.shutdown();
        }
    }
}

/// Request in progress on a session; the last one out closes a retired session
struct InFlight(Arc<Session>);

impl Drop for InFlight {
    fn drop(&mut self) {
        let session = &self.0;
        if session.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 && session.retired.load(Ordering::SeqCst) {
            session.close();
        }
    }
}

pub struct SessionedClient {
    name: String,
    factory: Arc<dyn ClientFactory>,
    reconnect_interval: Duration,
    jitter_ratio: f64,
    session: ArcSwapOption<Session>,
    /// Serializes rotation; readers never take it on the fast path
    rotation: Mutex<()>,
    shut_down: AtomicBool,
}

impl SessionedClient {
    pub fn new(name: impl Into<String>, factory: Arc<dyn ClientFactory>, reconnect_interval: Duration) -> Self {
        Self {
            name: name.into(),
            factory,
            reconnect_interval,
            jitter_ratio: 0.5,
            session: ArcSwapOption::empty(),
            rotation: Mutex::new(()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = if ratio.is_finite() { ratio.clamp(0.0, 0.99) } else { 0.0 };
        self
    }

    /// Length of the next session: interval +/- up to `jitter_ratio` of it
    fn next_session_duration(&self) -> Duration {
        let base = self.reconnect_interval.as_secs_f64();
        if self.jitter_ratio == 0.0 {
            return self.reconnect_interval;
        }
        let offset = rand::thread_rng().gen_range(-self.jitter_ratio..=self.jitter_ratio);
        Duration::from_secs_f64((base * (1.0 + offset)).max(0.001))
    }

    /// Session for the next request, rotating it first if it expired
    fn current(&self) -> Result<Arc<Session>> {
        if let Some(session) = self.session.load_full() {
            if !session.is_expired() {
                return Ok(session);
            }
        }

        let _guard = self.rotation.lock();
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(DiscoveryError::Shutdown);
        }
        if let Some(session) = self.session.load_full() {
            if !session.is_expired() {
                return Ok(session);
            }
        }

        let session = Arc::new(Session::new(self.factory.new_client()?, self.next_session_duration()));
        debug!(client = %self.name, duration_secs = session.duration.as_secs(), "Starting new session");

        if let Some(previous) = self.session.swap(Some(session.clone())) {
            info!(
                client = %self.name,
                age_secs = previous.created_at.elapsed().as_secs(),
                "Session expired, rotated delegate client"
            );
            metrics::record_session_rotation(&self.name);
            previous.retire();
        }
        Ok(session)
    }

    /// Enter the current session, skipping one retired under our feet
    fn enter(&self) -> Result<InFlight> {
        loop {
            if self.shut_down.load(Ordering::SeqCst) {
                return Err(DiscoveryError::Shutdown);
            }
            if let Some(guard) = self.current()?.enter() {
                return Ok(guard);
            }
        }
    }
}

#[async_trait]
impl DiscoveryHttpClient for SessionedClient {
    async fn execute(&self, request: &DiscoveryRequest) -> Result<DiscoveryResponse> {
        let guard = self.enter()?;
        guard.0.client.execute(request).await
    }

    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let _guard = self.rotation.lock();
        if let Some(session) = self.session.swap(None) {
            session.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingClientFactory;

    /// Clients that take `delay` per request and count shutdowns
    struct SlowClientFactory {
        delay: Duration,
        created: AtomicUsize,
        shutdowns: Arc<AtomicUsize>,
    }

    struct SlowClient {
        delay: Duration,
        shutdowns: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DiscoveryHttpClient for SlowClient {
        async fn execute(&self, _request: &DiscoveryRequest) -> Result<DiscoveryResponse> {
            tokio::time::sleep(self.delay).await;
            Ok(DiscoveryResponse::status(200))
        }

        fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl ClientFactory for SlowClientFactory {
        fn new_client(&self) -> Result<Arc<dyn DiscoveryHttpClient>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(SlowClient {
                delay: self.delay,
                shutdowns: self.shutdowns.clone(),
            }))
        }

        fn shutdown(&self) {}
    }

    #[tokio::test]
    async fn test_reuses_delegate_within_session() {
        let factory = CountingClientFactory::new();
        let client = SessionedClient::new("query", factory.clone(), Duration::from_secs(3600));

        for _ in 0..5 {
            client.get_applications().await.unwrap();
        }
        assert_eq!(factory.created(), 1);
        assert_eq!(factory.requests(), 5);
    }

    #[tokio::test]
    async fn test_rotates_after_interval() {
        let factory = CountingClientFactory::new();
        let client = SessionedClient::new("query", factory.clone(), Duration::from_millis(20))
            .with_jitter_ratio(0.0);

        client.get_applications().await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        client.get_applications().await.unwrap();

        assert_eq!(factory.created(), 2);
        assert_eq!(factory.shutdowns(), 1);
    }

    #[test]
    fn test_jitter_bounds() {
        let factory = CountingClientFactory::new();
        let client = SessionedClient::new("query", factory, Duration::from_secs(1000))
            .with_jitter_ratio(0.5);
        for _ in 0..200 {
            let d = client.next_session_duration();
            assert!(d >= Duration::from_secs(500) && d <= Duration::from_secs(1500));
        }
    }

    #[tokio::test]
    async fn test_shutdown_closes_delegate_once() {
        let factory = CountingClientFactory::new();
        let client = SessionedClient::new("registration", factory.clone(), Duration::from_secs(60));
        client.get_applications().await.unwrap();

        client.shutdown();
        client.shutdown();

        assert_eq!(factory.shutdowns(), 1);
        assert!(matches!(client.get_applications().await, Err(DiscoveryError::Shutdown)));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_session() {
        let factory = CountingClientFactory::new();
        let client = Arc::new(SessionedClient::new("query", factory.clone(), Duration::from_secs(60)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.get_applications().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(factory.created(), 1);
    }

    #[tokio::test]
    async fn test_rotation_waits_for_in_flight_request() {
        let factory = Arc::new(SlowClientFactory {
            delay: Duration::from_millis(100),
            created: AtomicUsize::new(0),
            shutdowns: Arc::new(AtomicUsize::new(0)),
        });
        let client = Arc::new(
            SessionedClient::new("registration", factory.clone(), Duration::from_millis(20))
                .with_jitter_ratio(0.0),
        );

        let first = {
            let client = client.clone();
            tokio::spawn(async move { client.renew("BILLING", "b-1", None).await })
        };
        tokio::time::sleep(Duration::from_millis(40)).await;
        let second = {
            let client = client.clone();
            tokio::spawn(async move { client.renew("BILLING", "b-1", None).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Rotated, but the old delegate still serves the first request
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
        assert_eq!(factory.shutdowns.load(Ordering::SeqCst), 0);

        assert_eq!(first.await.unwrap().unwrap().status, 200);
        assert_eq!(factory.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(second.await.unwrap().unwrap().status, 200);
    }

    #[test]
    fn test_non_finite_jitter_disables_jitter() {
        let factory = CountingClientFactory::new();
        let client = SessionedClient::new("query", factory, Duration::from_secs(10)).with_jitter_ratio(f64::NAN);
        assert_eq!(client.next_session_duration(), Duration::from_secs(10));
    }
}
