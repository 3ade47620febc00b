//! Scripted collaborators shared by unit tests

use crate::endpoint::{Endpoint, EndpointRole, ResolutionSnapshot};
use crate::error::{DiscoveryError, Result};
use crate::resolver::ClusterResolver;
use crate::transport::{
    ClientFactory, DiscoveryHttpClient, DiscoveryRequest, DiscoveryResponse, ResponseBody,
    TransportClientFactory,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Query endpoint `http://{name}:8080/eureka/v2/`
pub fn endpoint(name: &str, zone: &str) -> Endpoint {
    Endpoint::from_url(&format!("http://{}:8080/eureka/v2/", name), zone, EndpointRole::Query)
        .expect("valid test endpoint")
}

/// One scripted answer of a fake server
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16),
    Body(u16, ResponseBody),
    Redirect(u16, String),
    /// Transport failure (connection refused)
    Fail,
}

#[derive(Default)]
struct ScriptState {
    scripts: HashMap<String, VecDeque<Reply>>,
    calls: Vec<String>,
    created: HashMap<String, usize>,
    shutdowns: HashMap<String, usize>,
}

impl ScriptState {
    fn next_reply(&mut self, address: &str) -> Reply {
        self.calls.push(address.to_string());
        match self.scripts.get_mut(address) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Reply::Fail),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::Fail),
            None => Reply::Fail,
        }
    }
}

/// Transport factory whose clients replay scripted replies per endpoint.
///
/// Replies are consumed in order; the last one repeats. Endpoints without a
/// script fail at the transport level.
#[derive(Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, endpoint: &Endpoint, replies: Vec<Reply>) {
        self.state
            .lock()
            .scripts
            .insert(endpoint.address(), replies.into());
    }

    /// Addresses of every executed request, in order
    pub fn call_log(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn calls_to(&self, endpoint: &Endpoint) -> usize {
        let address = endpoint.address();
        self.state.lock().calls.iter().filter(|a| **a == address).count()
    }

    pub fn clients_created(&self) -> usize {
        self.state.lock().created.values().sum()
    }

    pub fn clients_created_for(&self, endpoint: &Endpoint) -> usize {
        self.state
            .lock()
            .created
            .get(&endpoint.address())
            .copied()
            .unwrap_or(0)
    }

    pub fn shutdowns_for(&self, endpoint: &Endpoint) -> usize {
        self.state
            .lock()
            .shutdowns
            .get(&endpoint.address())
            .copied()
            .unwrap_or(0)
    }
}

impl TransportClientFactory for ScriptedTransport {
    fn new_client(&self, endpoint: &Endpoint) -> Result<Arc<dyn DiscoveryHttpClient>> {
        *self.state.lock().created.entry(endpoint.address()).or_default() += 1;
        Ok(Arc::new(ScriptedClient {
            address: endpoint.address(),
            state: self.state.clone(),
        }))
    }

    fn shutdown(&self) {}
}

struct ScriptedClient {
    address: String,
    state: Arc<Mutex<ScriptState>>,
}

#[async_trait]
impl DiscoveryHttpClient for ScriptedClient {
    async fn execute(&self, _request: &DiscoveryRequest) -> Result<DiscoveryResponse> {
        let reply = self.state.lock().next_reply(&self.address);
        match reply {
            Reply::Status(status) => Ok(DiscoveryResponse::status(status)),
            Reply::Body(status, body) => Ok(DiscoveryResponse::with_body(status, body)),
            Reply::Redirect(status, location) => Ok(DiscoveryResponse::redirect(status, location)),
            Reply::Fail => Err(DiscoveryError::Transport(format!(
                "connection refused: {}",
                self.address
            ))),
        }
    }

    fn shutdown(&self) {
        *self
            .state
            .lock()
            .shutdowns
            .entry(self.address.clone())
            .or_default() += 1;
    }
}

/// Client factory counting created clients, executed requests and shutdowns
#[derive(Default)]
pub struct CountingClientFactory {
    created: AtomicUsize,
    requests: Arc<AtomicUsize>,
    shutdowns: Arc<AtomicUsize>,
}

impl CountingClientFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl ClientFactory for CountingClientFactory {
    fn new_client(&self) -> Result<Arc<dyn DiscoveryHttpClient>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(CountingClient {
            requests: self.requests.clone(),
            shutdowns: self.shutdowns.clone(),
        }))
    }

    fn shutdown(&self) {}
}

struct CountingClient {
    requests: Arc<AtomicUsize>,
    shutdowns: Arc<AtomicUsize>,
}

#[async_trait]
impl DiscoveryHttpClient for CountingClient {
    async fn execute(&self, _request: &DiscoveryRequest) -> Result<DiscoveryResponse> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(DiscoveryResponse::status(200))
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Resolver returning a settable endpoint list
pub struct FixedResolver {
    region: String,
    endpoints: Mutex<Vec<Endpoint>>,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl FixedResolver {
    pub fn new(endpoints: Vec<Endpoint>) -> Arc<Self> {
        Arc::new(Self {
            region: "us-east-1".to_string(),
            endpoints: Mutex::new(endpoints),
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        })
    }

    pub fn set(&self, endpoints: Vec<Endpoint>) {
        *self.endpoints.lock() = endpoints;
    }

    /// Make every resolution fail until switched back
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterResolver for FixedResolver {
    fn region(&self) -> &str {
        &self.region
    }

    async fn resolve(&self) -> Result<ResolutionSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(DiscoveryError::Resolution("scripted failure".into()));
        }
        Ok(ResolutionSnapshot::new(
            self.region.clone(),
            self.endpoints.lock().clone(),
        ))
    }

    fn backend_name(&self) -> &'static str {
        "fixed"
    }
}
