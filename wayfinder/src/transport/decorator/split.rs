//! Routing facade separating registration traffic from query traffic

use crate::error::Result;
use crate::transport::{DiscoveryHttpClient, DiscoveryRequest, DiscoveryResponse};
use async_trait::async_trait;
use std::sync::Arc;

/// Sends registration-family operations to one pipeline and queries to another.
/// Holds no retry or session state of its own.
pub struct SplitClient {
    registration: Arc<dyn DiscoveryHttpClient>,
    query: Arc<dyn DiscoveryHttpClient>,
}

impl SplitClient {
    pub fn new(registration: Arc<dyn DiscoveryHttpClient>, query: Arc<dyn DiscoveryHttpClient>) -> Self {
        Self { registration, query }
    }
}

#[async_trait]
impl DiscoveryHttpClient for SplitClient {
    async fn execute(&self, request: &DiscoveryRequest) -> Result<DiscoveryResponse> {
        if request.kind().is_registration() {
            self.registration.execute(request).await
        } else {
            self.query.execute(request).await
        }
    }

    fn shutdown(&self) {
        self.registration.shutdown();
        self.query.shutdown();
    }
}
