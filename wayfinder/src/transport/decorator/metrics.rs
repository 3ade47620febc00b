//! Pass-through decorator recording latency and outcome of every wire call

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::metrics::RequestTimer;
use crate::transport::{DiscoveryHttpClient, DiscoveryRequest, DiscoveryResponse, TransportClientFactory};
use async_trait::async_trait;
use std::sync::Arc;

pub struct MetricsCollectingClient {
    delegate: Arc<dyn DiscoveryHttpClient>,
    endpoint: String,
}

impl MetricsCollectingClient {
    pub fn new(delegate: Arc<dyn DiscoveryHttpClient>, endpoint: &Endpoint) -> Self {
        Self {
            delegate,
            endpoint: endpoint.address(),
        }
    }
}

#[async_trait]
impl DiscoveryHttpClient for MetricsCollectingClient {
    async fn execute(&self, request: &DiscoveryRequest) -> Result<DiscoveryResponse> {
        let timer = RequestTimer::new(request.kind().as_str(), &self.endpoint);
        match self.delegate.execute(request).await {
            Ok(response) => {
                timer.status(response.status);
                Ok(response)
            }
            Err(e) => {
                timer.error(e.error_type());
                Err(e)
            }
        }
    }

    fn shutdown(&self) {
        self.delegate.shutdown();
    }
}

/// Wraps every client of the inner factory in a [`MetricsCollectingClient`]
pub struct MetricsCollectingFactory {
    delegate: Arc<dyn TransportClientFactory>,
}

impl MetricsCollectingFactory {
    pub fn new(delegate: Arc<dyn TransportClientFactory>) -> Self {
        Self { delegate }
    }
}

impl TransportClientFactory for MetricsCollectingFactory {
    fn new_client(&self, endpoint: &Endpoint) -> Result<Arc<dyn DiscoveryHttpClient>> {
        let delegate = self.delegate.new_client(endpoint)?;
        Ok(Arc::new(MetricsCollectingClient::new(delegate, endpoint)))
    }

    fn shutdown(&self) {
        self.delegate.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiscoveryError;
    use crate::testing::{endpoint, Reply, ScriptedTransport};

    #[tokio::test]
    async fn test_passes_responses_and_errors_through() {
        let transport = ScriptedTransport::new();
        let ep = endpoint("a", "z1");
        transport.script(&ep, vec![Reply::Status(200), Reply::Fail]);
        let factory = MetricsCollectingFactory::new(transport.clone());

        let client = factory.new_client(&ep).unwrap();
        assert_eq!(client.get_applications().await.unwrap().status, 200);
        assert!(matches!(
            client.get_applications().await,
            Err(DiscoveryError::Transport(_))
        ));
        assert_eq!(transport.calls_to(&ep), 2);
    }
}
