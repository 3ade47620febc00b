//! JSON-over-HTTP wire client
//!
//! Thin reqwest transport speaking the discovery REST dialect. Automatic
//! redirect following is disabled so that 3xx answers reach the
//! [`RedirectingClient`](super::RedirectingClient).

use super::{
    DiscoveryHttpClient, DiscoveryRequest, DiscoveryResponse, ResponseBody, TransportClientFactory,
};
use crate::config::ClientConfig;
use crate::endpoint::Endpoint;
use crate::error::{DiscoveryError, Result};
use crate::model::{Application, Applications, InstanceInfo};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, LOCATION};
use reqwest::{redirect, Client, Url};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Serialize, Deserialize)]
pub(crate) struct InstanceEnvelope {
    pub instance: InstanceInfo,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct ApplicationEnvelope {
    pub application: Application,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct ApplicationsEnvelope {
    pub applications: Applications,
}

/// Factory sharing one connection pool across endpoints
pub struct HttpTransportFactory {
    client: Client,
    shut_down: AtomicBool,
}

impl HttpTransportFactory {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            shut_down: AtomicBool::new(false),
        })
    }
}

impl TransportClientFactory for HttpTransportFactory {
    fn new_client(&self, endpoint: &Endpoint) -> Result<Arc<dyn DiscoveryHttpClient>> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(DiscoveryError::Shutdown);
        }
        Ok(Arc::new(HttpTransport::new(self.client.clone(), endpoint)?))
    }

    fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::SeqCst) {
            info!("HTTP transport factory shut down");
        }
    }
}

/// Wire client bound to a single endpoint
pub struct HttpTransport {
    client: Client,
    base: Url,
    endpoint: Endpoint,
}

impl HttpTransport {
    pub fn new(client: Client, endpoint: &Endpoint) -> Result<Self> {
        let base = Url::parse(endpoint.service_url())
            .map_err(|e| DiscoveryError::Config(format!("Invalid service URL '{}': {}", endpoint.service_url(), e)))?;
        Ok(Self {
            client,
            base,
            endpoint: endpoint.clone(),
        })
    }

    fn url_for(&self, request: &DiscoveryRequest) -> Result<Url> {
        let mut url = self
            .base
            .join(&request.path())
            .map_err(|e| DiscoveryError::Transport(format!("Invalid request path: {}", e)))?;
        match request {
            DiscoveryRequest::Renew {
                status: Some(status),
                ..
            } => {
                url.query_pairs_mut().append_pair("status", status.as_str());
            }
            DiscoveryRequest::StatusUpdate { status, .. } => {
                url.query_pairs_mut().append_pair("value", status.as_str());
            }
            _ => {}
        }
        Ok(url)
    }

    fn decode(request: &DiscoveryRequest, bytes: &[u8]) -> Result<Option<ResponseBody>> {
        if bytes.is_empty() {
            return Ok(None);
        }
        let body = match request {
            DiscoveryRequest::GetApplications | DiscoveryRequest::GetDelta => {
                let envelope: ApplicationsEnvelope = serde_json::from_slice(bytes)?;
                Some(ResponseBody::Applications(envelope.applications))
            }
            DiscoveryRequest::GetApplication(_) => {
                let envelope: ApplicationEnvelope = serde_json::from_slice(bytes)?;
                Some(ResponseBody::Application(envelope.application))
            }
            DiscoveryRequest::GetInstance(_) => {
                let envelope: InstanceEnvelope = serde_json::from_slice(bytes)?;
                Some(ResponseBody::Instance(envelope.instance))
            }
            _ => None,
        };
        Ok(body)
    }
}

#[async_trait]
impl DiscoveryHttpClient for HttpTransport {
    async fn execute(&self, request: &DiscoveryRequest) -> Result<DiscoveryResponse> {
        let url = self.url_for(request)?;
        let builder = match request {
            DiscoveryRequest::Register(instance) => self.client.post(url).json(&InstanceEnvelope {
                instance: instance.clone(),
            }),
            DiscoveryRequest::Renew { .. } | DiscoveryRequest::StatusUpdate { .. } => self.client.put(url),
            DiscoveryRequest::Cancel { .. } | DiscoveryRequest::DeleteStatusOverride { .. } => {
                self.client.delete(url)
            }
            DiscoveryRequest::GetApplications
            | DiscoveryRequest::GetDelta
            | DiscoveryRequest::GetApplication(_)
            | DiscoveryRequest::GetInstance(_) => self.client.get(url),
        };

        let response = builder.header(ACCEPT, "application/json").send().await?;
        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = if response.status().is_success() {
            let bytes = response.bytes().await?;
            Self::decode(request, &bytes)?
        } else {
            None
        };

        debug!(
            endpoint = %self.endpoint.address(),
            request = request.kind().as_str(),
            status,
            "Discovery request completed"
        );

        Ok(DiscoveryResponse {
            status,
            body,
            location,
        })
    }

    fn shutdown(&self) {
        debug!(endpoint = %self.endpoint.address(), "Closing transport");
    }
}
