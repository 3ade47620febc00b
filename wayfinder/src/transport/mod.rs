//! Discovery transport: typed operations and the client decorator chain
//!
//! Every layer implements the same capability, [`DiscoveryHttpClient::execute`],
//! so pipelines are plain nesting:
//!
//! ```text
//! SplitClient
//!   ├─ registration: Sessioned(Retryable(Redirecting(Metrics(transport))))
//!   └─ query:        Sessioned(Retryable(Redirecting(Metrics(transport))))
//! ```
//!
//! The wire client itself is produced by a [`TransportClientFactory`] for a
//! given [`Endpoint`]. Layers above the retry loop are endpoint-agnostic and
//! are produced by a [`ClientFactory`].

pub mod decorator;
pub mod evaluator;
pub mod http;

pub use decorator::{
    MetricsCollectingClient, MetricsCollectingFactory, RedirectingClient, RedirectingFactory,
    RetryableClient, RetryableFactory, SessionedClient, SplitClient,
};
pub use evaluator::{HttpSuccessEvaluator, LegacyEvaluator, ServerStatusEvaluator, StatusVerdict};
pub use http::{HttpTransport, HttpTransportFactory};

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::model::{Application, Applications, InstanceInfo, InstanceStatus};
use async_trait::async_trait;
use std::sync::Arc;

/// Operation kind, used for routing, status evaluation and metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Register,
    Renew,
    Cancel,
    StatusUpdate,
    DeleteStatusOverride,
    GetApplications,
    GetDelta,
    GetApplication,
    GetInstance,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Register => "register",
            RequestKind::Renew => "renew",
            RequestKind::Cancel => "cancel",
            RequestKind::StatusUpdate => "status_update",
            RequestKind::DeleteStatusOverride => "delete_status_override",
            RequestKind::GetApplications => "get_applications",
            RequestKind::GetDelta => "get_delta",
            RequestKind::GetApplication => "get_application",
            RequestKind::GetInstance => "get_instance",
        }
    }

    /// Registration-family operations mutate this instance's lease
    pub fn is_registration(&self) -> bool {
        matches!(
            self,
            RequestKind::Register
                | RequestKind::Renew
                | RequestKind::Cancel
                | RequestKind::StatusUpdate
                | RequestKind::DeleteStatusOverride
        )
    }
}

/// A single logical discovery operation
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryRequest {
    Register(InstanceInfo),
    /// Lease renewal (heartbeat)
    Renew {
        app_name: String,
        instance_id: String,
        status: Option<InstanceStatus>,
    },
    Cancel {
        app_name: String,
        instance_id: String,
    },
    StatusUpdate {
        app_name: String,
        instance_id: String,
        status: InstanceStatus,
    },
    DeleteStatusOverride {
        app_name: String,
        instance_id: String,
    },
    GetApplications,
    GetDelta,
    GetApplication(String),
    GetInstance(String),
}

impl DiscoveryRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            DiscoveryRequest::Register(_) => RequestKind::Register,
            DiscoveryRequest::Renew { .. } => RequestKind::Renew,
            DiscoveryRequest::Cancel { .. } => RequestKind::Cancel,
            DiscoveryRequest::StatusUpdate { .. } => RequestKind::StatusUpdate,
            DiscoveryRequest::DeleteStatusOverride { .. } => RequestKind::DeleteStatusOverride,
            DiscoveryRequest::GetApplications => RequestKind::GetApplications,
            DiscoveryRequest::GetDelta => RequestKind::GetDelta,
            DiscoveryRequest::GetApplication(_) => RequestKind::GetApplication,
            DiscoveryRequest::GetInstance(_) => RequestKind::GetInstance,
        }
    }

    /// Request path relative to the endpoint's service URL, without query
    pub fn path(&self) -> String {
        match self {
            DiscoveryRequest::Register(instance) => format!("apps/{}", instance.app),
            DiscoveryRequest::Renew {
                app_name,
                instance_id,
                ..
            }
            | DiscoveryRequest::Cancel {
                app_name,
                instance_id,
            } => format!("apps/{}/{}", app_name, instance_id),
            DiscoveryRequest::StatusUpdate {
                app_name,
                instance_id,
                ..
            }
            | DiscoveryRequest::DeleteStatusOverride {
                app_name,
                instance_id,
            } => format!("apps/{}/{}/status", app_name, instance_id),
            DiscoveryRequest::GetApplications => "apps/".to_string(),
            DiscoveryRequest::GetDelta => "apps/delta".to_string(),
            DiscoveryRequest::GetApplication(app_name) => format!("apps/{}", app_name),
            DiscoveryRequest::GetInstance(id) => format!("instances/{}", id),
        }
    }
}

/// Decoded response payload
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Applications(Applications),
    Application(Application),
    Instance(InstanceInfo),
}

/// Outcome of one wire-level call that reached a server
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryResponse {
    pub status: u16,
    pub body: Option<ResponseBody>,
    /// `Location` header of a redirect response
    pub location: Option<String>,
}

impl DiscoveryResponse {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: None,
            location: None,
        }
    }

    pub fn with_body(status: u16, body: ResponseBody) -> Self {
        Self {
            status,
            body: Some(body),
            location: None,
        }
    }

    pub fn redirect(status: u16, location: impl Into<String>) -> Self {
        Self {
            status,
            body: None,
            location: Some(location.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    pub fn applications(&self) -> Option<&Applications> {
        match &self.body {
            Some(ResponseBody::Applications(apps)) => Some(apps),
            _ => None,
        }
    }

    pub fn application(&self) -> Option<&Application> {
        match &self.body {
            Some(ResponseBody::Application(app)) => Some(app),
            _ => None,
        }
    }

    pub fn instance(&self) -> Option<&InstanceInfo> {
        match &self.body {
            Some(ResponseBody::Instance(instance)) => Some(instance),
            _ => None,
        }
    }
}

/// Uniform capability implemented by the wire client and every decorator
///
/// `Err` is reserved for failures that did not produce a server answer
/// (transport errors) or for a decorator's own terminal errors. Any status
/// code a server returned comes back as `Ok(DiscoveryResponse)`.
#[async_trait]
pub trait DiscoveryHttpClient: Send + Sync {
    async fn execute(&self, request: &DiscoveryRequest) -> Result<DiscoveryResponse>;

    /// Release resources held by this client and its delegates
    fn shutdown(&self);

    async fn register(&self, instance: InstanceInfo) -> Result<DiscoveryResponse> {
        self.execute(&DiscoveryRequest::Register(instance)).await
    }

    async fn renew(
        &self,
        app_name: &str,
        instance_id: &str,
        status: Option<InstanceStatus>,
    ) -> Result<DiscoveryResponse> {
        self.execute(&DiscoveryRequest::Renew {
            app_name: app_name.to_string(),
            instance_id: instance_id.to_string(),
            status,
        })
        .await
    }

    async fn cancel(&self, app_name: &str, instance_id: &str) -> Result<DiscoveryResponse> {
        self.execute(&DiscoveryRequest::Cancel {
            app_name: app_name.to_string(),
            instance_id: instance_id.to_string(),
        })
        .await
    }

    async fn status_update(
        &self,
        app_name: &str,
        instance_id: &str,
        status: InstanceStatus,
    ) -> Result<DiscoveryResponse> {
        self.execute(&DiscoveryRequest::StatusUpdate {
            app_name: app_name.to_string(),
            instance_id: instance_id.to_string(),
            status,
        })
        .await
    }

    async fn delete_status_override(&self, app_name: &str, instance_id: &str) -> Result<DiscoveryResponse> {
        self.execute(&DiscoveryRequest::DeleteStatusOverride {
            app_name: app_name.to_string(),
            instance_id: instance_id.to_string(),
        })
        .await
    }

    async fn get_applications(&self) -> Result<DiscoveryResponse> {
        self.execute(&DiscoveryRequest::GetApplications).await
    }

    async fn get_delta(&self) -> Result<DiscoveryResponse> {
        self.execute(&DiscoveryRequest::GetDelta).await
    }

    async fn get_application(&self, app_name: &str) -> Result<DiscoveryResponse> {
        self.execute(&DiscoveryRequest::GetApplication(app_name.to_string()))
            .await
    }

    async fn get_instance(&self, instance_id: &str) -> Result<DiscoveryResponse> {
        self.execute(&DiscoveryRequest::GetInstance(instance_id.to_string()))
            .await
    }
}

/// Produces wire-level clients bound to one endpoint
pub trait TransportClientFactory: Send + Sync {
    fn new_client(&self, endpoint: &Endpoint) -> Result<Arc<dyn DiscoveryHttpClient>>;

    fn shutdown(&self);
}

/// Produces endpoint-agnostic clients (the layers above the retry loop)
pub trait ClientFactory: Send + Sync {
    fn new_client(&self) -> Result<Arc<dyn DiscoveryHttpClient>>;

    fn shutdown(&self);
}
