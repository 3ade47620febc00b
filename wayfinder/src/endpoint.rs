//! Discovery server endpoints and resolution snapshots

use crate::error::{DiscoveryError, Result};
use crate::model::InstanceInfo;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Traffic role of a discovery endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointRole {
    Registration,
    Query,
    Replication,
}

impl EndpointRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointRole::Registration => "registration",
            EndpointRole::Query => "query",
            EndpointRole::Replication => "replication",
        }
    }
}

/// One candidate discovery server
///
/// Immutable. Two endpoints are equal when they share host, port and role;
/// the zone and the URL path do not take part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    service_url: String,
    host: String,
    port: u16,
    secure: bool,
    zone: String,
    role: EndpointRole,
}

impl Endpoint {
    /// Build an endpoint from a service URL such as `http://host:8080/eureka/v2/`
    pub fn from_url(service_url: &str, zone: impl Into<String>, role: EndpointRole) -> Result<Self> {
        let url = Url::parse(service_url)
            .map_err(|e| DiscoveryError::Config(format!("Invalid service URL '{}': {}", service_url, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| DiscoveryError::Config(format!("Service URL '{}' has no host", service_url)))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| DiscoveryError::Config(format!("Service URL '{}' has no port", service_url)))?;

        Ok(Self {
            service_url: normalize(url.as_str()),
            host,
            port,
            secure: url.scheme() == "https",
            zone: zone.into(),
            role,
        })
    }

    /// Build an endpoint pointing at a registered discovery server instance
    pub fn from_instance(instance: &InstanceInfo, context_path: &str, role: EndpointRole) -> Self {
        let scheme = if instance.secure { "https" } else { "http" };
        let host = instance
            .ip_addr
            .clone()
            .unwrap_or_else(|| instance.host_name.clone());
        let context = context_path.trim_matches('/');
        let service_url = if context.is_empty() {
            format!("{}://{}:{}/", scheme, host, instance.port)
        } else {
            format!("{}://{}:{}/{}/", scheme, host, instance.port, context)
        };

        Self {
            service_url,
            host,
            port: instance.port,
            secure: instance.secure,
            zone: instance.zone.clone().unwrap_or_else(|| "default".to_string()),
            role,
        }
    }

    /// Endpoint named by a redirect `Location` header
    ///
    /// The location points at the full request URL; the relative request path
    /// is stripped to recover the service URL of the target server.
    pub fn from_redirect(location: &str, request_path: &str, origin: &Endpoint) -> Result<Self> {
        let base = Url::parse(&origin.service_url)
            .map_err(|e| DiscoveryError::Transport(format!("Invalid origin URL: {}", e)))?;
        let mut target = base
            .join(location)
            .map_err(|e| DiscoveryError::Transport(format!("Invalid redirect location '{}': {}", location, e)))?;
        target.set_query(None);

        let path = target.path().to_string();
        let service_path = path
            .strip_suffix(request_path.trim_start_matches('/'))
            .map(str::to_string)
            .unwrap_or_else(|| base.path().to_string());
        target.set_path(&service_path);

        Self::from_url(target.as_str(), origin.zone.clone(), origin.role)
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn role(&self) -> EndpointRole {
        self.role
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn normalize(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port && self.role == other.role
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
        self.role.hash(state);
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.service_url, self.zone, self.role.as_str())
    }
}

/// Ordered endpoint list produced by one resolution
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResolutionSnapshot {
    pub region: String,
    pub endpoints: Vec<Endpoint>,
}

impl ResolutionSnapshot {
    pub fn new(region: impl Into<String>, endpoints: Vec<Endpoint>) -> Self {
        Self {
            region: region.into(),
            endpoints,
        }
    }

    /// An empty snapshot ("no known endpoints")
    pub fn empty(region: impl Into<String>) -> Self {
        Self::new(region, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.endpoints.contains(endpoint)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Endpoint> {
        self.endpoints.iter()
    }
}
