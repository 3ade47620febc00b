//! Local-first resolution with a remote fallback

use super::ClusterResolver;
use crate::endpoint::ResolutionSnapshot;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Uses `local` whenever it has endpoints; asks `remote` only otherwise
pub struct CompoundResolver {
    local: Arc<dyn ClusterResolver>,
    remote: Arc<dyn ClusterResolver>,
}

impl CompoundResolver {
    pub fn new(local: Arc<dyn ClusterResolver>, remote: Arc<dyn ClusterResolver>) -> Self {
        Self { local, remote }
    }
}

#[async_trait]
impl ClusterResolver for CompoundResolver {
    fn region(&self) -> &str {
        self.local.region()
    }

    async fn resolve(&self) -> Result<ResolutionSnapshot> {
        match self.local.resolve().await {
            Ok(snapshot) if !snapshot.is_empty() => return Ok(snapshot),
            Ok(_) => {
                debug!(local = self.local.backend_name(), "Local resolution empty, trying remote");
            }
            Err(e) => {
                warn!(local = self.local.backend_name(), error = %e, "Local resolution failed, trying remote");
            }
        }
        self.remote.resolve().await
    }

    fn backend_name(&self) -> &'static str {
        "compound"
    }
}
