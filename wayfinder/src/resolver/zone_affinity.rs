//! Zone-aware ordering
//!
//! Moves endpoints in the caller's own zone to the front so traffic stays
//! in-zone while such servers exist. The partition is stable: relative order
//! within each group is what the delegate returned.

use super::ClusterResolver;
use crate::endpoint::{Endpoint, ResolutionSnapshot};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub struct ZoneAffinityResolver {
    delegate: Arc<dyn ClusterResolver>,
    my_zone: String,
    enabled: bool,
}

impl ZoneAffinityResolver {
    pub fn new(delegate: Arc<dyn ClusterResolver>, my_zone: impl Into<String>, enabled: bool) -> Self {
        Self {
            delegate,
            my_zone: my_zone.into(),
            enabled,
        }
    }

    pub fn my_zone(&self) -> &str {
        &self.my_zone
    }
}

/// Same-zone endpoints first, everything else after, each group in input order
pub fn partition_by_zone(endpoints: Vec<Endpoint>, zone: &str) -> Vec<Endpoint> {
    let (mut local, remote): (Vec<Endpoint>, Vec<Endpoint>) =
        endpoints.into_iter().partition(|ep| ep.zone() == zone);
    local.extend(remote);
    local
}

#[async_trait]
impl ClusterResolver for ZoneAffinityResolver {
    fn region(&self) -> &str {
        self.delegate.region()
    }

    async fn resolve(&self) -> Result<ResolutionSnapshot> {
        let snapshot = self.delegate.resolve().await?;
        if !self.enabled {
            return Ok(snapshot);
        }
        Ok(ResolutionSnapshot::new(
            snapshot.region,
            partition_by_zone(snapshot.endpoints, &self.my_zone),
        ))
    }

    fn backend_name(&self) -> &'static str {
        "zone_affinity"
    }
}
