//! Local registry cache
//!
//! Holds the last registry fetched from the discovery servers so endpoint
//! resolution can read the read-cluster instances without any I/O. Reads are
//! lock-free; updates replace the whole state.

use crate::error::{DiscoveryError, Result};
use crate::model::{ActionType, Application, Applications, InstanceInfo};
use crate::transport::DiscoveryHttpClient;
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Read-only view of registry contents
pub trait RegistrySource: Send + Sync {
    /// Instances of an application
    ///
    /// `None` means the source does not know (never populated, or stale);
    /// `Some(vec![])` means the application is known to have no instances.
    fn lookup(&self, app_name: &str) -> Option<Vec<InstanceInfo>>;
}

/// Result of merging a delta into the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    Applied,
    /// No full registry to merge into
    NoBase,
    /// Merged registry disagreed with the server hash; cache left untouched
    HashMismatch,
}

/// How a fetch brought the cache up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Full,
    Delta,
}

struct RegistryState {
    applications: Applications,
    updated_at: Instant,
}

pub struct LocalRegistry {
    state: ArcSwapOption<RegistryState>,
    staleness: Duration,
    /// Serializes read-modify-write updates
    update_lock: Mutex<()>,
}

impl LocalRegistry {
    pub fn new(staleness: Duration) -> Self {
        Self {
            state: ArcSwapOption::empty(),
            staleness,
            update_lock: Mutex::new(()),
        }
    }

    /// Replace the cache with a full registry
    pub fn apply_full(&self, mut applications: Applications) {
        let _guard = self.update_lock.lock();
        if applications.apps_hash_code.is_none() {
            applications.apps_hash_code = Some(applications.compute_hash_code());
        }
        debug!(
            applications = applications.applications.len(),
            instances = applications.instance_count(),
            "Applied full registry"
        );
        self.state.store(Some(Arc::new(RegistryState {
            applications,
            updated_at: Instant::now(),
        })));
    }

    /// Merge a delta into the cached registry
    pub fn apply_delta(&self, delta: &Applications) -> DeltaOutcome {
        let _guard = self.update_lock.lock();
        let Some(current) = self.state.load_full() else {
            return DeltaOutcome::NoBase;
        };

        let mut merged = current.applications.clone();
        let mut changes = 0usize;
        for app in &delta.applications {
            for instance in &app.instances {
                changes += 1;
                match instance.action_type.unwrap_or(ActionType::Modified) {
                    ActionType::Added | ActionType::Modified => upsert(&mut merged, instance),
                    ActionType::Deleted => remove(&mut merged, &app.name, &instance.instance_id),
                }
            }
        }

        let computed = merged.compute_hash_code();
        if let Some(expected) = &delta.apps_hash_code {
            if *expected != computed {
                warn!(
                    expected = %expected,
                    computed = %computed,
                    "Registry hash mismatch after delta, full fetch required"
                );
                return DeltaOutcome::HashMismatch;
            }
        }

        merged.version_delta = delta.version_delta;
        merged.apps_hash_code = Some(computed);
        debug!(changes, "Applied registry delta");
        self.state.store(Some(Arc::new(RegistryState {
            applications: merged,
            updated_at: Instant::now(),
        })));
        DeltaOutcome::Applied
    }

    /// Bring the cache up to date through a discovery client
    ///
    /// Uses a delta once the cache is populated. Falls back to a full fetch
    /// when the server declines the delta or the merge does not reconcile.
    pub async fn fetch(&self, client: &dyn DiscoveryHttpClient) -> Result<FetchKind> {
        if self.is_populated() {
            let response = client.get_delta().await?;
            match response.applications() {
                Some(delta) if response.is_success() => match self.apply_delta(delta) {
                    DeltaOutcome::Applied => return Ok(FetchKind::Delta),
                    outcome => debug!(?outcome, "Delta not applied, fetching full registry"),
                },
                _ => debug!(status = response.status, "No delta available, fetching full registry"),
            }
        }

        let response = client.get_applications().await?;
        if !response.is_success() {
            return Err(DiscoveryError::Transport(format!(
                "Registry fetch answered with status {}",
                response.status
            )));
        }
        let applications = response
            .applications()
            .cloned()
            .ok_or_else(|| DiscoveryError::Serialization("Registry response carried no applications".into()))?;
        self.apply_full(applications);
        Ok(FetchKind::Full)
    }

    /// Copy of the cached registry, if any
    pub fn applications(&self) -> Option<Applications> {
        self.state.load_full().map(|s| s.applications.clone())
    }

    pub fn is_populated(&self) -> bool {
        self.state.load().is_some()
    }

    /// Time since the last update
    pub fn age(&self) -> Option<Duration> {
        self.state.load_full().map(|s| s.updated_at.elapsed())
    }
}

impl RegistrySource for LocalRegistry {
    fn lookup(&self, app_name: &str) -> Option<Vec<InstanceInfo>> {
        let state = self.state.load_full()?;
        if state.updated_at.elapsed() > self.staleness {
            debug!(app = %app_name, "Registry cache is stale");
            return None;
        }
        Some(
            state
                .applications
                .application(app_name)
                .map(|app| app.instances.clone())
                .unwrap_or_default(),
        )
    }
}

fn upsert(applications: &mut Applications, instance: &InstanceInfo) {
    let mut stored = instance.clone();
    stored.action_type = None;

    let position = applications
        .applications
        .iter()
        .position(|app| app.name.eq_ignore_ascii_case(&instance.app));
    let app = match position {
        Some(i) => &mut applications.applications[i],
        None => {
            applications.applications.push(Application::new(&instance.app));
            let last = applications.applications.len() - 1;
            &mut applications.applications[last]
        }
    };

    match app
        .instances
        .iter_mut()
        .find(|existing| existing.instance_id == instance.instance_id)
    {
        Some(existing) => *existing = stored,
        None => app.instances.push(stored),
    }
}

fn remove(applications: &mut Applications, app_name: &str, instance_id: &str) {
    for app in applications
        .applications
        .iter_mut()
        .filter(|app| app.name.eq_ignore_ascii_case(app_name))
    {
        app.instances.retain(|i| i.instance_id != instance_id);
    }
    applications.applications.retain(|app| !app.instances.is_empty());
}
