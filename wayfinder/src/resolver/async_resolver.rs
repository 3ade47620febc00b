//! Background-refreshed cluster resolution
//!
//! Wraps a slower resolver and keeps its last good snapshot in memory. A
//! tokio task refreshes it on a fixed schedule; reads never wait for the
//! network once the first refresh has completed.
//!
//! # Refresh rules
//!
//! - At most one refresh runs at a time. Scheduled ticks skip when one is
//!   already in flight.
//! - A failed refresh keeps the previous snapshot; the next tick tries again.
//! - The first read before any refresh attempt warms up synchronously, once.
//!   After that, reads only ever see the cached snapshot.
//!
//! ```toml
//! refresh_interval_ms = 300000
//! initial_delay_ms = 0
//! ```

use super::ClusterResolver;
use crate::endpoint::ResolutionSnapshot;
use crate::error::{DiscoveryError, Result};
use crate::metrics;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Refresh counters of an [`AsyncResolver`]
#[derive(Debug, Clone, Default)]
pub struct ResolverStats {
    pub successful_refreshes: u64,
    pub failed_refreshes: u64,
    pub last_refresh: Option<Instant>,
    pub endpoints: usize,
}

/// State shared with the background task
struct ResolverState {
    delegate: Arc<dyn ClusterResolver>,
    snapshot: ArcSwap<ResolutionSnapshot>,
    last_refresh: RwLock<Option<Instant>>,
    /// Set once any refresh has completed, successful or not
    attempted: AtomicBool,
    successes: AtomicU64,
    failures: AtomicU64,
    /// Held for the duration of a refresh
    refresh_lock: tokio::sync::Mutex<()>,
}

impl ResolverState {
    fn is_warm(&self) -> bool {
        self.attempted.load(Ordering::SeqCst)
    }

    /// Run one refresh; the caller holds `refresh_lock`
    async fn refresh_locked(&self) -> Result<()> {
        let backend = self.delegate.backend_name();
        let start = Instant::now();

        let result = self.delegate.resolve().await;
        self.attempted.store(true, Ordering::SeqCst);
        match result {
            Ok(snapshot) => {
                let count = snapshot.len();
                self.snapshot.store(Arc::new(snapshot));
                *self.last_refresh.write() = Some(Instant::now());
                self.successes.fetch_add(1, Ordering::Relaxed);

                metrics::record_resolver_refresh(backend, true, start.elapsed());
                metrics::record_endpoint_count(backend, count);
                debug!(resolver = backend, endpoints = count, "Cluster resolution refreshed");
                Ok(())
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                metrics::record_resolver_refresh(backend, false, start.elapsed());
                warn!(
                    resolver = backend,
                    error = %e,
                    "Cluster resolution refresh failed, keeping previous endpoints"
                );
                Err(e)
            }
        }
    }

    /// Scheduled refresh; skipped while another one is in flight
    async fn refresh_tick(&self) {
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            debug!("Refresh already in flight, skipping tick");
            return;
        };
        let _ = self.refresh_locked().await;
    }

    /// Warm-up refresh for a read before any refresh attempt
    async fn refresh_cold(&self) {
        let _guard = self.refresh_lock.lock().await;
        if self.is_warm() {
            return;
        }
        let _ = self.refresh_locked().await;
    }
}

pub struct AsyncResolver {
    region: String,
    state: Arc<ResolverState>,
    refresh_interval: Duration,
    initial_delay: Duration,

    /// Whether background refresh is running
    running: Arc<AtomicBool>,

    /// Background task handle
    task_handle: RwLock<Option<JoinHandle<()>>>,
}

impl AsyncResolver {
    /// Create a resolver; nothing runs until [`start`](Self::start)
    pub fn new(delegate: Arc<dyn ClusterResolver>, refresh_interval: Duration, initial_delay: Duration) -> Self {
        let region = delegate.region().to_string();
        Self {
            state: Arc::new(ResolverState {
                delegate,
                snapshot: ArcSwap::from_pointee(ResolutionSnapshot::empty(region.clone())),
                last_refresh: RwLock::new(None),
                attempted: AtomicBool::new(false),
                successes: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                refresh_lock: tokio::sync::Mutex::new(()),
            }),
            region,
            refresh_interval,
            initial_delay,
            running: Arc::new(AtomicBool::new(false)),
            task_handle: RwLock::new(None),
        }
    }

    /// Start the background refresh task on the current tokio runtime
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            DiscoveryError::Config("AsyncResolver must be started inside a tokio runtime".into())
        })?;
        if self.refresh_interval.is_zero() {
            return Err(DiscoveryError::Config(
                "AsyncResolver refresh interval must be greater than zero".into(),
            ));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(()); // Already running
        }

        let state = self.state.clone();
        let running = self.running.clone();
        let refresh_interval = self.refresh_interval;
        let initial_delay = self.initial_delay;

        let handle = runtime.spawn(async move {
            info!(
                resolver = state.delegate.backend_name(),
                interval_ms = refresh_interval.as_millis() as u64,
                initial_delay_ms = initial_delay.as_millis() as u64,
                "Starting cluster resolution background refresh"
            );

            if !initial_delay.is_zero() {
                tokio::time::sleep(initial_delay).await;
            }

            // First tick fires immediately, i.e. right after the initial delay
            let mut interval = tokio::time::interval(refresh_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            while running.load(Ordering::SeqCst) {
                interval.tick().await;

                if !running.load(Ordering::SeqCst) {
                    break;
                }

                state.refresh_tick().await;
            }

            info!("Cluster resolution background refresh stopped");
        });

        *self.task_handle.write() = Some(handle);
        Ok(())
    }

    /// Refresh now, waiting for an in-flight refresh to finish first
    pub async fn refresh_now(&self) -> Result<()> {
        let _guard = self.state.refresh_lock.lock().await;
        self.state.refresh_locked().await
    }

    /// Last good snapshot without triggering any refresh
    pub fn snapshot(&self) -> Arc<ResolutionSnapshot> {
        self.state.snapshot.load_full()
    }

    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            successful_refreshes: self.state.successes.load(Ordering::Relaxed),
            failed_refreshes: self.state.failures.load(Ordering::Relaxed),
            last_refresh: *self.state.last_refresh.read(),
            endpoints: self.state.snapshot.load().len(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the background task; idempotent
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.task_handle.write().take() {
            handle.abort();
            debug!(region = %self.region, "Stopped cluster resolution refresh");
        }
    }
}

#[async_trait]
impl ClusterResolver for AsyncResolver {
    fn region(&self) -> &str {
        &self.region
    }

    async fn resolve(&self) -> Result<ResolutionSnapshot> {
        if !self.state.is_warm() {
            self.state.refresh_cold().await;
        }
        Ok(self.state.snapshot.load().as_ref().clone())
    }

    fn backend_name(&self) -> &'static str {
        "async"
    }
}

impl Drop for AsyncResolver {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task_handle.write().take() {
            handle.abort();
        }
    }
}
