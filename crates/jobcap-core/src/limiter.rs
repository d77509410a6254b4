//! Process-wide concurrency limiter.
//!
//! Build one at startup with [`ConcurrencyLimiter::from_config`] and hand clones to
//! every runner; clones share the same slots.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::spawn_blocking;

use crate::capacity::CapacityProbe;
use crate::config::RunnerConfig;
use crate::error::{Result, RunnerError};

/// Counting semaphore with a fixed capacity.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A held slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    /// Create a limiter with the given capacity (at least one slot).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        tracing::info!("Max parallel jobs = {capacity}");
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Resolve the capacity from configuration and an optional probe.
    ///
    /// The probe is only consulted when no explicit override is configured; a
    /// failing probe falls back to the local processor count.
    pub fn from_config(config: &RunnerConfig, probe: &dyn CapacityProbe) -> Self {
        let hint = if config.wants_hint() {
            match probe.probe() {
                Ok(hint) => Some(hint),
                Err(err) => {
                    tracing::debug!("No capacity hint available: {err}");
                    None
                }
            }
        } else {
            None
        };

        Self::new(config.resolve_capacity(hint))
    }

    /// [`ConcurrencyLimiter::from_config`] with the probe run on the blocking pool.
    ///
    /// Probes such as [`DockerProbe`](crate::capacity::DockerProbe) wait on an
    /// external process, which must not stall an async worker.
    ///
    /// # Errors
    /// Returns an error if the probe thread panics or is cancelled.
    pub async fn from_config_async<P>(config: RunnerConfig, probe: P) -> Result<Self>
    where
        P: CapacityProbe + 'static,
    {
        spawn_blocking(move || Self::from_config(&config, &probe))
            .await
            .map_err(|err| RunnerError::Other(format!("capacity probe did not complete: {err}")))
    }

    /// Maximum number of concurrently held slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a free slot.
    ///
    /// # Errors
    /// Returns an error if the semaphore has been closed.
    pub async fn acquire(&self) -> Result<LimiterPermit> {
        let wait_start = Instant::now();
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|err| RunnerError::Other(err.to_string()))?;
        tracing::debug!(
            "Parallel job waited {:?} before starting.",
            wait_start.elapsed()
        );
        Ok(LimiterPermit { _permit: permit })
    }
}
