use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::args::PositiveUsize;
use crate::shutdown::ShutdownReceiver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("permit acquisition cancelled")]
pub struct Cancelled;

/// Fixed-capacity permit source bounding the number of in-flight calls.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    held: Arc<AtomicUsize>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    #[must_use]
    pub fn new(capacity: PositiveUsize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity.get())),
            held: Arc::new(AtomicUsize::new(0)),
            capacity: capacity.get(),
        }
    }

    /// Waits for a unit of capacity.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] when the shutdown signal fires (or its sender is
    /// gone) before capacity frees up. Nothing is granted in that case.
    pub async fn acquire(&self, shutdown_rx: &mut ShutdownReceiver) -> Result<Permit, Cancelled> {
        let acquired = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => return Err(Cancelled),
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit,
        };
        let permit = acquired.map_err(|_closed| Cancelled)?;
        let held = self.held.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        debug_assert!(
            held <= self.capacity,
            "held permits ({}) exceed capacity ({})",
            held,
            self.capacity
        );
        Ok(Permit {
            inner: Some(permit),
            held: Arc::clone(&self.held),
        })
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of permits currently checked out.
    #[must_use]
    pub fn held(&self) -> usize {
        self.held.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// One unit of capacity. Released by [`Permit::release`] or on drop, exactly
/// once either way.
#[derive(Debug)]
pub struct Permit {
    inner: Option<OwnedSemaphorePermit>,
    held: Arc<AtomicUsize>,
}

impl Permit {
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        let Some(permit) = self.inner.take() else {
            return;
        };
        // Decrement before the semaphore slot reopens so `held` never
        // overshoots the capacity.
        let previous = self.held.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "permit released more times than acquired");
        drop(permit);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.release_inner();
    }
}
