use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

use crate::error::{AppError, Result};

/// Counting admission gate for outbound requests.
///
/// Permits are consumed by [`acquire`](Self::acquire) and only come back
/// through [`refill`](Self::refill); finishing a request does not return one.
/// The counter lives behind a single mutex and `notify` plays the condition
/// variable: waiters register interest before checking the counter, so a
/// refill between the check and the await is never missed.
#[derive(Debug)]
pub struct PermitPool {
    capacity: usize,
    state: Mutex<PoolState>,
    notify: Notify,
}

#[derive(Debug)]
struct PoolState {
    available: usize,
    closed: bool,
}

impl PermitPool {
    /// Creates a full pool.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(AppError::InvalidConfig("permit pool capacity must be positive".into()));
        }

        Ok(Self {
            capacity,
            state: Mutex::new(PoolState {
                available: capacity,
                closed: false,
            }),
            notify: Notify::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.state.lock().available
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Waits until a permit is free and consumes it.
    ///
    /// Dropping the returned future while it waits consumes nothing.
    /// Fails with [`AppError::Cancelled`] once the pool is closed.
    pub async fn acquire(&self) -> Result<()> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(AppError::Cancelled);
                }
                if state.available > 0 {
                    state.available -= 1;
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// Like [`acquire`](Self::acquire), but gives up after `timeout`.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.acquire())
            .await
            .map_err(|_| AppError::Cancelled)?
    }

    /// Consumes a permit only if one is free right now.
    pub fn try_acquire(&self) -> Result<bool> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(AppError::Cancelled);
        }
        if state.available == 0 {
            return Ok(false);
        }
        state.available -= 1;
        Ok(true)
    }

    /// Returns up to `permits` to the pool, never exceeding capacity, and
    /// wakes every waiter. Returns how many permits were actually restored.
    pub fn refill(&self, permits: usize) -> Result<usize> {
        let restored = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(AppError::Cancelled);
            }
            let before = state.available;
            state.available = self.capacity.min(before.saturating_add(permits));
            state.available - before
        };

        if restored > 0 {
            self.notify.notify_waiters();
        }
        Ok(restored)
    }

    /// Closes the pool. Current and future acquirers get `Cancelled`.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
    }
}
