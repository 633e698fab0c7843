use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::error::{AppError, Result};
use crate::http::rate_limiter::PermitPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplenisherState {
    Running,
    Stopped,
}

/// Background task that refills a [`PermitPool`] once per interval.
///
/// Ticks are fixed-rate and fire whether or not anything was consumed.
/// A failing or panicking tick is logged and the schedule carries on.
/// Dropping the replenisher aborts the task.
pub struct Replenisher {
    shutdown_tx: broadcast::Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
    ticks: Arc<AtomicU64>,
}

impl Replenisher {
    /// Starts refilling `pool` with `permits` every `interval`.
    /// The first refill happens one interval from now.
    pub fn spawn(pool: Arc<PermitPool>, interval: Duration, permits: usize) -> Result<Self> {
        Self::spawn_with(interval, move || pool.refill(permits).map(|_| ()))
    }

    /// Runs `tick` on the refill schedule on the current tokio runtime.
    /// Fails with [`AppError::Init`] when called outside one.
    pub fn spawn_with<F>(interval: Duration, tick: F) -> Result<Self>
    where
        F: Fn() -> Result<()> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(AppError::InvalidConfig("refill interval must be positive".into()));
        }

        let runtime = Handle::try_current()
            .map_err(|e| AppError::Init(format!("replenisher needs a tokio runtime: {}", e)))?;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let ticks = Arc::new(AtomicU64::new(0));
        let handle = runtime.spawn(run(interval, tick, ticks.clone(), shutdown_rx));

        debug!("Replenisher started, interval {:?}", interval);

        Ok(Self {
            shutdown_tx,
            handle: Mutex::new(Some(handle)),
            ticks,
        })
    }

    /// Number of ticks fired so far, failed ones included.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> ReplenisherState {
        match self.handle.lock().as_ref() {
            Some(handle) if !handle.is_finished() => ReplenisherState::Running,
            _ => ReplenisherState::Stopped,
        }
    }

    /// Stops the schedule and waits for the task to exit.
    pub async fn stop(&self) {
        let handle = self.handle.lock().take();
        let Some(handle) = handle else {
            return;
        };

        // No receiver left means the task already exited.
        let _ = self.shutdown_tx.send(());
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                error!("Replenisher task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for Replenisher {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}

async fn run<F>(
    interval: Duration,
    tick: F,
    ticks: Arc<AtomicU64>,
    mut shutdown: broadcast::Receiver<()>,
) where
    F: Fn() -> Result<()> + Send + 'static,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    // Fixed rate: late ticks are caught up so the schedule never drifts.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let n = ticks.fetch_add(1, Ordering::Relaxed) + 1;
                match panic::catch_unwind(AssertUnwindSafe(&tick)) {
                    Ok(Ok(())) => debug!("Replenisher tick {} done", n),
                    Ok(Err(e)) => error!("Replenisher tick {} failed: {}", n, e),
                    Err(_) => error!("Replenisher tick {} panicked", n),
                }
            }
            _ = shutdown.recv() => {
                info!("Replenisher shutting down...");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_rejects_zero_interval() {
        let pool = Arc::new(PermitPool::new(1).unwrap());
        let result = Replenisher::spawn(pool, Duration::ZERO, 1);
        assert!(matches!(result, Err(AppError::InvalidConfig(_))));
    }

    #[test]
    fn test_spawn_outside_runtime_is_an_error() {
        let pool = Arc::new(PermitPool::new(1).unwrap());
        let result = Replenisher::spawn(pool, Duration::from_secs(1), 1);
        assert!(matches!(result, Err(AppError::Init(_))));
    }

    #[test]
    fn test_release_profile_keeps_unwinding() {
        // Tick panics are contained with catch_unwind, which needs unwinding.
        let manifest = include_str!("../../Cargo.toml");
        assert!(!manifest.lines().any(|l| l.replace(' ', "") == "panic=\"abort\""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resets_pool_every_interval() {
        let pool = Arc::new(PermitPool::new(3).unwrap());
        let replenisher = Replenisher::spawn(pool.clone(), Duration::from_secs(1), 3).unwrap();

        for _ in 0..3 {
            assert!(pool.try_acquire().unwrap());
        }
        assert_eq!(pool.available(), 0);

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(pool.available(), 0);
        assert_eq!(replenisher.ticks(), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(pool.available(), 3);
        assert_eq!(replenisher.ticks(), 1);

        // Ticks keep firing with nothing consumed.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(pool.available(), 3);
        assert_eq!(replenisher.ticks(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_ticks_do_not_stop_schedule() {
        let pool = Arc::new(PermitPool::new(1).unwrap());
        let replenisher = Replenisher::spawn(pool.clone(), Duration::from_secs(1), 1).unwrap();

        pool.close();
        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert_eq!(replenisher.ticks(), 3);
        assert_eq!(replenisher.state(), ReplenisherState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_tick_is_contained() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let replenisher = Replenisher::spawn_with(Duration::from_secs(1), move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first tick blows up");
            }
            Ok(())
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(replenisher.state(), ReplenisherState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_ticks() {
        let pool = Arc::new(PermitPool::new(2).unwrap());
        let replenisher = Replenisher::spawn(pool.clone(), Duration::from_secs(1), 2).unwrap();
        assert_eq!(replenisher.state(), ReplenisherState::Running);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        replenisher.stop().await;
        assert_eq!(replenisher.state(), ReplenisherState::Stopped);
        let fired = replenisher.ticks();

        assert!(pool.try_acquire().unwrap());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(replenisher.ticks(), fired);
        assert_eq!(pool.available(), 1);

        // Stopping twice is a no-op.
        replenisher.stop().await;
    }
}
