//! An optional, process-wide token bucket gating controller-initiated
//! writes.

use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use runtime_core::{Error, Result};

/// A token bucket: `burst` tokens available immediately, refilled at
/// `rate` tokens/second. `acquire` blocks until a token is available or
/// `cancel` fires.
///
/// Implemented on top of `tokio::sync::Semaphore` plus a background
/// refill task, rather than hand-rolling timer bookkeeping per caller —
/// the semaphore already provides the fair-queuing and cancellation-safe
/// wait needed for controller writes to suspend on the rate limiter.
pub struct RateLimiter {
    semaphore: std::sync::Arc<Semaphore>,
    _refill: Option<tokio::task::JoinHandle<()>>,
}

impl RateLimiter {
    /// No rate limiting: `acquire` never blocks.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            semaphore: std::sync::Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)),
            _refill: None,
        }
    }

    /// `rate` tokens refilled per second, up to a `burst` capacity.
    #[must_use]
    pub fn new(rate_per_second: f64, burst: usize) -> Self {
        assert!(rate_per_second > 0.0, "rate must be positive");
        let semaphore = std::sync::Arc::new(Semaphore::new(burst));
        let interval = Duration::from_secs_f64(1.0 / rate_per_second);
        let refill_sem = semaphore.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if refill_sem.available_permits() < burst {
                    refill_sem.add_permits(1);
                }
            }
        });
        Self {
            semaphore,
            _refill: Some(handle),
        }
    }

    /// Block until a token is available, or `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            permit = self.semaphore.acquire() => {
                permit.expect("semaphore is never closed").forget();
                Ok(())
            }
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        if let Some(handle) = self._refill.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RateLimiter;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn unlimited_never_blocks() {
        let limiter = RateLimiter::unlimited();
        let cancel = CancellationToken::new();
        for _ in 0..1000 {
            limiter.acquire(&cancel).await.unwrap();
        }
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_blocked_acquire() {
        let limiter = RateLimiter::new(1.0, 0);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = limiter.acquire(&cancel).await.unwrap_err();
        assert!(matches!(err, runtime_core::Error::Cancelled));
    }
}
