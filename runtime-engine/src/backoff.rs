//! Restart backoff for controller `Run` loops: exponential,
//! full-jittered, with no bound on total elapsed time or attempt count.

use std::time::Duration;

use backon::{Backoff, BackoffBuilder, ExponentialBuilder};

/// The restart backoff used by a controller adapter.
///
/// Grounded on `kube-runtime`'s `ResettableBackoffWrapper`
/// (`utils/backoff_resettable.rs`): rather than mutating accumulated
/// backoff state, `reset` discards the current iterator and rebuilds a
/// fresh one from the same builder.
pub struct RestartBackoff {
    builder: ExponentialBuilder,
    current: Box<dyn Iterator<Item = Duration> + Send>,
}

impl RestartBackoff {
    /// `min_delay` is the first restart delay. There is no maximum delay
    /// and no maximum elapsed time cap.
    #[must_use]
    pub fn new(min_delay: Duration) -> Self {
        let builder = ExponentialBuilder::default()
            .with_min_delay(min_delay)
            .with_jitter()
            .without_max_times();
        Self {
            current: Box::new(builder.build()),
            builder,
        }
    }

    /// The next restart delay. Always `Some` under the hood: this backoff
    /// never gives up and the controller restarts forever.
    pub fn next_delay(&mut self) -> Duration {
        self.current.next().expect("unbounded exponential backoff never exhausts")
    }

    /// Reset the interval back to `min_delay`, called by the adapter once
    /// the controller makes progress (`ResetRestartBackoff`).
    pub fn reset(&mut self) {
        self.current = Box::new(self.builder.build());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::RestartBackoff;

    #[test]
    fn reset_returns_to_roughly_min_delay() {
        let mut backoff = RestartBackoff::new(Duration::from_millis(10));
        for _ in 0..5 {
            backoff.next_delay();
        }
        backoff.reset();
        // full jitter means the next delay is anywhere in [0, min_delay], not
        // an exact value, so only assert the upper bound.
        assert!(backoff.next_delay() <= Duration::from_millis(10));
    }
}
