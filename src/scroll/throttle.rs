use std::time::Duration;

/// Spacing between recomputations.
///
/// A zero interval still defers to the next scheduler turn, so a burst of
/// events queued in the same turn collapses into one recompute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Throttle {
    interval: Duration,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn wait(&self) {
        if self.interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_sleeps_for_interval() {
        let throttle = Throttle::from_millis(40);
        let started = std::time::Instant::now();
        throttle.wait().await;
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_zero_interval_only_yields() {
        let throttle = Throttle::default();
        assert!(throttle.interval().is_zero());
        throttle.wait().await;
    }
}
