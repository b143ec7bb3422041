//! Minimum-interval throttle shared by all broker call sites.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum spacing between calls.
///
/// Callers `pace().await` before each request. Only the calling task waits;
/// unrelated tasks are never blocked beyond the mutex hand-off.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Throttle {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Wait until the minimum interval since the previous call has elapsed,
    /// then claim the slot.
    pub async fn pace(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            let now = Instant::now();
            if ready_at > now {
                tokio::time::sleep(ready_at - now).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_paces_successive_calls() {
        let throttle = Throttle::new(Duration::from_millis(50));
        let start = Instant::now();
        throttle.pace().await;
        throttle.pace().await;
        throttle.pace().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_first_call_is_immediate() {
        let throttle = Throttle::new(Duration::from_secs(10));
        let start = Instant::now();
        throttle.pace().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
