//! Layout-stability polling.
//!
//! A page is settled once none of document height, document width, scroll
//! position or viewport height has changed for `stable_window`. The poll
//! never fails on timeout; it returns a fresh sample instead.

use std::time::Duration;

use longshot_layout::geometry::PageMetrics;
use tokio::time::{Instant, sleep};
use tracing::debug;

use super::PageDriver;
use crate::error::CaptureResult;

pub const SETTLE_TIMEOUT: Duration = Duration::from_millis(2200);
pub const SETTLE_STABLE_WINDOW: Duration = Duration::from_millis(320);
pub const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(80);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SettlePolicy {
    pub timeout: Duration,
    pub stable_window: Duration,
    pub poll_interval: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            timeout: SETTLE_TIMEOUT,
            stable_window: SETTLE_STABLE_WINDOW,
            poll_interval: SETTLE_POLL_INTERVAL,
        }
    }
}

impl SettlePolicy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

/// Sample `driver` every `poll_interval` until the layout holds still.
pub async fn poll_until_settled<D>(driver: &D, policy: &SettlePolicy) -> CaptureResult<PageMetrics>
where
    D: PageDriver + ?Sized,
{
    let started = Instant::now();
    let mut last = driver.page_metrics().await?;
    let mut stable_since = started;

    while started.elapsed() < policy.timeout {
        sleep(policy.poll_interval).await;
        let next = driver.page_metrics().await?;
        if next.layout_changed(&last) {
            last = next;
            stable_since = Instant::now();
            continue;
        }
        if stable_since.elapsed() >= policy.stable_window {
            debug!(
                waited_ms = started.elapsed().as_millis() as u64,
                doc_height = next.doc_height,
                "Page settled"
            );
            return Ok(next);
        }
    }

    debug!(
        timeout_ms = policy.timeout.as_millis() as u64,
        "Page did not settle before timeout"
    );
    driver.page_metrics().await
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Document height follows a script of (time-from-start, height) steps.
    struct Growing {
        started: Instant,
        steps: Vec<(Duration, u32)>,
        samples: Mutex<u32>,
    }

    impl Growing {
        fn new(steps: Vec<(Duration, u32)>) -> Self {
            Self {
                started: Instant::now(),
                steps,
                samples: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl PageDriver for Growing {
        async fn page_metrics(&self) -> CaptureResult<PageMetrics> {
            *self.samples.lock().unwrap() += 1;
            let elapsed = self.started.elapsed();
            let doc_height = self
                .steps
                .iter()
                .filter(|(at, _)| *at <= elapsed)
                .map(|(_, h)| *h)
                .last()
                .unwrap_or(1000);
            Ok(PageMetrics {
                viewport_width: 800,
                viewport_height: 600,
                doc_width: 800,
                doc_height,
                ..PageMetrics::default()
            })
        }

        async fn scroll_to(&self, y: u32) -> CaptureResult<u32> {
            Ok(y)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_page_returns_after_window() {
        let driver = Growing::new(Vec::new());
        let started = Instant::now();
        let metrics = poll_until_settled(&driver, &SettlePolicy::default())
            .await
            .unwrap();
        assert_eq!(metrics.doc_height, 1000);
        // Unchanged samples every 80ms; the fourth closes the 320ms window.
        assert_eq!(started.elapsed(), Duration::from_millis(320));
    }

    #[tokio::test(start_paused = true)]
    async fn test_growth_resets_stability() {
        let driver = Growing::new(vec![
            (Duration::from_millis(150), 1400),
            (Duration::from_millis(400), 1800),
        ]);
        let metrics = driver.wait_for_settled(SETTLE_TIMEOUT).await.unwrap();
        assert_eq!(metrics.doc_height, 1800);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_fresh_sample() {
        let steps = (1..100)
            .map(|i| (Duration::from_millis(80 * i), 1000 + i as u32))
            .collect();
        let driver = Growing::new(steps);
        let started = Instant::now();
        let metrics = driver
            .wait_for_settled(Duration::from_millis(500))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(started.elapsed() < Duration::from_millis(600));
        assert!(metrics.doc_height > 1000);
    }
}
