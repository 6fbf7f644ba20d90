//! Acquisition pacing and throttle retry.
//!
//! The underlying snapshot capability is rate limited for the whole process,
//! so one [`CaptureRateLimiter`] is shared (`Arc`) by every coordinator. The
//! limiter holds its lock for the full acquisition, which also serializes
//! concurrent callers.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, warn};

use super::{ViewportSource, WindowId};
use crate::error::{CaptureError, CaptureResult};

/// Marker the host capture API puts in its "called too often" failure.
pub const THROTTLE_SIGNAL: &str = "MAX_CAPTURE_VISIBLE_TAB_CALLS_PER_SECOND";

/// Default spacing between two successful acquisitions.
pub const MIN_CAPTURE_INTERVAL: Duration = Duration::from_millis(700);

/// Map a raw host failure message onto the error taxonomy.
pub fn classify_acquisition_failure(message: &str) -> CaptureError {
    if message.contains(THROTTLE_SIGNAL) {
        CaptureError::throttled(1, message)
    } else {
        CaptureError::frame_capture(message)
    }
}

/// Linear backoff applied to throttled acquisitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub delay_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(800),
            delay_step: Duration::from_millis(400),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): 800ms, 1200ms, 1600ms.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay + self.delay_step * retry
    }
}

#[derive(Debug)]
pub struct CaptureRateLimiter {
    min_interval: Duration,
    retry: RetryPolicy,
    last_capture_at: Mutex<Option<Instant>>,
}

impl Default for CaptureRateLimiter {
    fn default() -> Self {
        Self::new(MIN_CAPTURE_INTERVAL, RetryPolicy::default())
    }
}

impl CaptureRateLimiter {
    pub fn new(min_interval: Duration, retry: RetryPolicy) -> Self {
        Self {
            min_interval,
            retry,
            last_capture_at: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Snapshot the viewport of `window`, waiting out the minimum spacing first.
    ///
    /// Throttled attempts are retried per [`RetryPolicy`]; any other failure
    /// is returned immediately. Only a success moves the spacing clock.
    pub async fn acquire<S>(&self, source: &S, window: WindowId) -> CaptureResult<Vec<u8>>
    where
        S: ViewportSource + ?Sized,
    {
        let mut last_capture_at = self.last_capture_at.lock().await;
        if let Some(last) = *last_capture_at {
            let ready_at = last + self.min_interval;
            if Instant::now() < ready_at {
                debug!(
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "Pacing viewport capture"
                );
                sleep_until(ready_at).await;
            }
        }

        let attempts = self.retry.max_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match source.capture_visible_viewport(window).await {
                Ok(bytes) => {
                    *last_capture_at = Some(Instant::now());
                    return Ok(bytes);
                }
                Err(err) if err.is_throttled() && attempt < attempts => {
                    let delay = self.retry.delay_for(attempt - 1);
                    warn!(
                        %window,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Viewport capture throttled, backing off"
                    );
                    sleep(delay).await;
                }
                Err(err) => {
                    return Err(err
                        .with_operation("capture_visible_viewport")
                        .with_metadata("attempts", attempt.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;

    struct Scripted {
        outcomes: StdMutex<VecDeque<CaptureResult<Vec<u8>>>>,
        calls: StdMutex<Vec<Instant>>,
    }

    impl Scripted {
        fn new(outcomes: Vec<CaptureResult<Vec<u8>>>) -> Self {
            Self {
                outcomes: StdMutex::new(outcomes.into()),
                calls: StdMutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ViewportSource for Scripted {
        async fn capture_visible_viewport(&self, _window: WindowId) -> CaptureResult<Vec<u8>> {
            self.calls.lock().unwrap().push(Instant::now());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(vec![1, 2, 3]))
        }
    }

    fn throttle() -> CaptureResult<Vec<u8>> {
        Err(classify_acquisition_failure(
            "This request exceeds the MAX_CAPTURE_VISIBLE_TAB_CALLS_PER_SECOND quota.",
        ))
    }

    #[test]
    fn test_classify_failure() {
        assert!(classify_acquisition_failure(THROTTLE_SIGNAL).is_throttled());
        let other = classify_acquisition_failure("No window with id: 7");
        assert_eq!(other.category(), "frame_capture");
    }

    #[test]
    fn test_retry_delays_are_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(800));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_throttles_then_success() {
        let limiter = CaptureRateLimiter::default();
        let source = Scripted::new(vec![throttle(), throttle(), throttle(), Ok(vec![9])]);
        let started = Instant::now();

        let bytes = limiter.acquire(&source, WindowId(1)).await.unwrap();
        assert_eq!(bytes, vec![9]);

        let calls = source.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[1] - calls[0], Duration::from_millis(800));
        assert_eq!(calls[2] - calls[1], Duration::from_millis(1200));
        assert_eq!(calls[3] - calls[2], Duration::from_millis(1600));
        assert_eq!(started.elapsed(), Duration::from_millis(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fourth_throttle_surfaces_error() {
        let limiter = CaptureRateLimiter::default();
        let source = Scripted::new(vec![throttle(), throttle(), throttle(), throttle()]);

        let err = limiter.acquire(&source, WindowId(1)).await.unwrap_err();
        assert!(err.is_throttled());
        assert_eq!(source.calls().len(), 4);
        assert_eq!(
            err.context().metadata.get("attempts").map(String::as_str),
            Some("4")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_failures_are_not_retried() {
        let limiter = CaptureRateLimiter::default();
        let source = Scripted::new(vec![Err(CaptureError::frame_capture("tab closed"))]);

        let err = limiter.acquire(&source, WindowId(1)).await.unwrap_err();
        assert_eq!(err.category(), "frame_capture");
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successive_captures_are_spaced() {
        let limiter = CaptureRateLimiter::default();
        let source = Scripted::new(Vec::new());

        limiter.acquire(&source, WindowId(1)).await.unwrap();
        limiter.acquire(&source, WindowId(1)).await.unwrap();
        tokio::time::advance(Duration::from_millis(1000)).await;
        limiter.acquire(&source, WindowId(1)).await.unwrap();

        let calls = source.calls();
        assert_eq!(calls[1] - calls[0], MIN_CAPTURE_INTERVAL);
        // Already spaced far enough apart; no extra wait.
        assert_eq!(calls[2] - calls[1], Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiters_are_independent() {
        let first = CaptureRateLimiter::default();
        let second = CaptureRateLimiter::default();
        let source = Scripted::new(Vec::new());

        first.acquire(&source, WindowId(1)).await.unwrap();
        second.acquire(&source, WindowId(2)).await.unwrap();

        let calls = source.calls();
        assert_eq!(calls[1] - calls[0], Duration::ZERO);
    }
}
