//! # Scroll-Capture Coordinator
//!
//! Walks a page from the top of the capture rectangle to its bottom in
//! overlapping scroll stops, taking one rate-limited snapshot per stop.
//!
//! ## Protocol
//!
//! 1. Step size is the viewport height minus an overlap of
//!    `max(80, 15% of viewport)`, never below 100px
//! 2. Each stop: scroll, wait a short fixed delay, poll until settled, snapshot
//! 3. Frames are tagged with the scroll position the page actually reached;
//!    a stop that lands where the previous one did replaces its frame
//! 4. With a hard bottom (explicit crop line or height cap) capture stops once
//!    the viewport reaches it; otherwise once the viewport reaches the
//!    document end and a longer re-check shows the document stopped growing
//! 5. A page that refuses to scroll for several stops in a row ends the run
//!
//! The original scroll position is restored on every exit path, including
//! cancellation of the capture future.

use std::sync::Arc;
use std::time::Duration;

use longshot_layout::geometry::{
    CaptureRect, CropBounds, PageMetrics, resolve_capture_rect, scroll_step,
};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use super::rate_limit::CaptureRateLimiter;
use super::settle::SETTLE_TIMEOUT;
use super::{CaptureFrame, PageDriver, ViewportSource, WindowId};
use crate::error::CaptureResult;

/// Timing and tolerance knobs of the scroll loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureTiming {
    /// Fixed pause after each scroll before settle polling starts.
    pub scroll_delay: Duration,
    pub settle_timeout: Duration,
    /// Settle timeout of the re-check made once the document end is reached.
    pub bottom_recheck_timeout: Duration,
    /// Slack when comparing the visible bottom against a target line.
    pub edge_tolerance: u32,
    /// Consecutive stops without scroll progress before giving up.
    pub max_stalled_stops: u32,
}

impl Default for CaptureTiming {
    fn default() -> Self {
        Self {
            scroll_delay: Duration::from_millis(160),
            settle_timeout: SETTLE_TIMEOUT,
            bottom_recheck_timeout: SETTLE_TIMEOUT + Duration::from_millis(900),
            edge_tolerance: 2,
            max_stalled_stops: 3,
        }
    }
}

/// Everything a finished scroll run hands to the stitcher.
#[derive(Clone, Debug)]
pub struct CaptureRun {
    /// Frames in capture order, at most one per scroll position.
    pub frames: Vec<CaptureFrame>,
    /// Metrics at the start of the run.
    pub initial_metrics: PageMetrics,
    /// Last settled metrics; the stitcher resolves geometry against these.
    pub final_metrics: PageMetrics,
    /// Rectangle the scroll loop aimed for.
    pub rect: CaptureRect,
}

/// Scrolls back to `scroll_y` unless disarmed by an explicit restore.
struct RestoreGuard {
    driver: Arc<dyn PageDriver>,
    scroll_y: u32,
    armed: bool,
}

impl RestoreGuard {
    fn new(driver: Arc<dyn PageDriver>, scroll_y: u32) -> Self {
        Self {
            driver,
            scroll_y,
            armed: true,
        }
    }

    async fn restore(mut self) -> CaptureResult<u32> {
        self.armed = false;
        self.driver.scroll_to(self.scroll_y).await
    }
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Cancelled mid-run: the restore can no longer be awaited here.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let driver = Arc::clone(&self.driver);
                let scroll_y = self.scroll_y;
                handle.spawn(async move {
                    if let Err(err) = driver.scroll_to(scroll_y).await {
                        warn!(error = %err, scroll_y, "Failed to restore scroll position");
                    }
                });
            }
            Err(_) => {
                warn!(
                    scroll_y = self.scroll_y,
                    "No runtime available to restore scroll position"
                );
            }
        }
    }
}

pub struct ScrollCoordinator {
    driver: Arc<dyn PageDriver>,
    source: Arc<dyn ViewportSource>,
    limiter: Arc<CaptureRateLimiter>,
    timing: CaptureTiming,
}

impl ScrollCoordinator {
    pub fn new(
        driver: Arc<dyn PageDriver>,
        source: Arc<dyn ViewportSource>,
        limiter: Arc<CaptureRateLimiter>,
    ) -> Self {
        Self {
            driver,
            source,
            limiter,
            timing: CaptureTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: CaptureTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn timing(&self) -> &CaptureTiming {
        &self.timing
    }

    /// Capture frames covering the rectangle resolved from the current page
    /// metrics, `crop` and `max_height` (0 = unlimited).
    #[instrument(skip_all, fields(window = %window, max_height))]
    pub async fn capture(
        &self,
        window: WindowId,
        crop: &CropBounds,
        max_height: u32,
    ) -> CaptureResult<CaptureRun> {
        let initial = self.driver.page_metrics().await?;
        let rect = resolve_capture_rect(&initial, crop, max_height);
        info!(
            y0 = rect.y0,
            y1 = rect.y1,
            width = rect.width,
            hard_bottom = rect.has_hard_bottom(),
            viewport_height = initial.viewport_height,
            "Starting scroll capture"
        );

        let guard = RestoreGuard::new(Arc::clone(&self.driver), initial.scroll_y);
        let outcome = self.scroll_and_collect(window, rect, initial).await;
        let restored = guard.restore().await;

        match outcome {
            Ok(run) => {
                if let Err(err) = restored {
                    warn!(error = %err, "Failed to restore scroll position");
                }
                info!(
                    frames = run.frames.len(),
                    doc_height = run.final_metrics.doc_height,
                    "Scroll capture complete"
                );
                Ok(run)
            }
            Err(err) => {
                if let Err(restore_err) = restored {
                    warn!(error = %restore_err, "Failed to restore scroll position after error");
                }
                Err(err)
            }
        }
    }

    async fn settle(&self, timeout: Duration, fallback: PageMetrics) -> PageMetrics {
        match self.driver.wait_for_settled(timeout).await {
            Ok(metrics) => metrics,
            Err(err) => {
                warn!(error = %err, "Settle wait failed, keeping previous metrics");
                fallback
            }
        }
    }

    async fn scroll_and_collect(
        &self,
        window: WindowId,
        rect: CaptureRect,
        initial: PageMetrics,
    ) -> CaptureResult<CaptureRun> {
        let step = scroll_step(initial.viewport_height);
        let tolerance = self.timing.edge_tolerance;
        let mut frames: Vec<CaptureFrame> = Vec::new();
        let mut latest = initial;
        let mut target_y = rect.y0;
        let mut stalled_stops = 0u32;

        loop {
            let page_y = self.driver.scroll_to(target_y).await?;
            sleep(self.timing.scroll_delay).await;
            latest = self.settle(self.timing.settle_timeout, latest).await;

            let bytes = self.limiter.acquire(self.source.as_ref(), window).await?;
            let frame = CaptureFrame::new(page_y, bytes);
            match frames.last_mut() {
                Some(previous) if previous.page_offset_y == page_y => {
                    debug!(page_y, "Scroll did not move, replacing previous frame");
                    *previous = frame;
                    stalled_stops += 1;
                }
                _ => {
                    debug!(page_y, target_y, frame = frames.len(), "Captured frame");
                    frames.push(frame);
                    stalled_stops = 0;
                }
            }

            let visible_bottom = page_y.saturating_add(latest.viewport_height);
            let reached_end = if rect.has_hard_bottom() {
                visible_bottom.saturating_add(tolerance) >= rect.y1
            } else if visible_bottom.saturating_add(tolerance) < latest.doc_height {
                false
            } else {
                latest = self
                    .settle(self.timing.bottom_recheck_timeout, latest)
                    .await;
                let grew = visible_bottom.saturating_add(tolerance) < latest.doc_height;
                if grew {
                    debug!(
                        doc_height = latest.doc_height,
                        "Document grew after reaching bottom"
                    );
                }
                !grew
            };

            if reached_end {
                break;
            }
            if stalled_stops >= self.timing.max_stalled_stops {
                warn!(
                    page_y,
                    stalled_stops, "Page stopped scrolling before the end, finishing early"
                );
                break;
            }
            target_y = page_y.saturating_add(step);
        }

        Ok(CaptureRun {
            frames,
            initial_metrics: initial,
            final_metrics: latest,
            rect,
        })
    }
}
