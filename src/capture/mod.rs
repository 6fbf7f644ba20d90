//! # Capture Module
//!
//! Scroll-and-snapshot capture of a page taller than its viewport.
//!
//! ## Architecture
//!
//! The capture side talks to two external collaborators through traits:
//! 1. **PageDriver**: reports [`PageMetrics`] and scrolls the page
//! 2. **ViewportSource**: returns a PNG snapshot of the visible viewport
//!
//! [`coordinator::ScrollCoordinator`] drives both through a sequence of
//! overlapping scroll stops, pacing every acquisition through a shared
//! [`rate_limit::CaptureRateLimiter`] and waiting for the layout to settle
//! ([`settle`]) before each snapshot.
//!
//! [`simulated::SimulatedPage`] implements both traits over a tall source
//! image and backs the CLI and tests.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use longshot_layout::geometry::PageMetrics;

use crate::error::CaptureResult;

pub mod coordinator;
pub mod rate_limit;
pub mod settle;
pub mod simulated;

pub use coordinator::{CaptureRun, CaptureTiming, ScrollCoordinator};
pub use rate_limit::{CaptureRateLimiter, RetryPolicy};
pub use settle::SettlePolicy;
pub use simulated::SimulatedPage;

/// Opaque handle of the window whose viewport is snapshotted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window#{}", self.0)
    }
}

/// What a capture request is aimed at.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaptureTarget {
    pub tab_id: Option<u64>,
    pub window_id: Option<WindowId>,
    /// URL of the page being captured; used for scheme checks and crop persistence.
    pub page_url: Option<String>,
}

/// One viewport snapshot tagged with the page scroll offset it was taken at.
#[derive(Clone, Debug)]
pub struct CaptureFrame {
    /// Actual vertical scroll position (CSS px) when the snapshot was taken.
    pub page_offset_y: u32,
    /// Encoded snapshot bytes (PNG), shared rather than copied.
    pub raw_image: Arc<Vec<u8>>,
}

impl CaptureFrame {
    pub fn new(page_offset_y: u32, raw_image: Vec<u8>) -> Self {
        Self {
            page_offset_y,
            raw_image: Arc::new(raw_image),
        }
    }
}

/// Host-page capability: metrics, scrolling and settle detection.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Fresh snapshot of the page layout.
    async fn page_metrics(&self) -> CaptureResult<PageMetrics>;

    /// Scroll so that `y` is the top of the viewport. Returns the actual
    /// resulting scroll position, which may be clamped.
    async fn scroll_to(&self, y: u32) -> CaptureResult<u32>;

    /// Poll metrics until the layout stops changing or `timeout` elapses.
    async fn wait_for_settled(&self, timeout: Duration) -> CaptureResult<PageMetrics> {
        settle::poll_until_settled(self, &SettlePolicy::with_timeout(timeout)).await
    }
}

/// Viewport acquisition capability.
///
/// Implementations report "too many calls" as
/// [`CaptureError::Throttled`](crate::error::CaptureError::Throttled) so the
/// rate limiter can retry it.
#[async_trait]
pub trait ViewportSource: Send + Sync {
    async fn capture_visible_viewport(&self, window: WindowId) -> CaptureResult<Vec<u8>>;
}
