// SPDX-License-Identifier: MIT
//! # Capture Geometry
//!
//! Turns a page-metrics snapshot plus optional crop bounds and an optional
//! height cap into the canonical rectangle that the coordinator scrolls
//! through and the stitcher composes.
//!
//! ## Coordinate Spaces
//!
//! - **Page (CSS) pixels**: everything in [`PageMetrics`], [`CropBounds`] and
//!   [`CaptureRect`]. Vertical values are measured from the top of the
//!   scrollable document, not the viewport.
//! - **Device pixels**: page pixels multiplied by the device pixel ratio;
//!   this is what a raw viewport snapshot contains.
//! - **Render pixels**: page pixels multiplied by [`render_scale`]; this is
//!   what the composed image contains.

use serde::{Deserialize, Serialize};

use crate::presets::OutputQuality;

/// Snapshot of the scrollable page as reported by the page driver.
///
/// Each read is fresh: the page may grow or resize between two snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetrics {
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Left edge of the scroll root inside the visible viewport.
    pub viewport_offset_x: u32,
    /// Top edge of the scroll root inside the visible viewport.
    pub viewport_offset_y: u32,
    pub doc_width: u32,
    pub doc_height: u32,
    pub scroll_x: u32,
    pub scroll_y: u32,
    pub device_pixel_ratio: f64,
}

impl Default for PageMetrics {
    fn default() -> Self {
        Self {
            viewport_width: 1,
            viewport_height: 1,
            viewport_offset_x: 0,
            viewport_offset_y: 0,
            doc_width: 1,
            doc_height: 1,
            scroll_x: 0,
            scroll_y: 0,
            device_pixel_ratio: 1.0,
        }
    }
}

impl PageMetrics {
    /// Device pixel ratio with non-finite and sub-1 values treated as 1.
    pub fn effective_dpr(&self) -> f64 {
        if self.device_pixel_ratio.is_finite() && self.device_pixel_ratio > 0.0 {
            self.device_pixel_ratio
        } else {
            1.0
        }
    }

    /// Whether any of the layout values the settle check watches differ.
    pub fn layout_changed(&self, other: &PageMetrics) -> bool {
        self.doc_height != other.doc_height
            || self.doc_width != other.doc_width
            || self.scroll_y != other.scroll_y
            || self.viewport_height != other.viewport_height
    }
}

/// Optional crop edges in page coordinates. `None` means unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBounds {
    pub left: Option<u32>,
    pub right: Option<u32>,
    pub top: Option<u32>,
    pub bottom: Option<u32>,
}

impl CropBounds {
    /// Build bounds from untrusted floating-point input.
    ///
    /// Non-finite values drop the edge, negatives clamp to 0, fractions are
    /// floored. The result is [`normalized`](Self::normalized).
    pub fn from_raw(
        left: Option<f64>,
        right: Option<f64>,
        top: Option<f64>,
        bottom: Option<f64>,
    ) -> Self {
        fn edge(value: Option<f64>) -> Option<u32> {
            let v = value?;
            if !v.is_finite() {
                return None;
            }
            Some(v.max(0.0).floor().min(u32::MAX as f64) as u32)
        }
        Self {
            left: edge(left),
            right: edge(right),
            top: edge(top),
            bottom: edge(bottom),
        }
        .normalized()
    }

    /// Swap inverted pairs so that `left <= right` and `top <= bottom`.
    pub fn normalized(mut self) -> Self {
        if let (Some(l), Some(r)) = (self.left, self.right) {
            if l > r {
                self.left = Some(r);
                self.right = Some(l);
            }
        }
        if let (Some(t), Some(b)) = (self.top, self.bottom) {
            if t > b {
                self.top = Some(b);
                self.bottom = Some(t);
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none() && self.top.is_none() && self.bottom.is_none()
    }
}

/// The canonical region to capture, in page pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureRect {
    pub x0: u32,
    pub y0: u32,
    /// Exclusive bottom edge, always `y0 + height`.
    pub y1: u32,
    pub width: u32,
    pub height: u32,
    /// The caller supplied an explicit bottom crop line.
    pub has_explicit_bottom_bound: bool,
    /// `max_height` shortened the rectangle.
    pub height_capped: bool,
}

impl CaptureRect {
    /// Whether scrolling should stop at `y1` rather than at the document end.
    pub fn has_hard_bottom(&self) -> bool {
        self.has_explicit_bottom_bound || self.height_capped
    }
}

/// Resolve the capture rectangle for a page snapshot.
///
/// `max_height == 0` means unlimited. Width and height are never below 1,
/// and `x0 + width` and `y0 + height` always fit in a `u32`.
pub fn resolve_capture_rect(
    metrics: &PageMetrics,
    bounds: &CropBounds,
    max_height: u32,
) -> CaptureRect {
    let bounds = bounds.normalized();
    let x0 = bounds.left.unwrap_or(0).min(u32::MAX - 1);
    let max_visible_right = metrics.viewport_width.max(x0.saturating_add(1));
    let requested_right = bounds.right.unwrap_or(metrics.viewport_width);
    let x1 = x0
        .saturating_add(1)
        .max(requested_right.min(max_visible_right));

    let y0 = bounds.top.unwrap_or(0).min(u32::MAX - 1);
    let requested_bottom = bounds.bottom.unwrap_or(metrics.doc_height);
    let y1 = y0
        .saturating_add(1)
        .max(requested_bottom.min(metrics.doc_height));

    let width = x1.saturating_sub(x0).max(1);
    let mut height = y1.saturating_sub(y0).max(1);
    let mut height_capped = false;
    if max_height > 0 && max_height < height {
        height = max_height;
        height_capped = true;
    }

    CaptureRect {
        x0,
        y0,
        y1: y0 + height,
        width,
        height,
        has_explicit_bottom_bound: bounds.bottom.is_some(),
        height_capped,
    }
}

/// Output pixels per CSS pixel for a device pixel ratio and quality choice.
pub fn render_scale(device_pixel_ratio: f64, quality: OutputQuality) -> f64 {
    let dpr = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
        device_pixel_ratio
    } else {
        1.0
    };
    match quality {
        OutputQuality::Standard => 1.0,
        OutputQuality::High => dpr.min(1.5).max(1.0),
        OutputQuality::Max => dpr.max(1.0),
    }
}

/// Scroll overlap between consecutive stops: 15% of the viewport, at least 80px.
pub fn scroll_overlap(viewport_height: u32) -> u32 {
    ((viewport_height as f64 * 0.15).floor() as u32).max(80)
}

/// Distance between consecutive scroll stops, at least 100px.
pub fn scroll_step(viewport_height: u32) -> u32 {
    viewport_height
        .saturating_sub(scroll_overlap(viewport_height))
        .max(100)
}
