//! In-process page backed by a tall source image.
//!
//! The source image is the fully rendered document in device pixels. The
//! simulated browser window places the scroll root at a configurable offset
//! inside the viewport (think fixed app chrome), clamps scrolling like a real
//! scroll container and can reveal the bottom of the document lazily, the
//! way infinite-scroll pages do.

use std::io::Cursor;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage, imageops};
use longshot_layout::geometry::PageMetrics;
use tracing::debug;

use super::rate_limit::{THROTTLE_SIGNAL, classify_acquisition_failure};
use super::{PageDriver, ViewportSource, WindowId};
use crate::error::{CaptureError, CaptureResult};

/// Fill used for the window area outside the scroll root.
const CHROME_FILL: Rgba<u8> = Rgba([32, 33, 36, 255]);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulatedViewport {
    /// Scroll root size in CSS px.
    pub width: u32,
    pub height: u32,
    pub device_pixel_ratio: f64,
    /// Scroll root position inside the window, CSS px.
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Default for SimulatedViewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
            device_pixel_ratio: 1.0,
            offset_x: 0,
            offset_y: 0,
        }
    }
}

#[derive(Debug)]
struct PageState {
    scroll_y: u32,
    /// Currently revealed document height, CSS px.
    doc_height: u32,
    /// CSS px still hidden below the revealed height.
    pending_growth: u32,
    pending_throttles: u32,
    captures: u32,
    scroll_calls: Vec<u32>,
}

#[derive(Debug)]
pub struct SimulatedPage {
    document: RgbaImage,
    viewport: SimulatedViewport,
    grow_by: u32,
    state: Mutex<PageState>,
}

impl SimulatedPage {
    /// Build a page from `document`, a device-pixel rendering of the whole page.
    pub fn new(document: RgbaImage, viewport: SimulatedViewport) -> CaptureResult<Self> {
        let dpr = viewport.device_pixel_ratio;
        if !dpr.is_finite() || dpr <= 0.0 {
            return Err(CaptureError::validation(
                "device_pixel_ratio",
                "must be a positive number",
                dpr.to_string(),
            ));
        }
        if viewport.width == 0 || viewport.height == 0 {
            return Err(CaptureError::validation(
                "viewport",
                "must be at least 1x1",
                format!("{}x{}", viewport.width, viewport.height),
            ));
        }
        let css_height = ((f64::from(document.height()) / dpr).floor() as u32).max(1);
        Ok(Self {
            document,
            viewport,
            grow_by: 0,
            state: Mutex::new(PageState {
                scroll_y: 0,
                doc_height: css_height,
                pending_growth: 0,
                pending_throttles: 0,
                captures: 0,
                scroll_calls: Vec::new(),
            }),
        })
    }

    /// Decode `bytes` as the document image.
    pub fn from_encoded(bytes: &[u8], viewport: SimulatedViewport) -> CaptureResult<Self> {
        let document = image::load_from_memory(bytes)?.to_rgba8();
        Self::new(document, viewport)
    }

    /// Hide the bottom `hidden` CSS px and reveal `grow_by` of it every time
    /// the metrics are read while scrolled to the revealed end.
    pub fn with_lazy_growth(self, hidden: u32, grow_by: u32) -> Self {
        {
            let mut state = self.lock();
            let hidden = hidden.min(state.doc_height.saturating_sub(1));
            state.doc_height -= hidden;
            state.pending_growth = hidden;
        }
        Self {
            grow_by: grow_by.max(1),
            ..self
        }
    }

    /// Start scrolled to `y` (clamped).
    pub fn with_scroll(self, y: u32) -> Self {
        {
            let mut state = self.lock();
            let max = state.doc_height.saturating_sub(self.viewport.height);
            state.scroll_y = y.min(max);
        }
        self
    }

    /// Fail the next `count` snapshots with the throttling signal.
    pub fn throttle_next(&self, count: u32) {
        self.lock().pending_throttles = count;
    }

    pub fn capture_count(&self) -> u32 {
        self.lock().captures
    }

    /// Every scroll target requested so far, in order.
    pub fn scroll_calls(&self) -> Vec<u32> {
        self.lock().scroll_calls.clone()
    }

    pub fn scroll_y(&self) -> u32 {
        self.lock().scroll_y
    }

    fn lock(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn device_px(&self, css: u32) -> u32 {
        (f64::from(css) * self.viewport.device_pixel_ratio).round() as u32
    }

    fn metrics_locked(&self, state: &PageState) -> PageMetrics {
        let doc_width = ((f64::from(self.document.width()) / self.viewport.device_pixel_ratio)
            .floor() as u32)
            .max(1);
        PageMetrics {
            viewport_width: self.viewport.width,
            viewport_height: self.viewport.height,
            viewport_offset_x: self.viewport.offset_x,
            viewport_offset_y: self.viewport.offset_y,
            doc_width,
            doc_height: state.doc_height.max(self.viewport.height),
            scroll_x: 0,
            scroll_y: state.scroll_y,
            device_pixel_ratio: self.viewport.device_pixel_ratio,
        }
    }

    fn render_viewport(&self, scroll_y: u32, doc_height: u32) -> RgbaImage {
        let window_w = self.device_px(self.viewport.offset_x + self.viewport.width);
        let window_h = self.device_px(self.viewport.offset_y + self.viewport.height);
        let mut frame = RgbaImage::from_pixel(window_w.max(1), window_h.max(1), CHROME_FILL);

        // Scroll root background, then whatever part of the document is revealed.
        let root_x = self.device_px(self.viewport.offset_x);
        let root_y = self.device_px(self.viewport.offset_y);
        let root_w = self.device_px(self.viewport.width);
        let root_h = self.device_px(self.viewport.height);
        let blank = RgbaImage::from_pixel(root_w.max(1), root_h.max(1), Rgba([255, 255, 255, 255]));
        imageops::replace(&mut frame, &blank, i64::from(root_x), i64::from(root_y));

        let src_y = self.device_px(scroll_y);
        let revealed_bottom = self.device_px(doc_height).min(self.document.height());
        let copy_h = root_h.min(revealed_bottom.saturating_sub(src_y));
        let copy_w = root_w.min(self.document.width());
        if copy_h > 0 && copy_w > 0 {
            let visible = imageops::crop_imm(&self.document, 0, src_y, copy_w, copy_h).to_image();
            imageops::replace(&mut frame, &visible, i64::from(root_x), i64::from(root_y));
        }
        frame
    }
}

#[async_trait]
impl PageDriver for SimulatedPage {
    async fn page_metrics(&self) -> CaptureResult<PageMetrics> {
        let mut state = self.lock();
        let at_end = state.scroll_y + self.viewport.height >= state.doc_height;
        if at_end && state.pending_growth > 0 {
            let step = self.grow_by.min(state.pending_growth);
            state.doc_height += step;
            state.pending_growth -= step;
            debug!(doc_height = state.doc_height, "Simulated page revealed more content");
        }
        Ok(self.metrics_locked(&state))
    }

    async fn scroll_to(&self, y: u32) -> CaptureResult<u32> {
        let mut state = self.lock();
        state.scroll_calls.push(y);
        let max = state.doc_height.saturating_sub(self.viewport.height);
        state.scroll_y = y.min(max);
        Ok(state.scroll_y)
    }
}

#[async_trait]
impl ViewportSource for SimulatedPage {
    async fn capture_visible_viewport(&self, window: WindowId) -> CaptureResult<Vec<u8>> {
        let (scroll_y, doc_height) = {
            let mut state = self.lock();
            if state.pending_throttles > 0 {
                state.pending_throttles -= 1;
                return Err(classify_acquisition_failure(&format!(
                    "This request exceeds the {THROTTLE_SIGNAL} quota."
                )));
            }
            state.captures += 1;
            (state.scroll_y, state.doc_height)
        };

        let frame = self.render_viewport(scroll_y, doc_height);
        let mut bytes = Vec::new();
        frame
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| CaptureError::frame_capture(format!("{window}: {e}")))?;
        Ok(bytes)
    }
}
