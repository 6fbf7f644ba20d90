//! Common test utilities and helpers for the longshot tests
//!
//! This module provides page builders, scripted collaborators and pixel
//! assertions shared by the integration tests.

#![allow(dead_code)]

/// Synthetic page renderings
pub mod pages {
    use image::{Rgba, RgbaImage};

    /// Every device row gets a distinct color so stitched output can be
    /// compared row by row.
    pub fn row_color(y: u32) -> Rgba<u8> {
        Rgba([(y % 256) as u8, ((y / 256) % 256) as u8, 0x5a, 255])
    }

    /// A page rendering of `width` x `height` device pixels.
    pub fn striped_document(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |_, y| row_color(y))
    }
}

/// Scripted collaborators
pub mod fakes {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};
    use longshot::capture::{PageDriver, ViewportSource, WindowId};
    use longshot::error::{CaptureError, CaptureResult};
    use longshot::layout::geometry::PageMetrics;
    use longshot::processing::CodeImageProvider;

    /// Hands out a solid black code image and counts requests.
    #[derive(Default)]
    pub struct CountingCodeProvider {
        pub calls: AtomicUsize,
    }

    impl CountingCodeProvider {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CodeImageProvider for CountingCodeProvider {
        async fn fetch_code(&self, _link: &str) -> Option<Arc<RgbaImage>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(Arc::new(RgbaImage::from_pixel(90, 90, Rgba([0, 0, 0, 255]))))
        }
    }

    /// A page whose driver fails on the n-th scroll.
    pub struct BrokenScroll<P> {
        pub inner: Arc<P>,
        pub fail_on: usize,
        pub scrolls: AtomicUsize,
    }

    impl<P> BrokenScroll<P> {
        pub fn new(inner: Arc<P>, fail_on: usize) -> Self {
            Self {
                inner,
                fail_on,
                scrolls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl<P: PageDriver> PageDriver for BrokenScroll<P> {
        async fn page_metrics(&self) -> CaptureResult<PageMetrics> {
            self.inner.page_metrics().await
        }

        async fn scroll_to(&self, y: u32) -> CaptureResult<u32> {
            let n = self.scrolls.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.fail_on {
                return Err(CaptureError::page_driver("scroll", "tab was closed"));
            }
            self.inner.scroll_to(y).await
        }
    }

    #[async_trait]
    impl<P: ViewportSource> ViewportSource for BrokenScroll<P> {
        async fn capture_visible_viewport(&self, window: WindowId) -> CaptureResult<Vec<u8>> {
            self.inner.capture_visible_viewport(window).await
        }
    }

    /// A page that refuses to scroll past `ceiling`, as when a sticky
    /// overlay or scroll lock swallows further scrolling.
    pub struct ScrollCeiling<P> {
        pub inner: Arc<P>,
        pub ceiling: u32,
    }

    impl<P> ScrollCeiling<P> {
        pub fn new(inner: Arc<P>, ceiling: u32) -> Self {
            Self { inner, ceiling }
        }
    }

    #[async_trait]
    impl<P: PageDriver> PageDriver for ScrollCeiling<P> {
        async fn page_metrics(&self) -> CaptureResult<PageMetrics> {
            self.inner.page_metrics().await
        }

        async fn scroll_to(&self, y: u32) -> CaptureResult<u32> {
            self.inner.scroll_to(y.min(self.ceiling)).await
        }
    }

    #[async_trait]
    impl<P: ViewportSource> ViewportSource for ScrollCeiling<P> {
        async fn capture_visible_viewport(&self, window: WindowId) -> CaptureResult<Vec<u8>> {
            self.inner.capture_visible_viewport(window).await
        }
    }
}

/// Harness wiring a simulated page into a pipeline with in-memory sessions
pub mod harness {
    use std::path::PathBuf;
    use std::sync::Arc;

    use longshot::capture::simulated::SimulatedViewport;
    use longshot::capture::{
        CaptureRateLimiter, CaptureTarget, PageDriver, ScrollCoordinator, SimulatedPage,
        ViewportSource, WindowId,
    };
    use longshot::config::UiLanguage;
    use longshot::layout::geometry::CropBounds;
    use longshot::layout::presets::{FooterScope, OutputMode, OutputQuality};
    use longshot::output::ArtifactWriter;
    use longshot::processing::{CodeImageProvider, FooterCompositor, NoCodeProvider};
    use longshot::session::{ManualClock, MemoryBlobStore, MemoryKvStore, SessionStore};
    use longshot::{CaptureRequest, Pipeline};
    use tempfile::TempDir;

    use super::pages::striped_document;

    pub const T0: u64 = 1_700_000_000_000;

    pub struct Harness {
        pub pipeline: Pipeline,
        pub page: Arc<SimulatedPage>,
        pub clock: Arc<ManualClock>,
        pub out: TempDir,
    }

    impl Harness {
        pub fn out_dir(&self) -> PathBuf {
            self.out.path().to_path_buf()
        }
    }

    pub fn viewport(width: u32, height: u32, dpr: f64) -> SimulatedViewport {
        SimulatedViewport {
            width,
            height,
            device_pixel_ratio: dpr,
            ..SimulatedViewport::default()
        }
    }

    /// Simulated page over a striped document of `doc_css_height` CSS px.
    pub fn page(view: SimulatedViewport, doc_css_height: u32) -> SimulatedPage {
        let scale = view.device_pixel_ratio;
        let document = striped_document(
            (f64::from(view.width) * scale) as u32,
            (f64::from(doc_css_height) * scale) as u32,
        );
        SimulatedPage::new(document, view).unwrap()
    }

    pub fn harness(page: SimulatedPage) -> Harness {
        harness_with(page, Arc::new(NoCodeProvider))
    }

    pub fn harness_with(page: SimulatedPage, codes: Arc<dyn CodeImageProvider>) -> Harness {
        let page = Arc::new(page);
        build(page.clone(), page.clone(), page, codes)
    }

    pub fn build(
        page: Arc<SimulatedPage>,
        driver: Arc<dyn PageDriver>,
        source: Arc<dyn ViewportSource>,
        codes: Arc<dyn CodeImageProvider>,
    ) -> Harness {
        let out = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(T0));
        let sessions = SessionStore::new(
            Arc::new(MemoryKvStore::new()),
            Arc::new(MemoryBlobStore::new()),
        )
        .with_clock(clock.clone());
        let coordinator =
            ScrollCoordinator::new(driver, source, Arc::new(CaptureRateLimiter::default()));
        let pipeline = Pipeline::new(
            FooterCompositor::new(codes, None),
            sessions,
            ArtifactWriter::new(out.path(), "longshot"),
        )
        .with_coordinator(coordinator);
        Harness {
            pipeline,
            page,
            clock,
            out,
        }
    }

    pub fn request(mode: OutputMode) -> CaptureRequest {
        CaptureRequest {
            target: CaptureTarget {
                tab_id: Some(11),
                window_id: Some(WindowId(2)),
                page_url: Some("https://example.com/long-article".to_string()),
            },
            output_mode: mode,
            quality: OutputQuality::Standard,
            max_height: 0,
            crop: CropBounds::default(),
            footer_url: String::new(),
            footer_scope: FooterScope::None,
            language: UiLanguage::En,
        }
    }
}

/// Custom assertions for testing
pub mod assertions {
    use image::RgbaImage;

    use super::pages::row_color;

    /// Assert that rows `0..image.height()` of `image` show document device
    /// rows starting at `first_row`.
    pub fn assert_rows_from(image: &RgbaImage, first_row: u32) {
        for y in 0..image.height() {
            assert_eq!(
                *image.get_pixel(image.width() / 2, y),
                row_color(first_row + y),
                "row {y} should show document row {}",
                first_row + y
            );
        }
    }

    /// Assert that stacking `parts` top to bottom yields document rows
    /// `0..expected_rows` with nothing duplicated or dropped.
    pub fn assert_parts_reassemble(parts: &[RgbaImage], expected_rows: u32) {
        let mut next = 0;
        for part in parts {
            for y in 0..part.height() {
                assert_eq!(
                    *part.get_pixel(0, y),
                    row_color(next),
                    "document row {next} missing or duplicated"
                );
                next += 1;
            }
        }
        assert_eq!(next, expected_rows, "reassembled height");
    }
}
