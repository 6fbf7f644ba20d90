//! End-to-end capture tests against the simulated page.
//!
//! Time is paused so the 700ms acquisition spacing, settle polling and
//! retry backoff run instantly.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::assertions::assert_rows_from;
use common::fakes::{BrokenScroll, CountingCodeProvider, ScrollCeiling};
use common::harness::{T0, build, harness, harness_with, page, request, viewport};
use longshot::capture::{CaptureRateLimiter, ScrollCoordinator, WindowId};
use longshot::error::classify;
use longshot::layout::boundaries::FOOTER_HEIGHT;
use longshot::layout::geometry::CropBounds;
use longshot::layout::presets::{FooterScope, OutputMode, OutputQuality};
use longshot::processing::NoCodeProvider;
use longshot::CaptureOutcome;

fn saved(outcome: CaptureOutcome) -> std::path::PathBuf {
    match outcome {
        CaptureOutcome::Saved { path, .. } => path,
        other => panic!("expected a saved image, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn long_capture_reproduces_the_document() {
    let h = harness(page(viewport(120, 300, 1.0), 1000).with_scroll(150));
    let outcome = h.pipeline.run_capture(request(OutputMode::Long)).await.unwrap();

    let path = saved(outcome);
    assert_eq!(path, h.out_dir().join(format!("longshot_{T0}.png")));
    let image = image::open(&path).unwrap().to_rgba8();
    assert_eq!(image.dimensions(), (120, 1000));
    assert_rows_from(&image, 0);

    // Scroll stops advance by viewport minus overlap, and the page is put back.
    let calls = h.page.scroll_calls();
    assert_eq!(&calls[..4], &[0, 220, 440, 660]);
    assert_eq!(*calls.last().unwrap(), 150);
    assert_eq!(h.page.scroll_y(), 150);
}

#[tokio::test(start_paused = true)]
async fn crop_and_device_pixels_at_max_quality() {
    let h = harness(page(viewport(200, 300, 2.0), 1000));
    let mut req = request(OutputMode::Long);
    req.quality = OutputQuality::Max;
    req.crop = CropBounds::from_raw(Some(50.0), Some(150.0), Some(100.0), Some(600.0));

    let image = image::open(saved(h.pipeline.run_capture(req).await.unwrap()))
        .unwrap()
        .to_rgba8();
    assert_eq!(image.dimensions(), (200, 1000));
    // Output row 0 is CSS row 100, device row 200.
    assert_rows_from(&image, 200);
}

#[tokio::test(start_paused = true)]
async fn height_cap_stops_scrolling_early() {
    let h = harness(page(viewport(100, 300, 1.0), 4000));
    let mut req = request(OutputMode::Long);
    req.max_height = 700;

    let image = image::open(saved(h.pipeline.run_capture(req).await.unwrap()))
        .unwrap()
        .to_rgba8();
    assert_eq!(image.height(), 700);
    assert_rows_from(&image, 0);
    assert!(h.page.capture_count() <= 3);
}

#[tokio::test(start_paused = true)]
async fn lazy_loaded_content_is_included() {
    let h = harness(page(viewport(100, 300, 1.0), 1400).with_lazy_growth(600, 300));
    let image = image::open(saved(
        h.pipeline.run_capture(request(OutputMode::Long)).await.unwrap(),
    ))
    .unwrap()
    .to_rgba8();
    assert_eq!(image.height(), 1400);
    assert_rows_from(&image, 0);
}

#[tokio::test(start_paused = true)]
async fn throttled_snapshots_are_retried() {
    let h = harness(page(viewport(100, 300, 1.0), 600));
    h.page.throttle_next(3);
    let image = image::open(saved(
        h.pipeline.run_capture(request(OutputMode::Long)).await.unwrap(),
    ))
    .unwrap()
    .to_rgba8();
    assert_eq!(image.height(), 600);
}

#[tokio::test(start_paused = true)]
async fn persistent_throttling_fails_and_restores_scroll() {
    let h = harness(page(viewport(100, 300, 1.0), 600).with_scroll(90));
    h.page.throttle_next(4);
    let err = h
        .pipeline
        .run_capture(request(OutputMode::Long))
        .await
        .unwrap_err();
    assert!(err.is_throttled());
    assert_eq!(h.page.scroll_y(), 90);
    assert!(std::fs::read_dir(h.out_dir()).unwrap().next().is_none());
}

#[tokio::test(start_paused = true)]
async fn driver_failure_mid_run_restores_scroll() {
    let sim = Arc::new(page(viewport(100, 300, 1.0), 2000).with_scroll(40));
    let broken = Arc::new(BrokenScroll::new(sim.clone(), 3));
    let h = build(sim.clone(), broken.clone(), broken, Arc::new(NoCodeProvider));

    let err = h
        .pipeline
        .run_capture(request(OutputMode::Long))
        .await
        .unwrap_err();
    assert_eq!(err.category(), "page_driver");
    assert_eq!(sim.scroll_y(), 40);
}

#[tokio::test(start_paused = true)]
async fn cancelled_capture_still_restores_scroll() {
    let sim = Arc::new(page(viewport(100, 300, 1.0), 2000).with_scroll(40));
    let coordinator = ScrollCoordinator::new(
        sim.clone(),
        sim.clone(),
        Arc::new(CaptureRateLimiter::default()),
    );

    let cancelled = tokio::time::timeout(
        Duration::from_secs(2),
        coordinator.capture(WindowId(2), &CropBounds::default(), 0),
    )
    .await;
    assert!(cancelled.is_err(), "capture should still be scrolling");
    // Dropped mid-run; the page is left wherever the loop had reached.
    assert!(sim.scroll_calls().len() > 1);
    assert_ne!(sim.scroll_y(), 40);

    for _ in 0..8 {
        if sim.scroll_y() == 40 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(sim.scroll_y(), 40);
    assert_eq!(sim.scroll_calls().last(), Some(&40));
}

#[tokio::test(start_paused = true)]
async fn stuck_scrolling_replaces_frames_then_gives_up() {
    let sim = Arc::new(page(viewport(100, 300, 1.0), 2000));
    let stuck = Arc::new(ScrollCeiling::new(sim.clone(), 500));
    let coordinator = ScrollCoordinator::new(
        stuck.clone(),
        stuck,
        Arc::new(CaptureRateLimiter::default()),
    );
    assert_eq!(coordinator.timing().max_stalled_stops, 3);

    let run = coordinator
        .capture(WindowId(2), &CropBounds::default(), 0)
        .await
        .unwrap();

    // One frame per distinct scroll position, in order.
    let offsets: Vec<u32> = run.frames.iter().map(|f| f.page_offset_y).collect();
    assert_eq!(offsets, vec![0, 220, 440, 500]);
    // Three more stops landed on 500 and each replaced the previous frame.
    assert_eq!(sim.capture_count(), 7);
    assert_eq!(
        sim.scroll_calls(),
        vec![0, 220, 440, 500, 500, 500, 500, 0]
    );
    assert_eq!(sim.scroll_y(), 0);
    assert_eq!(run.final_metrics.doc_height, 2000);
}

#[tokio::test(start_paused = true)]
async fn invalid_requests_never_scroll() {
    let h = harness(page(viewport(100, 300, 1.0), 600));

    let mut req = request(OutputMode::Long);
    req.target.page_url = Some("file:///tmp/page.html".to_string());
    let err = h.pipeline.run_capture(req).await.unwrap_err();
    assert!(classify::is_rejected_input(&err));
    assert_eq!(classify::exit_code(&err), 2);

    let mut req = request(OutputMode::Long);
    req.footer_url = "::not a url::".to_string();
    assert!(h.pipeline.run_capture(req).await.is_err());

    assert!(h.page.scroll_calls().is_empty());
    assert_eq!(h.page.capture_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn long_image_gets_footer_band() {
    let codes = Arc::new(CountingCodeProvider::default());
    let h = harness_with(page(viewport(400, 300, 1.0), 500), codes.clone());
    let mut req = request(OutputMode::Long);
    req.footer_url = "https://example.com/long-article".to_string();
    req.footer_scope = FooterScope::Last;

    let image = image::open(saved(h.pipeline.run_capture(req).await.unwrap()))
        .unwrap()
        .to_rgba8();
    assert_eq!(image.dimensions(), (400, 500 + FOOTER_HEIGHT));
    let content = image::imageops::crop_imm(&image, 0, 0, 400, 500).to_image();
    assert_rows_from(&content, 0);
    assert_ne!(*image.get_pixel(5, 500 + FOOTER_HEIGHT / 2), image::Rgba([255, 255, 255, 255]));
    assert_eq!(codes.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn footer_needs_both_link_and_scope() {
    let codes = Arc::new(CountingCodeProvider::default());
    let h = harness_with(page(viewport(100, 300, 1.0), 500), codes.clone());
    let mut req = request(OutputMode::Long);
    req.footer_url = "https://example.com/".to_string();
    req.footer_scope = FooterScope::None;

    let image = image::open(saved(h.pipeline.run_capture(req).await.unwrap()))
        .unwrap()
        .to_rgba8();
    assert_eq!(image.height(), 500);
    assert_eq!(codes.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn crop_bounds_are_remembered_per_page() {
    let h = harness(page(viewport(100, 300, 1.0), 1000));
    let mut req = request(OutputMode::Long);
    req.crop = CropBounds::from_raw(None, None, Some(100.0), Some(400.0));
    let first = image::open(saved(h.pipeline.run_capture(req).await.unwrap()))
        .unwrap()
        .to_rgba8();
    assert_eq!(first.height(), 300);

    h.clock.advance(std::time::Duration::from_millis(5));
    let second = image::open(saved(
        h.pipeline.run_capture(request(OutputMode::Long)).await.unwrap(),
    ))
    .unwrap()
    .to_rgba8();
    assert_eq!(second.height(), 300);
    assert_rows_from(&second, 100);
}
