//! Frame stitching: turn the captured viewport frames into one tall image.
//!
//! Frames are drawn in page order. Each frame contributes the rows between
//! the larger of its own top, the capture top and the previous frame's bottom
//! (minus a 2px redraw seam) and the smaller of its own bottom and the capture
//! bottom. Whatever the frames never reached is trimmed off before the footer
//! is painted, so the output never ends in blank rows.

use std::io::Cursor;

use fast_image_resize::Resizer;
use image::{ImageFormat, Rgba, RgbaImage, imageops};
use longshot_layout::boundaries::FOOTER_HEIGHT;
use longshot_layout::geometry::{CropBounds, PageMetrics, render_scale, resolve_capture_rect};
use longshot_layout::presets::OutputQuality;
use tracing::{debug, instrument, trace};

use super::footer::FooterArtwork;
use super::resample::{Region, resample_region};
use crate::capture::CaptureFrame;
use crate::error::{CaptureError, CaptureResult};

/// Rows re-drawn from the next frame to hide seams at frame joins.
const SEAM_REDRAW: u32 = 2;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// A composed long image and its CSS geometry.
#[derive(Clone, Debug)]
pub struct ComposedImage {
    pub image: RgbaImage,
    /// Width in CSS px.
    pub css_width: u32,
    /// Height in CSS px, footer included.
    pub css_height: u32,
    /// Output pixels per CSS pixel.
    pub pixel_ratio: f64,
    /// CSS px of footer at the bottom of `image` (0 or the footer height).
    pub footer_css_height: u32,
}

impl ComposedImage {
    /// Wrap an already decoded image, e.g. one reloaded from a session.
    pub fn from_parts(
        image: RgbaImage,
        css_width: u32,
        css_height: u32,
        pixel_ratio: f64,
        footer_css_height: u32,
    ) -> Self {
        Self {
            image,
            css_width,
            css_height,
            pixel_ratio,
            footer_css_height,
        }
    }

    pub fn pixel_width(&self) -> u32 {
        self.image.width()
    }

    pub fn pixel_height(&self) -> u32 {
        self.image.height()
    }

    pub fn content_css_height(&self) -> u32 {
        self.css_height.saturating_sub(self.footer_css_height).max(1)
    }

    /// Pixel rows above the footer band.
    pub fn content_pixel_height(&self) -> u32 {
        if self.footer_css_height == 0 {
            return self.pixel_height();
        }
        let rows = (f64::from(self.content_css_height()) * self.pixel_ratio).floor() as u32;
        rows.clamp(1, self.pixel_height().max(1))
    }

    pub fn encode_png(&self) -> CaptureResult<Vec<u8>> {
        encode_png(&self.image)
    }
}

pub fn encode_png(image: &RgbaImage) -> CaptureResult<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| CaptureError::processing("encode png", e.to_string()))?;
    Ok(bytes)
}

/// Everything the stitcher needs from a finished capture run.
pub struct StitchRequest<'a> {
    pub frames: &'a [CaptureFrame],
    /// Page metrics at the end of the run.
    pub metrics: PageMetrics,
    pub crop: CropBounds,
    pub max_height: u32,
    pub quality: OutputQuality,
    /// Present when the long image carries a footer.
    pub footer: Option<&'a FooterArtwork>,
}

pub struct Stitcher {
    resizer: Resizer,
}

impl Default for Stitcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Stitcher {
    pub fn new() -> Self {
        Self {
            resizer: Resizer::new(),
        }
    }

    #[instrument(skip_all, fields(frames = request.frames.len()))]
    pub fn compose(&mut self, request: StitchRequest<'_>) -> CaptureResult<ComposedImage> {
        let metrics = request.metrics;
        let rect = resolve_capture_rect(&metrics, &request.crop, request.max_height);
        let dpr = metrics.effective_dpr();
        let scale = render_scale(dpr, request.quality);

        if request.frames.is_empty() {
            debug!("No frames captured, emitting a blank image");
            return Ok(ComposedImage::from_parts(
                RgbaImage::from_pixel(1, 1, WHITE),
                1,
                1,
                scale,
                0,
            ));
        }

        let footer_css = if request.footer.is_some() {
            FOOTER_HEIGHT
        } else {
            0
        };
        let width_px = to_px(rect.width, scale);
        let content_px = to_px(rect.height, scale);
        let mut surface = RgbaImage::from_pixel(width_px, content_px, WHITE);

        let mut frames: Vec<&CaptureFrame> = request.frames.iter().collect();
        frames.sort_by_key(|frame| frame.page_offset_y);

        let mut last_draw_bottom = rect.y0;
        for frame in frames {
            let frame_top = frame.page_offset_y;
            let draw_top = frame_top
                .max(rect.y0)
                .max(last_draw_bottom.saturating_sub(SEAM_REDRAW));
            let draw_bottom = frame_top
                .saturating_add(metrics.viewport_height)
                .min(rect.y1);
            if draw_bottom <= draw_top {
                trace!(frame_top, "Frame adds no rows");
                continue;
            }

            let decoded = image::load_from_memory(&frame.raw_image)?.to_rgba8();
            let src_x = scaled_floor(metrics.viewport_offset_x.saturating_add(rect.x0), dpr);
            let src_y = scaled_floor(
                metrics
                    .viewport_offset_y
                    .saturating_add(draw_top - frame_top),
                dpr,
            );
            let region = Region {
                x: src_x,
                y: src_y,
                width: scaled_floor(rect.width, dpr),
                height: scaled_floor(draw_bottom - draw_top, dpr),
            };
            let Some(region) = region.clipped_to(decoded.width(), decoded.height()) else {
                debug!(frame_top, "Frame region lies outside the snapshot");
                continue;
            };

            let dest_y = ((f64::from(draw_top - rect.y0)) * scale).floor() as u32;
            let dest_w = ((f64::from(region.width) / dpr) * scale).floor() as u32;
            let dest_h = ((f64::from(region.height) / dpr) * scale).floor() as u32;
            if dest_w == 0 || dest_h == 0 {
                continue;
            }
            let piece = resample_region(&mut self.resizer, &decoded, region, dest_w, dest_h)?;
            imageops::replace(&mut surface, &piece, 0, i64::from(dest_y));
            last_draw_bottom = last_draw_bottom.max(draw_bottom);
            trace!(frame_top, draw_top, draw_bottom, dest_y, "Drew frame");
        }

        let drawn_css = last_draw_bottom.saturating_sub(rect.y0);
        let content_css = drawn_css.min(rect.height).max(1);
        if content_css != rect.height {
            debug!(
                planned = rect.height,
                drawn = content_css,
                "Trimming undrawn rows"
            );
        }

        let kept_rows = to_px(content_css, scale).min(surface.height());
        let total_rows = to_px(content_css + footer_css, scale).max(kept_rows);
        let mut output = RgbaImage::from_pixel(width_px, total_rows, WHITE);
        let kept = imageops::crop_imm(&surface, 0, 0, width_px, kept_rows).to_image();
        imageops::replace(&mut output, &kept, 0, 0);
        if let Some(footer) = request.footer {
            footer.paint(&mut output, kept_rows, scale)?;
        }

        debug!(
            width = width_px,
            height = total_rows,
            css_height = content_css + footer_css,
            scale,
            "Composed long image"
        );
        Ok(ComposedImage::from_parts(
            output,
            rect.width,
            content_css + footer_css,
            scale,
            footer_css,
        ))
    }
}

fn to_px(css: u32, scale: f64) -> u32 {
    ((f64::from(css) * scale).floor() as u32).max(1)
}

fn scaled_floor(css: u32, dpr: f64) -> u32 {
    (f64::from(css) * dpr).floor() as u32
}
