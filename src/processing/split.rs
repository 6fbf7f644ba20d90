//! Cutting a composed long image into parts at content boundaries.

use image::{Rgba, RgbaImage, imageops};
use longshot_layout::boundaries::{
    FOOTER_HEIGHT, footer_pixel_height, normalize_boundaries, pixel_cuts,
};
use longshot_layout::presets::FooterScope;
use tracing::debug;

use super::footer::FooterArtwork;
use super::stitch::ComposedImage;
use crate::error::CaptureResult;

/// One output part.
#[derive(Clone, Debug)]
pub struct SplitPart {
    /// 1-based position, top to bottom.
    pub index: usize,
    pub image: RgbaImage,
    /// Content rows of the source image this part carries.
    pub source_rows: std::ops::Range<u32>,
    pub has_footer: bool,
}

pub struct Splitter;

impl Splitter {
    /// Split the content of `composed` at `boundaries` (CSS px).
    ///
    /// Boundaries are normalized against the content height first, so any
    /// input is accepted; an empty set yields a single part. When `footer`
    /// is present, parts selected by `scope` get a footer band appended.
    pub fn split(
        composed: &ComposedImage,
        boundaries: &[u32],
        footer: Option<&FooterArtwork>,
        scope: FooterScope,
    ) -> CaptureResult<Vec<SplitPart>> {
        let raw: Vec<f64> = boundaries.iter().map(|b| f64::from(*b)).collect();
        let clean = normalize_boundaries(&raw, composed.content_css_height());
        let content_rows = composed.content_pixel_height();
        let cuts = pixel_cuts(&clean, composed.pixel_ratio, content_rows);
        let part_count = cuts.len().saturating_sub(1).max(1);
        let footer_rows = footer_pixel_height(FOOTER_HEIGHT, composed.pixel_ratio);
        let width = composed.pixel_width();

        let mut parts = Vec::with_capacity(part_count);
        for (index, pair) in cuts.windows(2).enumerate() {
            let (start, end) = (pair[0], pair[1]);
            let with_footer = footer.is_some() && scope.applies_to(index, part_count);
            let band = if with_footer { footer_rows } else { 0 };

            let mut canvas =
                RgbaImage::from_pixel(width, end - start + band, Rgba([255, 255, 255, 255]));
            let slice = imageops::crop_imm(&composed.image, 0, start, width, end - start).to_image();
            imageops::replace(&mut canvas, &slice, 0, 0);
            if let Some(artwork) = footer.filter(|_| with_footer) {
                artwork.paint(&mut canvas, end - start, composed.pixel_ratio)?;
            }

            parts.push(SplitPart {
                index: index + 1,
                image: canvas,
                source_rows: start..end,
                has_footer: with_footer,
            });
        }

        debug!(
            requested = boundaries.len(),
            kept = clean.len(),
            parts = parts.len(),
            "Split long image"
        );
        Ok(parts)
    }
}
