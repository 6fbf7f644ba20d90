//! # Footer Compositor
//!
//! Paints the informational footer band: a diagonal gradient, two soft
//! decorative circles, a rounded card holding a framed scannable code and a
//! one-line caption.
//!
//! Layout is expressed in CSS pixels inside a band of
//! [`FOOTER_HEIGHT`] px and scaled to the target surface, so the same
//! footer looks identical on a 1x composed image and on a 2x split part.
//! Locale only changes the caption text and its size.
//!
//! Painting happens in two phases: [`FooterCompositor::prepare`] fetches the
//! code image and resolves the font (async, may degrade), then
//! [`FooterArtwork::paint`] draws synchronously and is deterministic.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use image::{Rgba, RgbaImage};
use longshot_layout::boundaries::FOOTER_HEIGHT;
use tiny_skia::{
    Color, ColorU8, FillRule, FilterQuality, GradientStop, LinearGradient, Paint, Path,
    PathBuilder, Pixmap, PixmapPaint, Point, Rect, Shader, SpreadMode, Transform,
};
use tracing::debug;

use super::code_image::CodeImageProvider;
use super::text::{CaptionFont, draw_text, fit_text, measure_text, text_height};
use crate::config::UiLanguage;
use crate::error::{CaptureError, CaptureResult};

const CARD_INSET: f32 = 20.0;
const CARD_RADIUS: f32 = 30.0;
const CODE_FRAME_SIZE: f32 = 148.0;
const CODE_SIZE: f32 = 108.0;
const CODE_FRAME_LEFT: f32 = 26.0;
const CAPTION_GAP: f32 = 30.0;
const CAPTION_RIGHT_PAD: f32 = 28.0;
const CAPTION_MIN_WIDTH: f32 = 120.0;

/// What a footer says: the encoded link and the caption locale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FooterSpec {
    pub link: String,
    pub language: UiLanguage,
}

impl FooterSpec {
    pub fn new(link: impl Into<String>, language: UiLanguage) -> Self {
        Self {
            link: link.into(),
            language,
        }
    }
}

/// A footer with its external resources resolved, ready to paint.
#[derive(Clone, Debug)]
pub struct FooterArtwork {
    pub spec: FooterSpec,
    /// `None` draws the placeholder block.
    pub code: Option<Arc<RgbaImage>>,
    /// `None` skips caption glyphs.
    pub font: Option<CaptionFont>,
}

pub struct FooterCompositor {
    provider: Arc<dyn CodeImageProvider>,
    font_path: Option<PathBuf>,
    latin_font: OnceLock<Option<CaptionFont>>,
    cjk_font: OnceLock<Option<CaptionFont>>,
}

impl FooterCompositor {
    pub fn new(provider: Arc<dyn CodeImageProvider>, font_path: Option<PathBuf>) -> Self {
        Self {
            provider,
            font_path,
            latin_font: OnceLock::new(),
            cjk_font: OnceLock::new(),
        }
    }

    fn font_for(&self, language: UiLanguage) -> Option<CaptionFont> {
        let slot = match language {
            UiLanguage::En => &self.latin_font,
            UiLanguage::Zh => &self.cjk_font,
        };
        slot.get_or_init(|| CaptionFont::discover(self.font_path.as_deref(), language))
            .clone()
    }

    /// Fetch the code image and resolve the caption font for `spec`.
    pub async fn prepare(&self, spec: &FooterSpec) -> FooterArtwork {
        let code = self.provider.fetch_code(&spec.link).await;
        debug!(
            link = %spec.link,
            has_code = code.is_some(),
            language = spec.language.as_str(),
            "Prepared footer artwork"
        );
        FooterArtwork {
            spec: spec.clone(),
            code,
            font: self.font_for(spec.language),
        }
    }
}

impl FooterArtwork {
    /// Paint the footer into rows `band_top..` of `surface`, drawing in CSS
    /// pixels scaled by `scale`.
    pub fn paint(&self, surface: &mut RgbaImage, band_top: u32, scale: f64) -> CaptureResult<()> {
        let band_height = surface.height().saturating_sub(band_top);
        if band_height == 0 || surface.width() == 0 {
            return Ok(());
        }
        let scale = if scale.is_finite() && scale > 0.0 {
            scale as f32
        } else {
            1.0
        };
        let mut pixmap = Pixmap::new(surface.width(), band_height).ok_or_else(|| {
            CaptureError::processing(
                "allocate footer",
                format!("{}x{} is not a valid surface", surface.width(), band_height),
            )
        })?;

        let width = surface.width() as f32 / scale;
        let transform = Transform::from_scale(scale, scale);
        self.paint_css(&mut pixmap, width, transform);

        for (index, pixel) in pixmap.pixels().iter().enumerate() {
            let color = pixel.demultiply();
            let x = index as u32 % surface.width();
            let y = index as u32 / surface.width();
            surface.put_pixel(
                x,
                band_top + y,
                Rgba([color.red(), color.green(), color.blue(), color.alpha()]),
            );
        }
        Ok(())
    }

    fn paint_css(&self, pixmap: &mut Pixmap, width: f32, transform: Transform) {
        let height = FOOTER_HEIGHT as f32;

        let gradient = LinearGradient::new(
            Point::from_xy(0.0, 0.0),
            Point::from_xy(width, height),
            vec![
                GradientStop::new(0.0, hex(0xf7efe5, 1.0)),
                GradientStop::new(0.52, hex(0xefe9ff, 1.0)),
                GradientStop::new(1.0, hex(0xe5f0ff, 1.0)),
            ],
            SpreadMode::Pad,
            Transform::identity(),
        )
        .unwrap_or(Shader::SolidColor(hex(0xefe9ff, 1.0)));
        let background = Paint {
            shader: gradient,
            anti_alias: true,
            ..Paint::default()
        };
        if let Some(rect) = Rect::from_xywh(0.0, 0.0, width, height) {
            pixmap.fill_rect(rect, &background, transform, None);
        }

        fill_circle(pixmap, (width - 112.0).max(84.0), 56.0, 52.0, hex(0xfb923c, 0.7), transform);
        fill_circle(pixmap, 56.0, height - 32.0, 38.0, hex(0x2563eb, 0.7), transform);

        let card_x = CARD_INSET;
        let card_y = CARD_INSET;
        let card_w = (width - 2.0 * CARD_INSET).max(1.0);
        let card_h = height - 2.0 * CARD_INSET;

        // Soft drop shadow: stacked translucent rounded rects, offset down.
        const SHADOW_LAYERS: u32 = 6;
        for layer in 1..=SHADOW_LAYERS {
            let grow = 14.0 * layer as f32 / SHADOW_LAYERS as f32;
            fill_rounded(
                pixmap,
                card_x - grow,
                card_y + 12.0 - grow,
                card_w + 2.0 * grow,
                card_h + 2.0 * grow,
                CARD_RADIUS + grow,
                rgba(15, 23, 42, 0.12 / SHADOW_LAYERS as f32),
                transform,
            );
        }
        fill_rounded(pixmap, card_x, card_y, card_w, card_h, CARD_RADIUS, hex(0xffffff, 0.92), transform);
        fill_rounded(pixmap, card_x, card_y, card_w, card_h, CARD_RADIUS, hex(0xffffff, 0.82), transform);

        let code_x = card_x + CODE_FRAME_LEFT;
        let code_y = card_y + ((card_h - CODE_FRAME_SIZE) / 2.0).floor();
        fill_rounded(pixmap, code_x, code_y, CODE_FRAME_SIZE, CODE_FRAME_SIZE, 30.0, hex(0x111827, 1.0), transform);
        fill_rounded(
            pixmap,
            code_x + 12.0,
            code_y + 12.0,
            CODE_FRAME_SIZE - 24.0,
            CODE_FRAME_SIZE - 24.0,
            20.0,
            hex(0xffffff, 1.0),
            transform,
        );
        let code_drawn = self
            .code
            .as_deref()
            .map(|code| {
                let inset = ((CODE_FRAME_SIZE - CODE_SIZE) / 2.0).floor();
                draw_code(pixmap, code, code_x + inset, code_y + inset, transform)
            })
            .unwrap_or(false);
        if !code_drawn {
            fill_rounded(
                pixmap,
                code_x + 10.0,
                code_y + 10.0,
                CODE_FRAME_SIZE - 20.0,
                CODE_FRAME_SIZE - 20.0,
                18.0,
                hex(0xe2e8f0, 1.0),
                transform,
            );
        }

        let language = self.spec.language;
        let size = language.caption_font_size();
        let text_x = code_x + CODE_FRAME_SIZE + CAPTION_GAP;
        let text_width = (card_x + card_w - text_x - CAPTION_RIGHT_PAD).max(CAPTION_MIN_WIDTH);
        let font = self.font.as_ref();
        let caption = fit_text(language.footer_caption(), text_width, |candidate| {
            measure_text(font, candidate, size)
        });
        let baseline = card_y + ((card_h + text_height(font, size)) / 2.0).floor() - 6.0;
        if let Some(font) = font {
            let mut paint = Paint::default();
            paint.set_color(hex(0x334155, 1.0));
            paint.anti_alias = true;
            draw_text(pixmap, font, &caption, text_x, baseline, size, &paint, transform);
        }
    }
}

fn hex(rgb: u32, alpha: f32) -> Color {
    rgba(
        ((rgb >> 16) & 0xff) as u8,
        ((rgb >> 8) & 0xff) as u8,
        (rgb & 0xff) as u8,
        alpha,
    )
}

fn rgba(r: u8, g: u8, b: u8, alpha: f32) -> Color {
    let mut color = Color::from_rgba8(r, g, b, 255);
    color.set_alpha(alpha.clamp(0.0, 1.0));
    color
}

fn solid(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color);
    paint.anti_alias = true;
    paint
}

fn fill_circle(pixmap: &mut Pixmap, cx: f32, cy: f32, radius: f32, color: Color, transform: Transform) {
    if let Some(path) = PathBuilder::from_circle(cx, cy, radius) {
        pixmap.fill_path(&path, &solid(color), FillRule::Winding, transform, None);
    }
}

#[allow(clippy::too_many_arguments)]
fn fill_rounded(
    pixmap: &mut Pixmap,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    radius: f32,
    color: Color,
    transform: Transform,
) {
    if let Some(path) = rounded_rect(x, y, width, height, radius) {
        pixmap.fill_path(&path, &solid(color), FillRule::Winding, transform, None);
    }
}

/// Rounded rectangle; the radius is clamped to half the shorter side.
fn rounded_rect(x: f32, y: f32, width: f32, height: f32, radius: f32) -> Option<Path> {
    // Cubic approximation of a quarter circle.
    const KAPPA: f32 = 0.552_284_8;
    let r = radius.min(width.min(height) / 2.0).max(0.0);
    let k = r * KAPPA;
    let (right, bottom) = (x + width, y + height);

    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(right - r, y);
    pb.cubic_to(right - r + k, y, right, y + r - k, right, y + r);
    pb.line_to(right, bottom - r);
    pb.cubic_to(right, bottom - r + k, right - r + k, bottom, right - r, bottom);
    pb.line_to(x + r, bottom);
    pb.cubic_to(x + r - k, bottom, x, bottom - r + k, x, bottom - r);
    pb.line_to(x, y + r);
    pb.cubic_to(x, y + r - k, x + r - k, y, x + r, y);
    pb.close();
    pb.finish()
}

fn draw_code(pixmap: &mut Pixmap, code: &RgbaImage, x: f32, y: f32, transform: Transform) -> bool {
    let Some(source) = to_pixmap(code) else {
        return false;
    };
    let placement = transform.pre_translate(x, y).pre_scale(
        CODE_SIZE / code.width() as f32,
        CODE_SIZE / code.height() as f32,
    );
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    pixmap.draw_pixmap(0, 0, source.as_ref(), &paint, placement, None);
    true
}

fn to_pixmap(image: &RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(image.width(), image.height())?;
    for (target, source) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
        let [r, g, b, a] = source.0;
        *target = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Some(pixmap)
}
