//! Caption text: font loading, measurement, ellipsis fitting and glyph painting.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tiny_skia::{FillRule, Paint, Path as SkPath, PathBuilder, Pixmap, Transform};
use tracing::{debug, warn};
use ttf_parser::{Face, GlyphId, OutlineBuilder};

use crate::config::UiLanguage;

const ELLIPSIS: &str = "...";

/// Bold UI faces tried when no caption font is configured.
const LATIN_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\segoeuib.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

const CJK_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Bold.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Bold.ttc",
    "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Bold.ttc",
    "/System/Library/Fonts/PingFang.ttc",
    "C:\\Windows\\Fonts\\msyhbd.ttc",
];

/// A parsed-on-demand TrueType/OpenType face.
#[derive(Clone, Debug)]
pub struct CaptionFont {
    data: Arc<Vec<u8>>,
}

impl CaptionFont {
    /// Wrap font bytes; `None` when they do not parse as a face.
    pub fn from_bytes(data: Vec<u8>) -> Option<Self> {
        Face::parse(&data, 0).ok()?;
        Some(Self {
            data: Arc::new(data),
        })
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let bytes = std::fs::read(path).ok()?;
        Self::from_bytes(bytes)
    }

    /// Resolve the caption font: the configured path first, then system
    /// candidates for `language`.
    pub fn discover(configured: Option<&Path>, language: UiLanguage) -> Option<Self> {
        if let Some(path) = configured {
            match Self::from_path(path) {
                Some(font) => return Some(font),
                None => warn!(path = %path.display(), "Configured caption font is unusable"),
            }
        }
        let candidates: Vec<PathBuf> = match language {
            UiLanguage::Zh => CJK_FONT_CANDIDATES
                .iter()
                .chain(LATIN_FONT_CANDIDATES)
                .map(PathBuf::from)
                .collect(),
            UiLanguage::En => LATIN_FONT_CANDIDATES.iter().map(PathBuf::from).collect(),
        };
        let found = candidates.iter().find_map(|path| Self::from_path(path));
        if found.is_none() {
            debug!(language = language.as_str(), "No caption font found, glyphs will be skipped");
        }
        found
    }

    fn face(&self) -> Option<Face<'_>> {
        Face::parse(&self.data, 0).ok()
    }
}

/// Horizontal advance of `text` at `size` px.
///
/// Without a font, ASCII counts as 0.55em and everything else as 1em.
pub fn measure_text(font: Option<&CaptionFont>, text: &str, size: f32) -> f32 {
    let Some(face) = font.and_then(CaptionFont::face) else {
        return estimate_text_width(text, size);
    };
    let units_per_em = f32::from(face.units_per_em().max(1));
    text.chars()
        .map(|ch| {
            let advance = face
                .glyph_index(ch)
                .and_then(|gid| face.glyph_hor_advance(gid))
                .map(|units| f32::from(units) / units_per_em * size)
                .unwrap_or(0.0);
            if advance > 0.0 { advance } else { size * 0.5 }
        })
        .sum()
}

pub fn estimate_text_width(text: &str, size: f32) -> f32 {
    text.chars()
        .map(|ch| if ch.is_ascii() { size * 0.55 } else { size })
        .sum()
}

/// Ascent plus descent at `size`, falling back to 0.8em + 0.2em.
pub fn text_height(font: Option<&CaptionFont>, size: f32) -> f32 {
    font.and_then(CaptionFont::face)
        .map(|face| {
            let units_per_em = f32::from(face.units_per_em().max(1));
            let ascent = f32::from(face.ascender()).max(0.0);
            let descent = f32::from(face.descender()).abs();
            (ascent + descent) / units_per_em * size
        })
        .filter(|height| *height > 0.0)
        .unwrap_or(size)
}

/// Longest prefix of `text` (in characters) that fits `max_width` once
/// followed by `...`. Text that already fits is returned unchanged.
pub fn fit_text<F>(text: &str, max_width: f32, measure: F) -> String
where
    F: Fn(&str) -> f32,
{
    if text.is_empty() {
        return String::new();
    }
    if measure(text) <= max_width {
        return text.to_string();
    }

    let chars: Vec<char> = text.chars().collect();
    let candidate = |len: usize| -> String {
        let mut out: String = chars[..len].iter().collect();
        out.push_str(ELLIPSIS);
        out
    };

    let mut low = 0usize;
    let mut high = chars.len();
    while low < high {
        let mid = (low + high).div_ceil(2);
        if measure(&candidate(mid)) <= max_width {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    candidate(low)
}

/// Fill `text` with its baseline starting at (`x`, `baseline`), in the
/// coordinate space of `transform`. Returns the number of glyphs drawn.
#[allow(clippy::too_many_arguments)]
pub fn draw_text(
    pixmap: &mut Pixmap,
    font: &CaptionFont,
    text: &str,
    x: f32,
    baseline: f32,
    size: f32,
    paint: &Paint<'_>,
    transform: Transform,
) -> usize {
    let Some(face) = font.face() else {
        return 0;
    };
    let units_per_em = f32::from(face.units_per_em().max(1));
    let scale = size / units_per_em;

    let mut pen_x = x;
    let mut drawn = 0;
    for ch in text.chars() {
        let Some(gid) = face.glyph_index(ch) else {
            pen_x += size * 0.5;
            continue;
        };
        let mut builder = GlyphPathBuilder::new(pen_x, baseline, scale);
        if face.outline_glyph(gid, &mut builder).is_some() {
            if let Some(path) = builder.finish() {
                pixmap.fill_path(&path, paint, FillRule::Winding, transform, None);
                drawn += 1;
            }
        }
        let advance = glyph_advance(&face, gid, scale);
        pen_x += if advance > 0.0 { advance } else { size * 0.5 };
    }
    drawn
}

fn glyph_advance(face: &Face<'_>, gid: GlyphId, scale: f32) -> f32 {
    face.glyph_hor_advance(gid)
        .map(|units| f32::from(units) * scale)
        .unwrap_or(0.0)
}

/// Font units (y up) to pixmap coordinates (y down) at a pen origin.
struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn x(&self, x: f32) -> f32 {
        self.origin_x + x * self.scale
    }

    fn y(&self, y: f32) -> f32 {
        self.origin_y - y * self.scale
    }

    fn finish(self) -> Option<SkPath> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (px, py) = (self.x(x), self.y(y));
        self.builder.move_to(px, py);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (px, py) = (self.x(x), self.y(y));
        self.builder.line_to(px, py);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (cx, cy, px, py) = (self.x(x1), self.y(y1), self.x(x), self.y(y));
        self.builder.quad_to(cx, cy, px, py);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (c1x, c1y) = (self.x(x1), self.y(y1));
        let (c2x, c2y) = (self.x(x2), self.y(y2));
        let (px, py) = (self.x(x), self.y(y));
        self.builder.cubic_to(c1x, c1y, c2x, c2y, px, py);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}
