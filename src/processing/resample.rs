// Region extraction and resampling built on fast_image_resize (SIMD-accelerated).
// RGBA8 in, RGBA8 out. Frames arrive at device pixel density and are drawn at
// the render scale, so most regions need a resize; equal sizes are copied.

use fast_image_resize as fir;
use fir::images::{TypedImage, TypedImageRef};
use fir::pixels::U8x4;
use fir::{ResizeOptions, Resizer};
use image::RgbaImage;

use crate::error::{CaptureError, CaptureResult};

/// Source rectangle in pixels of a decoded frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Clip to `bounds`; `None` when nothing remains.
    pub fn clipped_to(self, bounds_w: u32, bounds_h: u32) -> Option<Self> {
        if self.x >= bounds_w || self.y >= bounds_h {
            return None;
        }
        let width = self.width.min(bounds_w - self.x);
        let height = self.height.min(bounds_h - self.y);
        (width > 0 && height > 0).then_some(Self {
            width,
            height,
            ..self
        })
    }
}

fn fir_error(operation: &str, e: impl std::fmt::Display) -> CaptureError {
    CaptureError::processing(operation, e.to_string())
}

/// Copy `region` of `src` into a tightly packed buffer.
fn compact_rows(src: &RgbaImage, region: Region) -> Vec<u8> {
    let pitch = src.width() as usize * 4;
    let row_bytes = region.width as usize * 4;
    let x_bytes = region.x as usize * 4;
    let raw = src.as_raw();
    let mut out = Vec::with_capacity(row_bytes * region.height as usize);
    for row in region.y as usize..(region.y + region.height) as usize {
        let start = row * pitch + x_bytes;
        out.extend_from_slice(&raw[start..start + row_bytes]);
    }
    out
}

/// Extract `region` from `src` and resize it to `dst_w` x `dst_h`.
///
/// `region` must already lie inside `src` (see [`Region::clipped_to`]).
pub fn resample_region(
    resizer: &mut Resizer,
    src: &RgbaImage,
    region: Region,
    dst_w: u32,
    dst_h: u32,
) -> CaptureResult<RgbaImage> {
    let tight = compact_rows(src, region);
    if region.width == dst_w && region.height == dst_h {
        return RgbaImage::from_raw(dst_w, dst_h, tight).ok_or_else(|| {
            CaptureError::processing("copy region", "region buffer size mismatch")
        });
    }

    let src_view = TypedImageRef::<U8x4>::from_buffer(region.width, region.height, &tight)
        .map_err(|e| fir_error("wrap source region", e))?;
    let mut dst = vec![0u8; dst_w as usize * dst_h as usize * 4];
    {
        let mut dst_view = TypedImage::<U8x4>::from_buffer(dst_w, dst_h, &mut dst)
            .map_err(|e| fir_error("wrap destination", e))?;
        let opts = ResizeOptions::new().use_alpha(false);
        resizer
            .resize_typed::<U8x4>(&src_view, &mut dst_view, &opts)
            .map_err(|e| fir_error("resize region", e))?;
    }
    RgbaImage::from_raw(dst_w, dst_h, dst)
        .ok_or_else(|| CaptureError::processing("resize region", "destination size mismatch"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 0, 255]))
    }

    #[test]
    fn clipping_trims_and_rejects() {
        let region = Region {
            x: 10,
            y: 10,
            width: 50,
            height: 50,
        };
        assert_eq!(
            region.clipped_to(40, 30),
            Some(Region {
                x: 10,
                y: 10,
                width: 30,
                height: 20
            })
        );
        assert_eq!(region.clipped_to(10, 100), None);
    }

    #[test]
    fn equal_size_is_an_exact_copy() {
        let src = gradient(64, 64);
        let mut resizer = Resizer::new();
        let region = Region {
            x: 4,
            y: 8,
            width: 16,
            height: 10,
        };
        let out = resample_region(&mut resizer, &src, region, 16, 10).unwrap();
        assert_eq!(out.dimensions(), (16, 10));
        assert_eq!(*out.get_pixel(0, 0), Rgba([4, 8, 0, 255]));
        assert_eq!(*out.get_pixel(15, 9), Rgba([19, 17, 0, 255]));
    }

    #[test]
    fn downscale_halves_dimensions() {
        let src = RgbaImage::from_pixel(40, 20, Rgba([200, 100, 50, 255]));
        let mut resizer = Resizer::new();
        let region = Region {
            x: 0,
            y: 0,
            width: 40,
            height: 20,
        };
        let out = resample_region(&mut resizer, &src, region, 20, 10).unwrap();
        assert_eq!(out.dimensions(), (20, 10));
        let got = out.get_pixel(10, 5);
        for (channel, want) in [200u8, 100, 50].into_iter().enumerate() {
            assert!(got[channel].abs_diff(want) <= 1, "{got:?}");
        }
    }
}
