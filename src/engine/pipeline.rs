// src/engine/pipeline.rs
//
// Resize stage: fit-inside dimension math and Lanczos3 resampling through
// fast_image_resize, with an image-crate fallback.

use crate::error::ShrinkError;
use fast_image_resize::{self as fir, MulDiv, PixelType, ResizeOptions};
use image::{imageops::FilterType, DynamicImage, RgbImage, RgbaImage};
use std::borrow::Cow;

#[derive(Debug)]
pub struct ResizeError {
    pub source_dims: (u32, u32),
    pub target_dims: (u32, u32),
    pub reason: String,
}

impl ResizeError {
    pub fn new(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_dims,
            target_dims,
            reason: reason.into(),
        }
    }
}

impl From<ResizeError> for ShrinkError {
    fn from(err: ResizeError) -> Self {
        ShrinkError::resize_failed(err.source_dims, err.target_dims, err.reason)
    }
}

/// Dimensions after scaling so the longer side equals `long_side`,
/// preserving aspect ratio. Never upscales: images whose longer side already
/// fits are returned unchanged. The shorter side is rounded and kept >= 1.
pub fn calc_fit_dimensions(orig_w: u32, orig_h: u32, long_side: u32) -> (u32, u32) {
    let longer = orig_w.max(orig_h);
    if longer <= long_side || longer == 0 {
        return (orig_w, orig_h);
    }
    let long_side = long_side.max(1);
    let scale = long_side as f64 / longer as f64;
    let scaled = |side: u32| ((side as f64 * scale).round() as u32).clamp(1, long_side);
    if orig_w >= orig_h {
        (long_side, scaled(orig_h))
    } else {
        (scaled(orig_w), long_side)
    }
}

/// Resize `img` so its longer side is at most `long_side`.
/// Borrows the input untouched when no resize is needed.
pub fn resize_to_fit(
    img: &DynamicImage,
    long_side: u32,
) -> std::result::Result<Cow<'_, DynamicImage>, ResizeError> {
    let (w, h) = (img.width(), img.height());
    let (dst_w, dst_h) = calc_fit_dimensions(w, h, long_side);
    if (dst_w, dst_h) == (w, h) {
        return Ok(Cow::Borrowed(img));
    }
    fast_resize(img, dst_w, dst_h).map(Cow::Owned)
}

fn lanczos3() -> ResizeOptions {
    ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3))
}

/// Pixel layout the resizer works in. Other layouts are converted first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    Rgb,
    Rgba,
}

impl Layout {
    fn of(img: &DynamicImage) -> Self {
        if img.color().has_alpha() {
            Layout::Rgba
        } else {
            Layout::Rgb
        }
    }

    fn pixel_type(self) -> PixelType {
        match self {
            Layout::Rgb => PixelType::U8x3,
            Layout::Rgba => PixelType::U8x4,
        }
    }

    /// Owned copy of the pixels; every search tier resizes from the original.
    fn pixels(self, img: &DynamicImage) -> Vec<u8> {
        match (self, img) {
            (Layout::Rgb, DynamicImage::ImageRgb8(rgb)) => rgb.as_raw().clone(),
            (Layout::Rgba, DynamicImage::ImageRgba8(rgba)) => rgba.as_raw().clone(),
            (Layout::Rgb, other) => other.to_rgb8().into_raw(),
            (Layout::Rgba, other) => other.to_rgba8().into_raw(),
        }
    }

    fn wrap(self, width: u32, height: u32, pixels: Vec<u8>) -> Option<DynamicImage> {
        match self {
            Layout::Rgb => RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8),
            Layout::Rgba => {
                RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8)
            }
        }
    }

    fn convert(self, img: DynamicImage) -> DynamicImage {
        match (self, img) {
            (Layout::Rgb, img @ DynamicImage::ImageRgb8(_)) => img,
            (Layout::Rgba, img @ DynamicImage::ImageRgba8(_)) => img,
            (Layout::Rgb, other) => DynamicImage::ImageRgb8(other.to_rgb8()),
            (Layout::Rgba, other) => DynamicImage::ImageRgba8(other.to_rgba8()),
        }
    }
}

/// Resize a borrowed image to exactly `dst_width` x `dst_height`.
///
/// The output is RGB8, or RGBA8 when the input carries alpha.
pub fn fast_resize(
    img: &DynamicImage,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, ResizeError> {
    let src = (img.width(), img.height());
    let dst = (dst_width, dst_height);

    if src.0 == 0 || src.1 == 0 || dst.0 == 0 || dst.1 == 0 {
        return Err(ResizeError::new(src, dst, "invalid dimensions for resize"));
    }

    let layout = Layout::of(img);
    match resize_with_fir(layout, src, dst, layout.pixels(img)) {
        Ok(resized) => Ok(resized),
        Err(reason) => {
            tracing::warn!(%reason, "fast_image_resize failed, using image crate fallback");
            let resized = img.resize_exact(dst.0, dst.1, FilterType::Lanczos3);
            Ok(layout.convert(resized))
        }
    }
}

/// Screenshots are usually fully opaque; skipping premultiplication for them
/// saves two passes over the buffer.
fn has_translucency(rgba: &[u8]) -> bool {
    rgba.iter().skip(3).step_by(4).any(|&alpha| alpha != 255)
}

fn resize_with_fir(
    layout: Layout,
    (src_width, src_height): (u32, u32),
    (dst_width, dst_height): (u32, u32),
    pixels: Vec<u8>,
) -> std::result::Result<DynamicImage, String> {
    let pixel_type = layout.pixel_type();
    let premultiply = layout == Layout::Rgba && has_translucency(&pixels);

    let mut src_image = fir::images::Image::from_vec_u8(src_width, src_height, pixels, pixel_type)
        .map_err(|e| format!("fir source image error: {e:?}"))?;
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, pixel_type);

    let mul_div = MulDiv::default();
    if premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }

    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, &lanczos3())
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    layout
        .wrap(dst_width, dst_height, dst_image.into_vec())
        .ok_or_else(|| "resized buffer does not match target dimensions".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, GrayImage, RgbImage, RgbaImage};

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    mod fit_calc_tests {
        use super::*;

        #[test]
        fn test_landscape_fits_width() {
            assert_eq!(calc_fit_dimensions(3000, 2000, 1568), (1568, 1045));
        }

        #[test]
        fn test_portrait_fits_height() {
            assert_eq!(calc_fit_dimensions(2000, 3000, 1568), (1045, 1568));
        }

        #[test]
        fn test_square_image() {
            assert_eq!(calc_fit_dimensions(1000, 1000, 800), (800, 800));
        }

        #[test]
        fn test_never_upscales() {
            assert_eq!(calc_fit_dimensions(500, 300, 1568), (500, 300));
            assert_eq!(calc_fit_dimensions(1568, 10, 1568), (1568, 10));
        }

        #[test]
        fn test_extreme_aspect_keeps_one_pixel() {
            assert_eq!(calc_fit_dimensions(10000, 1, 800), (800, 1));
            assert_eq!(calc_fit_dimensions(1, 10000, 800), (1, 800));
        }

        #[test]
        fn test_rounding_behavior() {
            // 101:51 -> 50:25.24... rounds to 25
            assert_eq!(calc_fit_dimensions(101, 51, 50), (50, 25));
        }
    }

    #[test]
    fn resize_to_fit_borrows_when_small_enough() {
        let img = create_test_image(64, 32);
        let out = resize_to_fit(&img, 64).unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
    }

    #[test]
    fn resize_to_fit_shrinks_longer_side() {
        let img = create_test_image(200, 100);
        let out = resize_to_fit(&img, 50).unwrap();
        assert_eq!(out.dimensions(), (50, 25));
    }

    #[test]
    fn fast_resize_rejects_zero_target() {
        let img = create_test_image(1, 1);
        let err = fast_resize(&img, 0, 10).expect_err("expected resize failure");
        assert_eq!(err.source_dims, (1, 1));
        assert_eq!(err.target_dims, (0, 10));
        assert!(err.reason.contains("invalid dimensions"));
        let shrink_err: ShrinkError = err.into();
        assert!(shrink_err.is_encode_error());
    }

    #[test]
    fn fast_resize_keeps_alpha_channel() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(40, 40, |x, _| {
            image::Rgba([255, 0, 0, if x < 20 { 0 } else { 255 }])
        }));
        let out = fast_resize(&img, 20, 20).unwrap();
        assert!(out.color().has_alpha());
        assert_eq!(out.dimensions(), (20, 20));
        // Far right column stays opaque red.
        let px = out.to_rgba8().get_pixel(19, 10).0;
        assert!(px[0] >= 250 && px[1] <= 5 && px[2] <= 5, "unexpected pixel {px:?}");
        assert!(px[3] >= 250);
    }

    #[test]
    fn fast_resize_converts_grayscale() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(30, 10, image::Luma([77])));
        let out = fast_resize(&img, 15, 5).unwrap();
        assert_eq!(out.dimensions(), (15, 5));
        assert!(!out.color().has_alpha());
    }
}
