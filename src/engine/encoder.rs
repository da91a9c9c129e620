// src/engine/encoder.rs
//
// Encoder operations: lossless PNG (image + oxipng) and lossy JPEG (mozjpeg).

use crate::engine::common::run_with_panic_policy;
use crate::error::ShrinkError;
use image::{DynamicImage, ImageFormat, RgbImage};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::borrow::Cow;
use std::io::Cursor;

use crate::engine::MAX_DIMENSION;

type EncoderResult<T> = std::result::Result<T, ShrinkError>;

/// Highest oxipng preset accepted in settings.
pub const MAX_PNG_OPTIMIZATION: u8 = 6;

/// Knobs that change how the codecs run, never what the search decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    /// oxipng preset, 0 (fast) ..= 6 (smallest)
    pub png_optimization: u8,
    /// Skip mozjpeg's scan/Huffman optimisation for faster encodes
    pub jpeg_fast_mode: bool,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            png_optimization: 2,
            jpeg_fast_mode: false,
        }
    }
}

/// Quality bands used to derive mozjpeg smoothing from a 0-100 quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QualityBand {
    High,
    Balanced,
    Fast,
    Fastest,
}

#[derive(Debug, Clone, Copy)]
pub struct QualitySettings {
    quality: u8,
}

impl QualitySettings {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.min(100),
        }
    }

    fn band(&self) -> QualityBand {
        if self.quality >= 85 {
            QualityBand::High
        } else if self.quality >= 70 {
            QualityBand::Balanced
        } else if self.quality >= 50 {
            QualityBand::Fast
        } else {
            QualityBand::Fastest
        }
    }

    /// mozjpeg smoothing factor; lower quality bands smooth more.
    pub fn jpeg_smoothing(&self) -> u8 {
        match self.band() {
            QualityBand::High => 0,
            QualityBand::Balanced => 5,
            QualityBand::Fast => 10,
            QualityBand::Fastest => 18,
        }
    }
}

/// Flatten to RGB for JPEG, compositing transparent pixels over white.
fn to_jpeg_rgb(img: &DynamicImage) -> Cow<'_, RgbImage> {
    match img {
        DynamicImage::ImageRgb8(rgb) => Cow::Borrowed(rgb),
        other if other.color().has_alpha() => {
            let rgba = other.to_rgba8();
            let (w, h) = rgba.dimensions();
            let mut rgb = RgbImage::new(w, h);
            for (dst, src) in rgb.pixels_mut().zip(rgba.pixels()) {
                let [r, g, b, a] = src.0;
                let a = a as u32;
                let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
                dst.0 = [blend(r), blend(g), blend(b)];
            }
            Cow::Owned(rgb)
        }
        other => Cow::Owned(other.to_rgb8()),
    }
}

/// Encode to JPEG using mozjpeg.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> EncoderResult<Vec<u8>> {
    encode_jpeg_with_settings(img, quality, false)
}

/// Encode to JPEG with explicit fast mode control
///
/// # Arguments
/// * `img` - Image to encode
/// * `quality` - Quality (0-100)
/// * `fast_mode` - If true, disables expensive optimizations for faster encoding
pub fn encode_jpeg_with_settings(
    img: &DynamicImage,
    quality: u8,
    fast_mode: bool,
) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let settings = QualitySettings::new(quality);
        let rgb = to_jpeg_rgb(img);
        let (w, h) = rgb.dimensions();
        let pixels: &[u8] = rgb.as_raw();

        if w == 0 || h == 0 {
            return Err(ShrinkError::encode_failed(
                "jpeg",
                "invalid image dimensions: width or height is zero",
            ));
        }

        if w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(ShrinkError::dimension_exceeds_limit(w.max(h), MAX_DIMENSION));
        }

        let expected_len = (w as usize) * (h as usize) * 3;
        if pixels.len() != expected_len {
            return Err(ShrinkError::corrupted_image());
        }

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(settings.quality as f32);

        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();

        if fast_mode {
            comp.set_optimize_coding(false);
            comp.set_optimize_scans(false);
        } else {
            comp.set_optimize_coding(true);
            comp.set_optimize_scans(true);
            comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);
        }
        comp.set_smoothing_factor(settings.jpeg_smoothing());

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);

        {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                ShrinkError::encode_failed(
                    "jpeg",
                    format!("mozjpeg: failed to start compress: {e:?}"),
                )
            })?;

            let stride = w as usize * 3;
            for row in pixels.chunks(stride) {
                writer.write_scanlines(row).map_err(|e| {
                    ShrinkError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }

            writer.finish().map_err(|e| {
                ShrinkError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;
        }

        Ok(output)
    })
}

/// Encode to PNG using the image crate, then recompress losslessly with oxipng.
pub fn encode_png(img: &DynamicImage, optimization: u8) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        if img.width() == 0 || img.height() == 0 {
            return Err(ShrinkError::encode_failed(
                "png",
                "invalid image dimensions: width or height is zero",
            ));
        }

        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| ShrinkError::encode_failed("png", format!("PNG encode failed: {e}")))?;

        let mut options = oxipng::Options::from_preset(optimization.min(MAX_PNG_OPTIMIZATION));
        // Output goes straight to the clipboard; ancillary chunks are dead weight.
        options.strip = oxipng::StripChunks::Safe;

        let optimized = oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
            ShrinkError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })?;

        if optimized.len() <= buf.len() {
            Ok(optimized)
        } else {
            Ok(buf)
        }
    })
}
