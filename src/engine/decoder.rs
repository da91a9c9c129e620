// src/engine/decoder.rs
//
// Decoder operations: JPEG (mozjpeg), PNG (zune-png), everything else via the
// image crate.

use crate::engine::common::run_with_panic_policy;
use crate::error::ShrinkError;
use image::{
    DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, ImageReader, RgbImage, RgbaImage,
};
use mozjpeg::Decompress;
use std::io::Cursor;
use zune_core::bytestream::ZCursor;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

use crate::engine::{MAX_DIMENSION, MAX_PIXELS};

type DecoderResult<T> = std::result::Result<T, ShrinkError>;

/// Header-only view of an encoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderInfo {
    pub width: u32,
    pub height: u32,
    pub format: Option<ImageFormat>,
}

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo)
pub fn decode_jpeg_mozjpeg(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:mozjpeg", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(ShrinkError::decode_failed(
                "mozjpeg: missing JPEG EOI marker",
            ));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            ShrinkError::decode_failed(format!("mozjpeg decompress init failed: {e:?}"))
        })?;

        let mut decompress = decompress.rgb().map_err(|e| {
            ShrinkError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = decompress.width();
        let height = decompress.height();

        if width > MAX_DIMENSION as usize || height > MAX_DIMENSION as usize {
            return Err(ShrinkError::dimension_exceeds_limit(
                width.max(height) as u32,
                MAX_DIMENSION,
            ));
        }
        let width_u32 = width as u32;
        let height_u32 = height as u32;
        check_dimensions(width_u32, height_u32)?;

        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            ShrinkError::decode_failed(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;

        let flat_pixels: Vec<u8> = pixels.into_iter().flatten().collect();

        let rgb_image =
            RgbImage::from_raw(width_u32, height_u32, flat_pixels).ok_or_else(|| {
                ShrinkError::decode_failed("mozjpeg: failed to create image from raw data")
            })?;

        Ok(DynamicImage::ImageRgb8(rgb_image))
    })
}

/// Decode formats without a dedicated fast path (BMP, GIF, TIFF) using the
/// image crate.
pub fn decode_with_image_crate(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:image", || {
        let img = image::load_from_memory(data)
            .map_err(|e| ShrinkError::decode_failed(format!("decode failed: {e}")))?;
        check_dimensions(img.width(), img.height())?;
        Ok(img)
    })
}

/// Decode PNG using zune-png. 16-bit input is stripped to 8-bit.
pub fn decode_png_zune(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:png", || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(ZCursor::new(data), options);

        decoder
            .decode_headers()
            .map_err(|e| ShrinkError::decode_failed(format!("png: invalid header: {e}")))?;
        let info = decoder
            .info()
            .ok_or_else(|| ShrinkError::decode_failed("png: missing header info"))?;
        let width = info.width as u32;
        let height = info.height as u32;
        // Reject before allocating the pixel buffer.
        check_dimensions(width, height)?;

        let pixels = decoder
            .decode()
            .map_err(|e| ShrinkError::decode_failed(format!("png: decode failed: {e}")))?;

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(ShrinkError::decode_failed(
                    "png: unexpected non-U8 pixel buffer",
                ))
            }
        };

        let colorspace = decoder
            .colorspace()
            .ok_or_else(|| ShrinkError::decode_failed("png: missing colorspace"))?;

        let img = match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| ShrinkError::decode_failed("png: failed to build RGB image"))?,
            ColorSpace::RGBA => RgbaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgba8)
                .ok_or_else(|| ShrinkError::decode_failed("png: failed to build RGBA image"))?,
            ColorSpace::Luma => GrayImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| ShrinkError::decode_failed("png: failed to build Luma image"))?,
            ColorSpace::LumaA => GrayAlphaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLumaA8)
                .ok_or_else(|| ShrinkError::decode_failed("png: failed to build LumaA image"))?,
            other => {
                return Err(ShrinkError::decode_failed(format!(
                    "png: unsupported colorspace {:?}",
                    other
                )))
            }
        };

        Ok(img)
    })
}

/// Detect input format using magic bytes. Returns None if unknown.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Unified decode entrypoint:
/// - Detect format once (magic bytes)
/// - Route JPEG to mozjpeg, PNG to zune-png, others to the image crate
/// - Return decoded image and detected format
pub fn decode_image(bytes: &[u8]) -> DecoderResult<(DynamicImage, Option<ImageFormat>)> {
    if bytes.is_empty() {
        return Err(ShrinkError::decode_failed("empty input"));
    }
    let detected = detect_format(bytes);
    let img = match detected {
        Some(ImageFormat::Jpeg) => decode_jpeg_mozjpeg(bytes)?,
        Some(ImageFormat::Png) => decode_png_zune(bytes)?,
        Some(ImageFormat::Bmp | ImageFormat::Gif | ImageFormat::Tiff) => {
            decode_with_image_crate(bytes)?
        }
        Some(other) => {
            return Err(ShrinkError::unsupported_format(
                format!("{other:?}").to_lowercase(),
            ))
        }
        None => return Err(ShrinkError::unsupported_format("unknown")),
    };
    Ok((img, detected))
}

/// Read dimensions and format from the header without decoding pixels.
pub fn read_header(bytes: &[u8]) -> DecoderResult<HeaderInfo> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ShrinkError::decode_failed(format!("failed to read image header: {e}")))?;
    let format = reader.format();
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| ShrinkError::decode_failed(format!("failed to read dimensions: {e}")))?;
    Ok(HeaderInfo {
        width,
        height,
        format,
    })
}

/// Check if image dimensions are within safe limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32) -> DecoderResult<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ShrinkError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(ShrinkError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, Rgba};

    fn encode_with_image_crate(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
        buffer
    }

    fn encode_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |_, _| Rgb([0, 0, 0]));
        encode_with_image_crate(DynamicImage::ImageRgb8(img), ImageFormat::Png)
    }

    #[test]
    fn test_check_dimensions_limits() {
        assert!(check_dimensions(1920, 1080).is_ok());
        assert!(check_dimensions(10000, 10000).is_ok());
        assert!(matches!(
            check_dimensions(MAX_DIMENSION + 1, 1),
            Err(ShrinkError::DimensionExceedsLimit { .. })
        ));
        assert!(matches!(
            check_dimensions(10001, 10000),
            Err(ShrinkError::PixelCountExceedsLimit { .. })
        ));
    }

    #[test]
    fn test_detect_format_jpeg_and_png() {
        let png = encode_png(2, 2);
        let jpeg = encode_with_image_crate(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]))),
            ImageFormat::Jpeg,
        );
        assert_eq!(detect_format(&png), Some(ImageFormat::Png));
        assert_eq!(detect_format(&jpeg), Some(ImageFormat::Jpeg));
        assert_eq!(detect_format(b"definitely not an image"), None);
    }

    #[test]
    fn test_decode_image_routes_png_to_zune() {
        let png = encode_png(3, 1);
        let (img, fmt) = decode_image(&png).unwrap();
        assert_eq!(fmt, Some(ImageFormat::Png));
        assert_eq!(img.dimensions(), (3, 1));
        assert_eq!(img.to_rgb8().get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_decode_png_keeps_alpha() {
        let img = RgbaImage::from_pixel(4, 2, Rgba([10, 20, 30, 40]));
        let png = encode_with_image_crate(DynamicImage::ImageRgba8(img), ImageFormat::Png);
        let (decoded, _) = decode_image(&png).unwrap();
        assert!(decoded.color().has_alpha());
        assert_eq!(decoded.to_rgba8().get_pixel(1, 1).0, [10, 20, 30, 40]);
    }

    #[test]
    fn test_decode_image_routes_jpeg_to_mozjpeg() {
        let jpeg = encode_with_image_crate(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([9, 8, 7]))),
            ImageFormat::Jpeg,
        );
        let (img, fmt) = decode_image(&jpeg).unwrap();
        assert_eq!(fmt, Some(ImageFormat::Jpeg));
        assert_eq!(img.dimensions(), (2, 2));
    }

    #[test]
    fn test_decode_bmp_through_image_crate() {
        let bmp = encode_with_image_crate(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(5, 4, Rgb([200, 100, 50]))),
            ImageFormat::Bmp,
        );
        let (img, fmt) = decode_image(&bmp).unwrap();
        assert_eq!(fmt, Some(ImageFormat::Bmp));
        assert_eq!(img.dimensions(), (5, 4));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_image(b"\x00\x01\x02 nope").unwrap_err();
        assert!(err.is_decode_error());
        let err = decode_image(&[]).unwrap_err();
        assert!(err.is_decode_error());
    }

    #[test]
    fn test_truncated_jpeg_is_decode_error() {
        let jpeg = encode_with_image_crate(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([9, 8, 7]))),
            ImageFormat::Jpeg,
        );
        let truncated = &jpeg[..jpeg.len() / 2];
        let err = decode_image(truncated).unwrap_err();
        assert!(err.is_decode_error(), "unexpected error: {err:?}");
    }

    #[test]
    fn test_read_header_does_not_need_pixels() {
        let png = encode_png(640, 480);
        let header = read_header(&png).unwrap();
        assert_eq!(header.width, 640);
        assert_eq!(header.height, 480);
        assert_eq!(header.format, Some(ImageFormat::Png));
    }
}
