// src/engine.rs
//
// The core of clipshrink. Given a decoded image and two limits it:
// 1. Passes the input through when it already fits
// 2. Searches scale tiers x codec settings for the first output that fits
// 3. Falls back to a best-effort encode at the floor size
//
// This file is a facade over the modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod common;
mod decoder;
mod encoder;
mod io;
mod pipeline;
mod pool;
mod search;

pub use common::{run_with_panic_policy, EngineResult};
pub use decoder::{check_dimensions, decode_image, detect_format, read_header, HeaderInfo};
pub use encoder::{
    encode_jpeg, encode_jpeg_with_settings, encode_png, EncodeSettings, QualitySettings,
    MAX_PNG_OPTIMIZATION,
};
pub use io::{write_atomic, Source};
pub use pipeline::{calc_fit_dimensions, fast_resize, resize_to_fit, ResizeError};
pub use pool::{get_pool, plan_output_stems, shrink_files, BatchOutcome, BatchResult};
pub use search::{
    compress, max_search_attempts, process, process_with, Compressed, ImageBuffer, ScaleTiers,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{Constraints, OutputFormat};
    use image::{DynamicImage, ImageFormat, RgbImage};

    fn encode_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }));
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn security_limits_agree() {
        assert!((MAX_DIMENSION as u64) * (MAX_DIMENSION as u64) > MAX_PIXELS);
        assert!(check_dimensions(10_000, 10_000).is_ok());
        assert!(check_dimensions(20_000, 20_000).is_err());
    }

    #[test]
    fn decode_then_process_through_facade() {
        let bytes = encode_png_bytes(2000, 1000);
        let header = read_header(&bytes).unwrap();
        assert_eq!((header.width, header.height), (2000, 1000));

        let input = ImageBuffer::decode(&bytes).unwrap();
        let constraints = Constraints::default();
        let outcome = process(&input, &constraints).unwrap();
        let result = outcome.encoded().expect("2000px input must be resized");
        assert_eq!(result.dimensions(), (1568, 784));
        assert!(result.len() <= constraints.max_bytes);
        if result.format == OutputFormat::Png {
            assert_eq!(result.quality, None);
        }
    }
}
