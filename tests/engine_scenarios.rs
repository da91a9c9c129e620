// tests/engine_scenarios.rs
//
// End-to-end scenarios for the resize-and-compress engine:
// encoded bytes in, Outcome out.

use clipshrink::engine::{encode_jpeg, max_search_attempts, process, resize_to_fit, ImageBuffer};
use clipshrink::ops::{Constraints, Outcome, OutputFormat, JPEG_FALLBACK_QUALITY};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;

fn create_test_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
}

fn create_noise_image(width: u32, height: u32, seed: u32) -> DynamicImage {
    let mut state = seed | 1;
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        };
        image::Rgb([next(), next(), next()])
    }))
}

fn encode_png_bytes(img: &DynamicImage) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn assert_aspect(original: (u32, u32), resized: (u32, u32)) {
    let (w, h) = original;
    let (rw, rh) = resized;
    if w >= h {
        let expected = h as f64 * rw as f64 / w as f64;
        assert!(
            (rh as f64 - expected).abs() <= 1.0,
            "height {rh} vs expected {expected:.2}"
        );
    } else {
        let expected = w as f64 * rh as f64 / h as f64;
        assert!(
            (rw as f64 - expected).abs() <= 1.0,
            "width {rw} vs expected {expected:.2}"
        );
    }
}

#[test]
fn small_image_with_known_size_passes_through() {
    let input = ImageBuffer::from_pixels(create_test_image(500, 500)).with_source_len(2_000_000);
    let constraints = Constraints::new(1568, 5_000_000).unwrap();
    assert_eq!(process(&input, &constraints).unwrap(), Outcome::Unchanged);
}

#[test]
fn decoded_png_within_limits_passes_through() {
    let bytes = encode_png_bytes(&create_test_image(640, 480));
    let input = ImageBuffer::decode(&bytes).unwrap();
    assert!(process(&input, &Constraints::default())
        .unwrap()
        .is_unchanged());
}

#[test]
fn oversized_dimension_is_brought_within_limits() {
    let bytes = encode_png_bytes(&create_test_image(3000, 2000));
    let input = ImageBuffer::decode(&bytes).unwrap();
    let constraints = Constraints::new(1568, 5_000_000).unwrap();

    let outcome = process(&input, &constraints).unwrap();
    let result = outcome.encoded().expect("3000px input must be re-encoded");
    assert!(result.width.max(result.height) <= 1568);
    assert!(result.len() <= 5_000_000);
    assert_eq!(result.dimensions(), (1568, 1045));
    assert_aspect((3000, 2000), result.dimensions());
}

#[test]
fn oversized_bytes_compress_at_original_scale_first() {
    let input =
        ImageBuffer::from_pixels(create_test_image(1000, 1000)).with_source_len(8_000_000);
    let constraints = Constraints::new(1568, 5_000_000).unwrap();

    let outcome = process(&input, &constraints).unwrap();
    let result = outcome.encoded().expect("8 MB source must be re-encoded");
    assert_eq!(result.dimensions(), (1000, 1000));
    assert!(result.len() <= 5_000_000);
}

#[test]
fn budget_missed_at_first_tier_is_met_at_second() {
    let img = create_noise_image(1000, 1000, 0xC0FFEE);
    let second_tier = resize_to_fit(&img, 850).unwrap();
    let budget = encode_jpeg(&second_tier, 40).unwrap().len();
    assert!(budget < encode_jpeg(&img, 40).unwrap().len());

    let input = ImageBuffer::from_pixels(img);
    let constraints = Constraints::new(1000, budget).unwrap();
    let outcome = process(&input, &constraints).unwrap();
    let result = outcome.encoded().expect("noise over budget must be re-encoded");
    assert_eq!(result.dimensions(), (850, 850));
    assert_eq!(result.format, OutputFormat::Jpeg);
    assert!(result.len() <= budget);
}

#[test]
fn pathological_byte_limit_reaches_fallback() {
    let input = ImageBuffer::from_pixels(create_test_image(3000, 2000));
    let constraints = Constraints::new(1568, 1).unwrap();

    let outcome = process(&input, &constraints).unwrap();
    let result = outcome.encoded().expect("fallback never returns Unchanged");
    assert_eq!(result.format, OutputFormat::Jpeg);
    assert_eq!(result.quality, Some(JPEG_FALLBACK_QUALITY));
    assert_eq!(result.dimensions(), (800, 533));
    assert!(!result.is_empty());
}

#[test]
fn photographic_content_falls_to_jpeg() {
    let input = ImageBuffer::from_pixels(create_noise_image(1200, 900, 7));
    let constraints = Constraints::new(1568, 400_000).unwrap();

    let outcome = process(&input, &constraints).unwrap();
    let result = outcome.encoded().unwrap();
    assert_eq!(result.format, OutputFormat::Jpeg);
    assert!(result.len() <= 400_000);
    assert!(result.width <= 1200 && result.height <= 900);
    assert_aspect((1200, 900), result.dimensions());
}

#[test]
fn flat_screenshot_content_stays_lossless() {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(2400, 1600, |x, _| {
        if x < 1200 {
            image::Rgb([250, 250, 250])
        } else {
            image::Rgb([30, 30, 30])
        }
    }));
    let input = ImageBuffer::from_pixels(img);
    let outcome = process(&input, &Constraints::default()).unwrap();
    let result = outcome.encoded().unwrap();
    assert_eq!(result.format, OutputFormat::Png);
    assert_eq!(result.quality, None);
    assert_eq!(result.dimensions(), (1568, 1045));
}

#[test]
fn jpeg_input_is_resized() {
    let jpeg = encode_jpeg(&create_test_image(2000, 1500), 85).unwrap();
    let input = ImageBuffer::decode(&jpeg).unwrap();
    assert_eq!(input.source_format(), Some(ImageFormat::Jpeg));

    let outcome = process(&input, &Constraints::default()).unwrap();
    let result = outcome.encoded().unwrap();
    assert_eq!(result.dimensions(), (1568, 1176));
}

#[test]
fn portrait_input_limits_height() {
    let input = ImageBuffer::from_pixels(create_test_image(1000, 2500));
    let outcome = process(&input, &Constraints::default()).unwrap();
    let result = outcome.encoded().unwrap();
    assert_eq!(result.height, 1568);
    assert_aspect((1000, 2500), result.dimensions());
}

#[test]
fn output_decodes_to_reported_dimensions() {
    let input = ImageBuffer::from_pixels(create_noise_image(1800, 1200, 99));
    let constraints = Constraints::new(1568, 600_000).unwrap();
    let outcome = process(&input, &constraints).unwrap();
    let result = outcome.encoded().unwrap();

    let decoded = image::load_from_memory(&result.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), result.dimensions());
    let expected = match result.format {
        OutputFormat::Png => ImageFormat::Png,
        OutputFormat::Jpeg => ImageFormat::Jpeg,
    };
    assert_eq!(image::guess_format(&result.bytes).unwrap(), expected);
}

#[test]
fn search_budget_for_default_limit() {
    // 1568 -> 1333 -> 1133 -> 963 -> 819, then the fallback.
    assert_eq!(max_search_attempts(1568), 5);
    let bound = ((1568f64 / 800.0).ln() / (1.0f64 / 0.85).ln()).ceil() as usize;
    assert!(max_search_attempts(1568) <= bound);
}

#[test]
fn undecodable_input_is_a_decode_error() {
    let err = ImageBuffer::decode(b"\x89PNG\r\n\x1a\nthis is not a png").unwrap_err();
    assert!(err.is_decode_error());
    assert!(!err.is_encode_error());
}
