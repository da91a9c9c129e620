// src/engine/search.rs
//
// The resize-and-compress decision engine.
//
// 1. Pass-through when the input already fits both limits
// 2. Walk a geometric ladder of longer-side targets (x0.85 per tier, floor 800),
//    trying lossless PNG and then a fixed JPEG quality ladder at each tier;
//    the first encoding that fits wins
// 3. Fall back to the floor size at the lowest JPEG quality, regardless of size
//
// Everything here is function-local. No globals, no I/O.

use crate::engine::decoder::decode_image;
use crate::engine::encoder::{encode_jpeg_with_settings, encode_png, EncodeSettings};
use crate::engine::pipeline::{calc_fit_dimensions, resize_to_fit};
use crate::error::ShrinkError;
use crate::ops::{
    Constraints, EncodedResult, Outcome, OutputFormat, JPEG_FALLBACK_QUALITY,
    JPEG_QUALITY_LADDER, SEARCH_FLOOR, SHRINK_FACTOR,
};
use image::{DynamicImage, ImageFormat};
use tracing::{debug, warn};

use super::common::EngineResult;

/// Immutable decoded image handed to the engine.
#[derive(Clone, Debug)]
pub struct ImageBuffer {
    image: DynamicImage,
    /// Size of the encoding the pixels came from, when known
    source_len: Option<usize>,
    source_format: Option<ImageFormat>,
}

impl ImageBuffer {
    /// Decode encoded bytes, remembering their length as the known source size.
    pub fn decode(bytes: &[u8]) -> EngineResult<Self> {
        let (image, format) = decode_image(bytes)?;
        Ok(Self {
            image,
            source_len: Some(bytes.len()),
            source_format: format,
        })
    }

    /// Wrap pixels that did not come from an encoded buffer (e.g. raw clipboard RGBA).
    pub fn from_pixels(image: DynamicImage) -> Self {
        Self {
            image,
            source_len: None,
            source_format: None,
        }
    }

    pub fn with_source_len(mut self, len: usize) -> Self {
        self.source_len = Some(len);
        self
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    pub fn source_len(&self) -> Option<usize> {
        self.source_len
    }

    pub fn source_format(&self) -> Option<ImageFormat> {
        self.source_format
    }
}

/// Bounded iterator over the longer-side targets of the search loop:
/// `round(max_dimension * 0.85^k)` while the unrounded value is >= 800.
#[derive(Debug, Clone)]
pub struct ScaleTiers {
    current: f64,
}

impl ScaleTiers {
    pub fn new(max_dimension: u32) -> Self {
        Self {
            current: max_dimension as f64,
        }
    }
}

impl Iterator for ScaleTiers {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.current < SEARCH_FLOOR as f64 {
            return None;
        }
        let target = self.current.round() as u32;
        self.current *= SHRINK_FACTOR;
        Some(target)
    }
}

/// Number of tiers the search loop can visit before falling back, i.e. the
/// number of values [`ScaleTiers`] yields.
///
/// This is `floor(log(max / 800) / log(1 / 0.85)) + 1`. It matches
/// `ceil(log(max / 800) / log(1 / 0.85))` everywhere except where that
/// logarithm is a whole number (`max_dimension == 800` being the one exact
/// case): a tier landing exactly on 800 is still tried, so it counts.
pub fn max_search_attempts(max_dimension: u32) -> usize {
    if max_dimension < SEARCH_FLOOR {
        return 0;
    }
    let ratio = max_dimension as f64 / SEARCH_FLOOR as f64;
    (ratio.ln() / (1.0 / SHRINK_FACTOR).ln()).floor() as usize + 1
}

/// One encoded candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compressed {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub quality: Option<u8>,
}

impl Compressed {
    fn into_result(self, width: u32, height: u32) -> EncodedResult {
        EncodedResult {
            format: self.format,
            bytes: self.bytes,
            width,
            height,
            quality: self.quality,
        }
    }
}

/// PNG first, then the JPEG ladder. `None` when nothing fits `max_bytes`.
/// `lossless` short-circuits the PNG encode when the caller already has it.
fn try_fit(
    img: &DynamicImage,
    max_bytes: usize,
    settings: &EncodeSettings,
    lossless: Option<Vec<u8>>,
) -> EngineResult<Option<Compressed>> {
    let png = match lossless {
        Some(bytes) => Some(bytes),
        None => match encode_png(img, settings.png_optimization) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(error = %err, "lossless encode failed, trying lossy");
                None
            }
        },
    };
    if let Some(bytes) = png {
        debug!(len = bytes.len(), max_bytes, "png candidate");
        if bytes.len() <= max_bytes {
            return Ok(Some(Compressed {
                bytes,
                format: OutputFormat::Png,
                quality: None,
            }));
        }
    }

    for quality in JPEG_QUALITY_LADDER {
        let bytes = encode_jpeg_with_settings(img, quality, settings.jpeg_fast_mode)?;
        debug!(quality, len = bytes.len(), max_bytes, "jpeg candidate");
        if bytes.len() <= max_bytes {
            return Ok(Some(Compressed {
                bytes,
                format: OutputFormat::Jpeg,
                quality: Some(quality),
            }));
        }
    }
    Ok(None)
}

/// Compress `img` against `max_bytes`: lossless PNG, then JPEG at
/// 90/80/70/60/50/40, first fit wins. When nothing fits, the quality-30 JPEG
/// is returned as best effort. Only a codec failure is an error.
pub fn compress(
    img: &DynamicImage,
    max_bytes: usize,
    settings: &EncodeSettings,
) -> EngineResult<Compressed> {
    if let Some(found) = try_fit(img, max_bytes, settings, None)? {
        return Ok(found);
    }
    compress_best_effort(img, settings)
}

/// Most aggressive setting, no size ceiling.
fn compress_best_effort(img: &DynamicImage, settings: &EncodeSettings) -> EngineResult<Compressed> {
    let bytes = encode_jpeg_with_settings(img, JPEG_FALLBACK_QUALITY, settings.jpeg_fast_mode)
        .map_err(|err| match err {
            err @ ShrinkError::EncodeFailed { .. } => err,
            other => ShrinkError::encode_failed("jpeg", other.to_string()),
        })?;
    Ok(Compressed {
        bytes,
        format: OutputFormat::Jpeg,
        quality: Some(JPEG_FALLBACK_QUALITY),
    })
}

enum Precheck {
    Unchanged,
    /// Carries the lossless measurement when one was made, so the first tier
    /// does not encode the same pixels twice.
    Search { lossless: Option<Vec<u8>> },
}

fn precheck(
    input: &ImageBuffer,
    constraints: &Constraints,
    settings: &EncodeSettings,
) -> Precheck {
    let (width, height) = input.dimensions();
    if !constraints.fits_dimension(width, height) {
        return Precheck::Search { lossless: None };
    }
    if let Some(len) = input.source_len() {
        return if len <= constraints.max_bytes {
            Precheck::Unchanged
        } else {
            Precheck::Search { lossless: None }
        };
    }
    // Size unknown: measure a lossless encoding. The original still passes
    // through untouched if it fits.
    match encode_png(input.image(), settings.png_optimization) {
        Ok(bytes) if bytes.len() <= constraints.max_bytes => Precheck::Unchanged,
        Ok(bytes) => Precheck::Search {
            lossless: Some(bytes),
        },
        Err(err) => {
            warn!(error = %err, "could not measure lossless size");
            Precheck::Search { lossless: None }
        }
    }
}

/// Run the engine with default codec settings.
pub fn process(input: &ImageBuffer, constraints: &Constraints) -> EngineResult<Outcome> {
    process_with(input, constraints, &EncodeSettings::default())
}

/// Produce an output satisfying `constraints`, or `Outcome::Unchanged` when
/// the input already does.
pub fn process_with(
    input: &ImageBuffer,
    constraints: &Constraints,
    settings: &EncodeSettings,
) -> EngineResult<Outcome> {
    let (width, height) = input.dimensions();
    if width == 0 || height == 0 {
        return Err(ShrinkError::corrupted_image());
    }

    let mut lossless = match precheck(input, constraints, settings) {
        Precheck::Unchanged => {
            debug!(width, height, "input already within limits");
            return Ok(Outcome::Unchanged);
        }
        Precheck::Search { lossless } => lossless,
    };

    let mut previous: Option<(u32, u32)> = None;
    for (attempt, target) in ScaleTiers::new(constraints.max_dimension).enumerate() {
        let dims = calc_fit_dimensions(width, height, target);
        if previous == Some(dims) {
            // Same pixels as the last tier; deterministic codecs give the same bytes.
            debug!(attempt, target, "tier does not change dimensions, skipping");
            continue;
        }
        previous = Some(dims);

        let working = match resize_to_fit(input.image(), target) {
            Ok(img) => img,
            Err(err) => {
                warn!(attempt, target, reason = %err.reason, "resize failed for tier");
                continue;
            }
        };
        // The measured PNG is only valid for the original pixels.
        let known_png = if dims == (width, height) {
            lossless.take()
        } else {
            None
        };

        debug!(attempt, target, w = dims.0, h = dims.1, "trying tier");
        match try_fit(&working, constraints.max_bytes, settings, known_png) {
            Ok(Some(found)) => {
                debug!(
                    attempt,
                    format = %found.format,
                    len = found.bytes.len(),
                    "tier satisfied limits"
                );
                return Ok(Outcome::Encoded(found.into_result(dims.0, dims.1)));
            }
            Ok(None) => {}
            Err(err) => warn!(attempt, target, error = %err, "encode failed for tier"),
        }
    }

    let floor = SEARCH_FLOOR.min(constraints.max_dimension);
    let working = resize_to_fit(input.image(), floor).map_err(ShrinkError::from)?;
    let (fw, fh) = (working.width(), working.height());
    let found = compress_best_effort(&working, settings)?;
    warn!(
        width = fw,
        height = fh,
        len = found.bytes.len(),
        max_bytes = constraints.max_bytes,
        "search exhausted, returning best-effort result"
    );
    Ok(Outcome::Encoded(found.into_result(fw, fh)))
}
