// src/ops.rs
//
// Value types flowing in and out of the engine.
// Cheap to create and copy around - the expensive work happens in process().

use crate::error::{Result, ShrinkError};

/// JPEG qualities tried in order, first one that fits wins.
pub const JPEG_QUALITY_LADDER: [u8; 6] = [90, 80, 70, 60, 50, 40];

/// Quality used when nothing on the ladder fits, and by the fallback tier.
pub const JPEG_FALLBACK_QUALITY: u8 = 30;

/// The search loop never shrinks the longer side below this.
pub const SEARCH_FLOOR: u32 = 800;

/// Each unsuccessful tier multiplies the target longer side by this.
pub const SHRINK_FACTOR: f64 = 0.85;

pub const DEFAULT_MAX_DIMENSION: u32 = 1568;
pub const DEFAULT_MAX_BYTES: usize = 5_000_000;

/// Hard limits an output has to satisfy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Constraints {
    /// Upper bound for the longer side, in pixels
    pub max_dimension: u32,
    /// Upper bound for the encoded size, in bytes
    pub max_bytes: usize,
}

impl Constraints {
    pub fn new(max_dimension: u32, max_bytes: usize) -> Result<Self> {
        if max_dimension == 0 {
            return Err(ShrinkError::invalid_argument(
                "max_dimension",
                "0",
                "must be a positive number of pixels",
            ));
        }
        if max_bytes == 0 {
            return Err(ShrinkError::invalid_argument(
                "max_bytes",
                "0",
                "must be a positive number of bytes",
            ));
        }
        Ok(Self {
            max_dimension,
            max_bytes,
        })
    }

    /// True when an image of this size already fits the dimension bound.
    pub fn fits_dimension(&self, width: u32, height: u32) -> bool {
        width.max(height) <= self.max_dimension
    }
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

/// Output format for encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpeg,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
        })
    }
}

/// An encoded image handed back to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedResult {
    pub format: OutputFormat,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// JPEG quality used, `None` for lossless output
    pub quality: Option<u8>,
}

impl EncodedResult {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Result of a successful `process()` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The input already satisfies both limits; pass the original through.
    Unchanged,
    Encoded(EncodedResult),
}

impl Outcome {
    pub fn encoded(&self) -> Option<&EncodedResult> {
        match self {
            Self::Unchanged => None,
            Self::Encoded(result) => Some(result),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraints_reject_zero() {
        assert!(Constraints::new(0, 10).is_err());
        assert!(Constraints::new(10, 0).is_err());
        let c = Constraints::new(1568, 5_000_000).unwrap();
        assert_eq!(c, Constraints::default());
    }

    #[test]
    fn fits_dimension_uses_longer_side() {
        let c = Constraints::new(1000, 1).unwrap();
        assert!(c.fits_dimension(1000, 10));
        assert!(c.fits_dimension(10, 1000));
        assert!(!c.fits_dimension(1001, 10));
        assert!(!c.fits_dimension(10, 1001));
    }

    #[test]
    fn ladder_is_strictly_decreasing_and_above_fallback() {
        assert!(JPEG_QUALITY_LADDER.windows(2).all(|w| w[0] > w[1]));
        assert!(JPEG_QUALITY_LADDER
            .iter()
            .all(|&q| q > JPEG_FALLBACK_QUALITY));
    }

    #[test]
    fn format_names() {
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
        assert_eq!(OutputFormat::Png.mime_type(), "image/png");
        assert_eq!(OutputFormat::Jpeg.to_string(), "JPEG");
    }
}
