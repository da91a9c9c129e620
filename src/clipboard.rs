// src/clipboard.rs
//
// Clipboard collaborators of the watcher.
//
// The engine never touches a clipboard; the watcher talks to one through
// `ClipboardSource` (change token + current image) and `ClipboardSink`
// (replace contents with an encoded result). `SystemClipboard` implements
// both on top of arboard when the `system-clipboard` feature is enabled.

use crate::engine::ImageBuffer;
use crate::error::Result;
use crate::ops::EncodedResult;
use image::{DynamicImage, RgbaImage};

#[cfg(feature = "system-clipboard")]
use crate::engine::{check_dimensions, decode_image};
#[cfg(feature = "system-clipboard")]
use crate::error::ShrinkError;
#[cfg(feature = "system-clipboard")]
use std::borrow::Cow;
#[cfg(feature = "system-clipboard")]
use tracing::{debug, trace};

/// Image currently held by the clipboard, in pixel dimensions.
#[derive(Debug, Clone)]
pub struct ClipboardImage {
    pub image: ImageBuffer,
}

impl ClipboardImage {
    pub fn new(image: ImageBuffer) -> Self {
        Self { image }
    }

    /// Wrap raw RGBA8 pixels. `None` when the buffer does not match the size.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        let rgba = RgbaImage::from_raw(width, height, pixels)?;
        Some(Self::new(ImageBuffer::from_pixels(DynamicImage::ImageRgba8(
            rgba,
        ))))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Content fingerprint, see [`fingerprint`].
    pub fn fingerprint(&self) -> blake3::Hash {
        fingerprint_image(self.image.image())
    }
}

/// Read side of a shared clipboard.
pub trait ClipboardSource {
    /// Monotonically increasing token; a new value means the contents changed
    /// since the previous call.
    fn change_token(&mut self) -> Result<u64>;

    /// Current image, or `None` when the clipboard holds something else.
    fn read_image(&mut self) -> Result<Option<ClipboardImage>>;
}

/// Write side of a shared clipboard.
pub trait ClipboardSink {
    /// Replace the clipboard contents with exactly this encoded result.
    fn write_image(&mut self, result: &EncodedResult) -> Result<()>;
}

/// Turns content fingerprints into a monotonically increasing change token.
#[derive(Debug, Default, Clone)]
pub struct ChangeTracker {
    last: Option<Option<blake3::Hash>>,
    token: u64,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the fingerprint seen now and return the current token.
    /// `None` stands for "no image on the clipboard".
    pub fn observe(&mut self, fingerprint: Option<blake3::Hash>) -> u64 {
        if self.last != Some(fingerprint) {
            self.last = Some(fingerprint);
            self.token = self.token.wrapping_add(1);
        }
        self.token
    }

    pub fn token(&self) -> u64 {
        self.token
    }
}

/// Buffers larger than this are fingerprinted from sampled rows.
pub const FULL_HASH_LIMIT: usize = 8 * 1024 * 1024;
const SAMPLED_ROW_STEP: usize = 4;

/// Fingerprint of an RGBA pixel buffer, dimensions included.
///
/// Up to [`FULL_HASH_LIMIT`] bytes every pixel is hashed. Past that only every
/// fourth row is, which keeps polling a large screenshot cheap; an edit
/// confined to skipped rows of an image with the same dimensions goes
/// unnoticed.
pub fn fingerprint(width: u32, height: u32, pixels: &[u8]) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&width.to_le_bytes());
    hasher.update(&height.to_le_bytes());
    let row_len = width as usize * 4;
    if pixels.len() <= FULL_HASH_LIMIT || row_len == 0 {
        hasher.update(pixels);
    } else {
        for row in pixels.chunks(row_len).step_by(SAMPLED_ROW_STEP) {
            hasher.update(row);
        }
    }
    hasher.finalize()
}

/// [`fingerprint`] of any decoded image, converted to RGBA8 when needed.
pub fn fingerprint_image(img: &DynamicImage) -> blake3::Hash {
    match img.as_rgba8() {
        Some(rgba) => fingerprint(rgba.width(), rgba.height(), rgba.as_raw()),
        None => {
            let rgba = img.to_rgba8();
            fingerprint(rgba.width(), rgba.height(), rgba.as_raw())
        }
    }
}

/// Dimensions of the last image refused for exceeding the decode limit.
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectedSize {
    last: Option<(u32, u32)>,
}

impl RejectedSize {
    /// `true` the first time a size is refused; repeats of the same size
    /// return `false` until [`clear`](Self::clear).
    pub fn first_rejection(&mut self, width: u32, height: u32) -> bool {
        if self.last == Some((width, height)) {
            return false;
        }
        self.last = Some((width, height));
        true
    }

    pub fn clear(&mut self) {
        self.last = None;
    }
}

/// arboard-backed system clipboard.
///
/// arboard has no change counter, so the token is derived from a blake3
/// fingerprint of the pixels; the last image read is kept so `read_image`
/// after `change_token` does not hit the clipboard twice. An image over the
/// dimension limit is reported once and then ignored until the clipboard
/// holds something else.
#[cfg(feature = "system-clipboard")]
pub struct SystemClipboard {
    inner: arboard::Clipboard,
    tracker: ChangeTracker,
    cached: Option<ClipboardImage>,
    rejected: RejectedSize,
}

#[cfg(feature = "system-clipboard")]
impl SystemClipboard {
    pub fn new() -> Result<Self> {
        let inner = arboard::Clipboard::new()
            .map_err(|e| ShrinkError::clipboard_unavailable(e.to_string()))?;
        Ok(Self {
            inner,
            tracker: ChangeTracker::new(),
            cached: None,
            rejected: RejectedSize::default(),
        })
    }

    fn fetch(&mut self) -> Result<Option<ClipboardImage>> {
        match self.inner.get_image() {
            Ok(data) => {
                let (width, height) = (data.width as u32, data.height as u32);
                if let Err(err) = check_dimensions(width, height) {
                    if self.rejected.first_rejection(width, height) {
                        return Err(err);
                    }
                    trace!(width, height, "oversized clipboard image still present");
                    return Ok(None);
                }
                self.rejected.clear();
                let image = ClipboardImage::from_rgba(width, height, data.bytes.into_owned())
                    .ok_or_else(|| {
                        ShrinkError::clipboard_failed("read", "pixel buffer does not match size")
                    })?;
                Ok(Some(image))
            }
            Err(arboard::Error::ContentNotAvailable) => {
                self.rejected.clear();
                Ok(None)
            }
            Err(e) => Err(ShrinkError::clipboard_failed("read", e.to_string())),
        }
    }
}

#[cfg(feature = "system-clipboard")]
impl ClipboardSource for SystemClipboard {
    fn change_token(&mut self) -> Result<u64> {
        let current = self.fetch()?;
        let hash = current.as_ref().map(ClipboardImage::fingerprint);
        let token = self.tracker.observe(hash);
        trace!(token, has_image = current.is_some(), "clipboard polled");
        self.cached = current;
        Ok(token)
    }

    fn read_image(&mut self) -> Result<Option<ClipboardImage>> {
        match self.cached.take() {
            Some(image) => Ok(Some(image)),
            None => self.fetch(),
        }
    }
}

#[cfg(feature = "system-clipboard")]
impl ClipboardSink for SystemClipboard {
    fn write_image(&mut self, result: &EncodedResult) -> Result<()> {
        // arboard takes pixels only; the OS layer re-encodes for other apps.
        let (decoded, _) = decode_image(&result.bytes)?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        let data = arboard::ImageData {
            width: width as usize,
            height: height as usize,
            bytes: Cow::Owned(rgba.into_raw()),
        };
        self.inner
            .set_image(data)
            .map_err(|e| ShrinkError::clipboard_failed("write", e.to_string()))?;
        self.cached = None;
        debug!(width, height, format = %result.format, "clipboard replaced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_bumps_only_on_change() {
        let mut tracker = ChangeTracker::new();
        let a = fingerprint(2, 2, &[1u8; 16]);
        let b = fingerprint(2, 2, &[2u8; 16]);

        let t1 = tracker.observe(Some(a));
        assert_eq!(tracker.observe(Some(a)), t1);
        let t2 = tracker.observe(Some(b));
        assert!(t2 > t1);
        let t3 = tracker.observe(None);
        assert!(t3 > t2);
        assert_eq!(tracker.observe(None), t3);
        assert_eq!(tracker.token(), t3);
    }

    #[test]
    fn fingerprint_includes_dimensions() {
        let pixels = [0u8; 16];
        assert_ne!(fingerprint(4, 1, &pixels), fingerprint(2, 2, &pixels));
        assert_eq!(fingerprint(2, 2, &pixels), fingerprint(2, 2, &pixels));
    }

    #[test]
    fn large_buffers_are_sampled_by_row() {
        let (width, height) = (1024u32, 2049u32);
        let pixels = vec![7u8; width as usize * height as usize * 4];
        assert!(pixels.len() > FULL_HASH_LIMIT);
        let base = fingerprint(width, height, &pixels);

        let row = width as usize * 4;
        let mut sampled_row_edit = pixels.clone();
        sampled_row_edit[4 * row + 10] = 8;
        assert_ne!(fingerprint(width, height, &sampled_row_edit), base);

        let mut skipped_row_edit = pixels.clone();
        skipped_row_edit[row + 10] = 8;
        assert_eq!(fingerprint(width, height, &skipped_row_edit), base);

        assert_ne!(fingerprint(height, width, &pixels), base);
    }

    #[test]
    fn image_fingerprint_ignores_pixel_layout() {
        let rgb = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(3, 2, image::Rgb([1, 2, 3])));
        let rgba = DynamicImage::ImageRgba8(rgb.to_rgba8());
        assert_eq!(fingerprint_image(&rgb), fingerprint_image(&rgba));

        let clip = ClipboardImage::new(ImageBuffer::from_pixels(rgb));
        assert_eq!(clip.fingerprint(), fingerprint_image(&rgba));
    }

    #[test]
    fn oversized_image_reported_once() {
        let mut rejected = RejectedSize::default();
        assert!(rejected.first_rejection(40_000, 20_000));
        assert!(!rejected.first_rejection(40_000, 20_000));
        assert!(rejected.first_rejection(50_000, 20_000));
        rejected.clear();
        assert!(rejected.first_rejection(50_000, 20_000));
    }

    #[test]
    fn from_rgba_checks_buffer_length() {
        assert!(ClipboardImage::from_rgba(2, 2, vec![0; 16]).is_some());
        assert!(ClipboardImage::from_rgba(2, 2, vec![0; 15]).is_none());
        let clip = ClipboardImage::from_rgba(3, 1, vec![0; 12]).unwrap();
        assert_eq!(clip.dimensions(), (3, 1));
        assert_eq!(clip.image.source_len(), None);
    }
}
