// src/notify.rs
//
// Before/after reporting for replaced clipboard images.

use crate::ops::{EncodedResult, OutputFormat};
use std::path::PathBuf;
use tracing::{info, warn};

/// One replacement, as reported to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub original_dims: (u32, u32),
    pub new_dims: (u32, u32),
    /// Unknown when the clipboard only handed over pixels
    pub original_bytes: Option<usize>,
    pub new_bytes: usize,
    pub format: OutputFormat,
    pub output_location: Option<PathBuf>,
}

impl Notification {
    pub fn from_result(
        original_dims: (u32, u32),
        original_bytes: Option<usize>,
        result: &EncodedResult,
    ) -> Self {
        Self {
            original_dims,
            new_dims: result.dimensions(),
            original_bytes,
            new_bytes: result.len(),
            format: result.format,
            output_location: None,
        }
    }

    pub fn with_output_location(mut self, path: PathBuf) -> Self {
        self.output_location = Some(path);
        self
    }

    /// e.g. `3000×2000 → 1568×1045 · 8.0 MB → 1.2 MB (JPEG)`
    pub fn summary(&self) -> String {
        let (ow, oh) = self.original_dims;
        let (nw, nh) = self.new_dims;
        let sizes = match self.original_bytes {
            Some(before) => format!("{} → {}", format_bytes(before), format_bytes(self.new_bytes)),
            None => format_bytes(self.new_bytes),
        };
        format!("{ow}×{oh} → {nw}×{nh} · {sizes} ({})", self.format)
    }
}

/// Human-readable size with decimal units, one decimal place above bytes.
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1000 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Receives watcher outcomes. Implementations must not block for long; the
/// watcher calls them inline.
pub trait NotificationSink {
    fn notify(&self, notification: &Notification);
    fn notify_failure(&self, message: &str);
}

/// Reports through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, notification: &Notification) {
        match &notification.output_location {
            Some(path) => info!(
                output = %path.display(),
                "clipboard image shrunk: {}",
                notification.summary()
            ),
            None => info!("clipboard image shrunk: {}", notification.summary()),
        }
    }

    fn notify_failure(&self, message: &str) {
        warn!("clipboard image left untouched: {message}");
    }
}

/// Drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentNotifier;

impl NotificationSink for SilentNotifier {
    fn notify(&self, _notification: &Notification) {}
    fn notify_failure(&self, _message: &str) {}
}
