// src/watcher.rs
//
// Clipboard poll loop.
//
// Every poll compares the source's change token with the last one seen. A new
// token with an image on the clipboard runs the engine; an `Encoded` result is
// written back, recorded and reported. Our own write changes the clipboard
// too, so the token observed right after writing is adopted as the baseline.
// For a short grace window afterwards, a change whose pixels still match what
// was written (a late token bump, another app re-publishing our image) is
// attributed to the write. Any other content is processed as usual.
//
// Failures never leave this module as panics or loop exits: `poll_once`
// returns them as `WatchEvent::Failed`, and `run` logs clipboard errors and
// keeps polling.

use crate::clipboard::{fingerprint_image, ClipboardSink, ClipboardSource};
use crate::engine::{decode_image, process_with, EncodeSettings};
use crate::history::HistoryLog;
use crate::notify::{Notification, NotificationSink};
use crate::ops::{Constraints, Outcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_SELF_WRITE_GRACE: Duration = Duration::from_millis(1500);

/// What a single poll did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// No change since the last poll
    Idle,
    /// Changed, but the clipboard holds no image
    NotAnImage,
    /// Image already within limits, left alone
    Unchanged,
    Replaced(Notification),
    /// Change attributed to our own write
    SkippedOwnWrite,
    Failed(String),
}

#[derive(Debug, Clone, Copy)]
struct OwnWrite {
    deadline: Instant,
    fingerprint: blake3::Hash,
}

pub struct ClipboardWatcher<C, N> {
    clipboard: C,
    notifier: N,
    history: Option<Arc<HistoryLog>>,
    constraints: Constraints,
    settings: EncodeSettings,
    poll_interval: Duration,
    self_write_grace: Duration,
    process_existing: bool,
    last_token: Option<u64>,
    own_write: Option<OwnWrite>,
}

impl<C, N> ClipboardWatcher<C, N>
where
    C: ClipboardSource + ClipboardSink,
    N: NotificationSink,
{
    pub fn new(clipboard: C, notifier: N, constraints: Constraints) -> Self {
        Self {
            clipboard,
            notifier,
            history: None,
            constraints,
            settings: EncodeSettings::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            self_write_grace: DEFAULT_SELF_WRITE_GRACE,
            process_existing: false,
            last_token: None,
            own_write: None,
        }
    }

    pub fn with_settings(mut self, settings: EncodeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_history(mut self, history: Arc<HistoryLog>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_self_write_grace(mut self, grace: Duration) -> Self {
        self.self_write_grace = grace;
        self
    }

    /// Process whatever image is on the clipboard at the first poll instead
    /// of treating it as the baseline.
    pub fn process_existing(mut self, yes: bool) -> Self {
        self.process_existing = yes;
        self
    }

    pub fn clipboard(&self) -> &C {
        &self.clipboard
    }

    pub fn clipboard_mut(&mut self) -> &mut C {
        &mut self.clipboard
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Check the clipboard once and act on a change.
    pub fn poll_once(&mut self) -> crate::error::Result<WatchEvent> {
        let token = self.clipboard.change_token()?;
        let now = Instant::now();

        if self.own_write.is_some_and(|own| now >= own.deadline) {
            self.own_write = None;
        }

        match self.last_token {
            None => {
                self.last_token = Some(token);
                if !self.process_existing {
                    debug!(token, "clipboard baseline recorded");
                    return Ok(WatchEvent::Idle);
                }
            }
            Some(last) if last == token => return Ok(WatchEvent::Idle),
            Some(_) => self.last_token = Some(token),
        }

        let Some(clip) = self.clipboard.read_image()? else {
            trace!(token, "clipboard changed, no image");
            return Ok(WatchEvent::NotAnImage);
        };

        if let Some(own) = self.own_write.take() {
            if clip.fingerprint() == own.fingerprint {
                debug!(token, "change within self-write grace, skipping");
                self.own_write = Some(own);
                return Ok(WatchEvent::SkippedOwnWrite);
            }
            debug!(token, "new content within self-write grace");
        }

        let original_dims = clip.dimensions();
        let original_bytes = clip.image.source_len();
        debug!(
            token,
            width = original_dims.0,
            height = original_dims.1,
            "new clipboard image"
        );

        let result = match process_with(&clip.image, &self.constraints, &self.settings) {
            Ok(Outcome::Unchanged) => return Ok(WatchEvent::Unchanged),
            Ok(Outcome::Encoded(result)) => result,
            Err(err) => {
                if err.is_decode_error() {
                    debug!(error = %err, "clipboard image could not be decoded, skipping");
                } else {
                    warn!(error = %err, category = err.category().as_str(), "processing failed");
                }
                let message = err.to_string();
                self.notifier.notify_failure(&message);
                return Ok(WatchEvent::Failed(message));
            }
        };

        if let Err(err) = self.clipboard.write_image(&result) {
            warn!(error = %err, "failed to write clipboard");
            let message = err.to_string();
            self.notifier.notify_failure(&message);
            return Ok(WatchEvent::Failed(message));
        }

        match self.clipboard.change_token() {
            Ok(after) => self.last_token = Some(after),
            Err(err) => warn!(error = %err, "could not read token after write"),
        }
        // Fingerprint what a reader will see: the decoded pixels, not the bytes.
        self.own_write = match decode_image(&result.bytes) {
            Ok((written, _)) => Some(OwnWrite {
                deadline: Instant::now() + self.self_write_grace,
                fingerprint: fingerprint_image(&written),
            }),
            Err(err) => {
                warn!(error = %err, "could not fingerprint written image");
                None
            }
        };

        let mut notification = Notification::from_result(original_dims, original_bytes, &result);
        if let Some(history) = &self.history {
            match history.record(original_dims, original_bytes, &result) {
                Ok(entry) => {
                    if let Some(path) = entry.output_path {
                        notification = notification.with_output_location(path);
                    }
                }
                Err(err) => warn!(error = %err, "failed to record history"),
            }
        }

        info!(
            format = %result.format,
            quality = ?result.quality,
            "{}",
            notification.summary()
        );
        self.notifier.notify(&notification);
        Ok(WatchEvent::Replaced(notification))
    }

    /// Poll until `stop` is set.
    pub fn run(&mut self, stop: &AtomicBool) {
        info!(
            interval_ms = self.poll_interval.as_millis() as u64,
            max_dimension = self.constraints.max_dimension,
            max_bytes = self.constraints.max_bytes,
            "watching clipboard"
        );
        while !stop.load(Ordering::Relaxed) {
            match self.poll_once() {
                Ok(WatchEvent::Idle) => {}
                Ok(event) => trace!(?event, "poll"),
                Err(err) => warn!(error = %err, "clipboard poll failed"),
            }
            std::thread::sleep(self.poll_interval);
        }
        info!("watcher stopped");
    }
}
