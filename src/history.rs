// src/history.rs
//
// Persistent record of clipboard replacements.
//
// One JSON object per line. The log is bounded: once `max_entries` is
// exceeded the oldest entries are dropped and the file is rewritten
// atomically. Appends within the bound only touch the end of the file.
// Optionally every encoded result is also saved as `clip-<timestamp>.<ext>`.

use crate::engine::write_atomic;
use crate::error::{Result, ShrinkError};
use crate::ops::{EncodedResult, OutputFormat};
use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_MAX_ENTRIES: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub original_width: u32,
    pub original_height: u32,
    pub new_width: u32,
    pub new_height: u32,
    pub original_bytes: Option<usize>,
    pub new_bytes: usize,
    pub format: OutputFormat,
    pub output_path: Option<PathBuf>,
}

/// Parse one line of the history file. `line_no` is 1-based, for messages.
pub fn parse_line(path: &Path, line_no: usize, line: &str) -> Result<HistoryEntry> {
    serde_json::from_str(line).map_err(|e| {
        ShrinkError::history_corrupted(path.display().to_string(), format!("line {line_no}: {e}"))
    })
}

#[derive(Debug)]
pub struct HistoryLog {
    path: PathBuf,
    output_dir: Option<PathBuf>,
    max_entries: usize,
    entries: Mutex<VecDeque<HistoryEntry>>,
}

impl HistoryLog {
    /// Open (or start) the log at `path`. Malformed lines are skipped and
    /// dropped on the next rewrite.
    pub fn open(path: impl Into<PathBuf>, max_entries: usize) -> Result<Self> {
        let path = path.into();
        if max_entries == 0 {
            return Err(ShrinkError::invalid_argument(
                "max_history_entries",
                "0",
                "must be at least 1",
            ));
        }

        let mut entries = VecDeque::new();
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                for (idx, line) in text.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_line(&path, idx + 1, line) {
                        Ok(entry) => entries.push_back(entry),
                        Err(err) => warn!(error = %err, "skipping history entry"),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ShrinkError::file_read_failed(path.display().to_string(), e)),
        }
        while entries.len() > max_entries {
            entries.pop_front();
        }
        debug!(path = %path.display(), entries = entries.len(), "history loaded");

        Ok(Self {
            path,
            output_dir: None,
            max_entries,
            entries: Mutex::new(entries),
        })
    }

    /// Also save every encoded result under `dir`.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    fn save_output(&self, result: &EncodedResult, now: DateTime<Local>) -> Result<Option<PathBuf>> {
        let Some(dir) = &self.output_dir else {
            return Ok(None);
        };
        std::fs::create_dir_all(dir)
            .map_err(|e| ShrinkError::file_write_failed(dir.display().to_string(), e))?;
        let name = format!(
            "clip-{}.{}",
            now.format("%Y%m%d-%H%M%S%.3f"),
            result.format.extension()
        );
        let path = dir.join(name);
        write_atomic(&path, &result.bytes)?;
        Ok(Some(path))
    }

    /// Record one replacement, saving the encoded bytes first when an output
    /// directory is configured.
    pub fn record(
        &self,
        original_dims: (u32, u32),
        original_bytes: Option<usize>,
        result: &EncodedResult,
    ) -> Result<HistoryEntry> {
        let now = Local::now();
        let output_path = self.save_output(result, now)?;
        let entry = HistoryEntry {
            timestamp: now.with_timezone(&Utc),
            original_width: original_dims.0,
            original_height: original_dims.1,
            new_width: result.width,
            new_height: result.height,
            original_bytes,
            new_bytes: result.len(),
            format: result.format,
            output_path,
        };

        let mut entries = self.entries.lock();
        entries.push_back(entry.clone());
        if entries.len() > self.max_entries {
            while entries.len() > self.max_entries {
                entries.pop_front();
            }
            self.rewrite(&entries)?;
        } else {
            self.append(&entry)?;
        }
        Ok(entry)
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ShrinkError::file_write_failed(parent.display().to_string(), e))?;
        }
        Ok(())
    }

    fn append(&self, entry: &HistoryEntry) -> Result<()> {
        self.ensure_parent()?;
        let line = to_line(entry)?;
        let display = self.path.display().to_string();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ShrinkError::file_write_failed(display.clone(), e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| ShrinkError::file_write_failed(display, e))
    }

    fn rewrite(&self, entries: &VecDeque<HistoryEntry>) -> Result<()> {
        self.ensure_parent()?;
        let mut buf = String::new();
        for entry in entries {
            buf.push_str(&to_line(entry)?);
        }
        write_atomic(&self.path, buf.as_bytes())
    }

    /// Drop every entry and truncate the file.
    pub fn clear(&self) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.clear();
        self.rewrite(&entries)
    }
}

fn to_line(entry: &HistoryEntry) -> Result<String> {
    let mut line = serde_json::to_string(entry)
        .map_err(|e| ShrinkError::internal_panic(format!("history serialization: {e}")))?;
    line.push('\n');
    Ok(line)
}
