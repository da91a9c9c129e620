// src/engine/io.rs
//
// I/O operations: Source enum (in-memory or memory-mapped) and atomic writes.

use crate::error::ShrinkError;
use memmap2::Mmap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Image source - in-memory data or a memory-mapped file.
#[derive(Clone, Debug)]
pub enum Source {
    /// In-memory image data
    Memory(Arc<Vec<u8>>),
    /// Memory-mapped file (zero-copy access)
    Mapped(Arc<Mmap>),
}

impl Source {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Source::Memory(Arc::new(bytes))
    }

    /// Memory-map `path`.
    pub fn open(path: &Path) -> std::result::Result<Self, ShrinkError> {
        let display = path.display().to_string();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ShrinkError::file_not_found(display.clone())
            } else {
                ShrinkError::file_read_failed(display.clone(), e)
            }
        })?;

        let len = file
            .metadata()
            .map_err(|e| ShrinkError::file_read_failed(display.clone(), e))?
            .len();
        // Zero-length files cannot be mapped on every platform.
        if len == 0 {
            return Ok(Source::from_bytes(Vec::new()));
        }

        // Safety: We assume the file won't be modified externally during processing.
        // If modified, decoding may fail, produce corrupted images, or cause OS-dependent SIGBUS/SIGSEGV.
        let mmap = unsafe { Mmap::map(&file).map_err(|e| ShrinkError::mmap_failed(display, e))? };
        Ok(Source::Mapped(Arc::new(mmap)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Source::Memory(data) => data.as_slice(),
            Source::Mapped(mmap) => mmap.as_ref(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Write `data` to `path` atomically: temp file in the same directory,
/// fsync, then rename. tempfile cleans up on failure.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::result::Result<(), ShrinkError> {
    let output_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut temp_file = NamedTempFile::new_in(output_dir)
        .map_err(|e| ShrinkError::file_write_failed(output_dir.display().to_string(), e))?;

    let temp_path = temp_file.path().to_path_buf();
    temp_file
        .write_all(data)
        .map_err(|e| ShrinkError::file_write_failed(temp_path.display().to_string(), e))?;
    temp_file
        .as_file_mut()
        .sync_all()
        .map_err(|e| ShrinkError::file_write_failed(temp_path.display().to_string(), e))?;

    temp_file
        .persist(path)
        .map_err(|e| ShrinkError::file_write_failed(path.display().to_string(), e.error))?;
    Ok(())
}
