// lib.rs
//
// clipshrink: keeps clipboard images under a size and dimension budget
//
// - engine: pure resize-and-compress search (no globals, no I/O)
// - clipboard / watcher: polling glue around a shared clipboard
// - notify / history: before/after reporting
// - config / logging: ambient setup for the binary

pub mod clipboard;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod logging;
pub mod notify;
pub mod ops;
pub mod watcher;

pub use config::Config;
pub use engine::{compress, process, process_with, EncodeSettings, ImageBuffer, ScaleTiers};
pub use error::{ErrorCategory, Result, ShrinkError};
pub use ops::{Constraints, EncodedResult, Outcome, OutputFormat};
pub use watcher::{ClipboardWatcher, WatchEvent};
