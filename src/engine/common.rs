// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Codec crates (mozjpeg in particular) can panic on malformed input; every
// codec call goes through run_with_panic_policy so a bad clipboard image never
// takes the watcher down.

use crate::error::ShrinkError;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub type EngineResult<T> = std::result::Result<T, ShrinkError>;

/// Run `f`, converting a panic into `ShrinkError::InternalPanic` tagged with
/// `stage`.
pub fn run_with_panic_policy<T, F>(stage: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            tracing::error!(stage, %detail, "codec panicked");
            Err(ShrinkError::internal_panic(format!(
                "{stage}: panic: {detail}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_ok_and_err() {
        assert_eq!(run_with_panic_policy("t", || Ok(3)).unwrap(), 3);
        let err = run_with_panic_policy::<(), _>("t", || Err(ShrinkError::corrupted_image()))
            .unwrap_err();
        assert!(matches!(err, ShrinkError::CorruptedImage));
    }

    #[test]
    fn converts_panic_into_internal_error() {
        let err = run_with_panic_policy::<(), _>("encode:test", || panic!("kaboom")).unwrap_err();
        match err {
            ShrinkError::InternalPanic { message } => {
                assert!(message.contains("encode:test"));
                assert!(message.contains("kaboom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
