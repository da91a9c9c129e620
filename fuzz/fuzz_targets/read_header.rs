#![no_main]

use clipshrink::engine::{check_dimensions, read_header};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = read_header(data) {
        let _ = check_dimensions(header.width, header.height);
    }
});
