#![no_main]

use arbitrary::Arbitrary;
use clipshrink::engine::{process, ImageBuffer};
use clipshrink::ops::Constraints;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    max_dimension: u16,
    max_bytes: u32,
    data: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let Ok(buffer) = ImageBuffer::decode(&input.data) else {
        return;
    };
    // Keep the search cheap: fuzz inputs can decode to large images.
    if buffer.width() as u64 * buffer.height() as u64 > 4_000_000 {
        return;
    }
    let Ok(constraints) = Constraints::new(
        (input.max_dimension as u32).max(1),
        (input.max_bytes as usize).max(1),
    ) else {
        return;
    };
    if let Ok(outcome) = process(&buffer, &constraints) {
        if let Some(result) = outcome.encoded() {
            assert!(result.width <= buffer.width() && result.height <= buffer.height());
            assert!(result.width.max(result.height) <= constraints.max_dimension);
        }
    }
});
