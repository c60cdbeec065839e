#![no_main]
use libfuzzer_sys::fuzz_target;
use oxiszx::compress::{decompress, inspect};

fuzz_target!(|data: &[u8]| {
    // The decoder must never panic, only return errors.
    if data.len() < 2 {
        return;
    }

    // First two bytes pick the element count.
    let len = usize::from(u16::from_le_bytes([data[0], data[1]]));
    let stream = &data[2..];
    let _ = decompress(stream, len);
    let _ = inspect(stream, len);
});
