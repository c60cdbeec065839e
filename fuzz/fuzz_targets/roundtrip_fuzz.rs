#![no_main]
use libfuzzer_sys::fuzz_target;
use oxiszx::compress::{BlockState, CompressOptions, compress, decompress, inspect};
use oxiszx::format::header::FormatVersion;

/// Distance from `v` to the next representable value away from zero.
fn ulp(v: f32) -> f32 {
    let a = v.abs();
    f32::from_bits(a.to_bits() + 1) - a
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }

    // Control bytes: block size, error bound exponent, format version.
    let block_size = usize::from(data[0]) + 1;
    let error_bound = 10f32.powi(-i32::from(data[1] % 7));
    let version = if data[2] & 1 == 0 {
        FormatVersion::Portable
    } else {
        FormatVersion::Legacy
    };

    let samples: Vec<f32> = data[3..]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .filter(|v| v.is_finite())
        .collect();

    let opts = CompressOptions {
        version,
        ..CompressOptions::new(error_bound, block_size)
    };
    // Legacy streams cannot hold full-width blocks; that is a reported error.
    let Ok(stream) = compress(&samples, &opts) else {
        return;
    };

    let decoded = decompress(stream.as_bytes(), samples.len()).unwrap();
    assert_eq!(decoded.len(), samples.len());

    // A constant block decodes to its rounded median, which may sit one ulp
    // past a bound smaller than the block's ulp.
    let summary = inspect(stream.as_bytes(), samples.len()).unwrap();
    let blocks = samples.chunks(block_size).zip(decoded.chunks(block_size));
    for (info, (input, output)) in summary.blocks.iter().zip(blocks) {
        let slack = match info.state {
            BlockState::Constant => input.iter().map(|v| ulp(*v)).fold(0.0, f32::max),
            BlockState::Variable => 0.0,
        };
        for (a, b) in input.iter().zip(output) {
            assert!(
                (a - b).abs() <= error_bound + slack,
                "{a} vs {b} (bound {error_bound}, block {})",
                info.index
            );
        }
    }
});
