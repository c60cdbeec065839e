// Integration tests for the compress module.
//
// Tests the full pipeline: compress -> stream bytes -> decompress, covering
// the reference scenarios, both format versions, section layout, backend
// interchangeability, and larger generated fields.

use oxiszx::compress::stats::block_count;
use oxiszx::compress::{
    Backend, BlockState, CompressOptions, EmulatedDevice, classify_blocks, compress,
    compress_with, decompress, inspect,
};
use oxiszx::error::{DecodeError, EncodeError};
use oxiszx::format::header::{FormatVersion, HEADER_LEN, StreamLayout};
use oxiszx::format::precision::PrecisionPlan;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn roundtrip(samples: &[f32], opts: &CompressOptions) -> Vec<f32> {
    let stream = compress(samples, opts).unwrap();
    let decoded = decompress(stream.as_bytes(), samples.len()).unwrap();
    for (i, (a, b)) in samples.iter().zip(&decoded).enumerate() {
        assert!(
            (a - b).abs() <= opts.error_bound,
            "sample {i}: {a} -> {b} (bound {}, stream {} bytes)",
            opts.error_bound,
            stream.len()
        );
    }
    decoded
}

fn generate_field(n: usize, seed: u64) -> Vec<f32> {
    let mut state = seed;
    (0..n)
        .map(|i| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let noise = ((state >> 40) as f32 / (1u64 << 24) as f32 - 0.5) * 0.01;
            (i as f32 * 0.003).sin() * 25.0 + noise
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Reference scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_identical_samples() {
    let samples = [1.0f32; 4];
    let c = classify_blocks(&samples, 4, 0.01).unwrap();
    assert_eq!(c.nb_blocks(), 1);
    assert_eq!(c.stats[0].radius, 0.0);
    assert_eq!(c.states[0], BlockState::Constant);

    let stream = compress_with(&samples, 0.01, 4).unwrap();
    let bytes = stream.as_bytes();
    // Header, one bitmap byte (block is constant: bit clear), one median.
    assert_eq!(bytes.len(), HEADER_LEN + 1 + 4);
    assert_eq!(bytes[HEADER_LEN], 0);
    assert_eq!(&bytes[HEADER_LEN + 1..], &1.0f32.to_be_bytes());
    assert_eq!(decompress(bytes, 4).unwrap(), vec![1.0; 4]);
}

#[test]
fn scenario_b_wide_bound_is_constant() {
    let samples = [0.0f32, 1.0, 2.0, 3.0];
    let c = classify_blocks(&samples, 4, 10.0).unwrap();
    assert_eq!(c.stats[0].radius, 1.5);
    assert_eq!(c.states[0], BlockState::Constant);

    let decoded = roundtrip(&samples, &CompressOptions::new(10.0, 4));
    assert_eq!(decoded, vec![1.5; 4]);
}

#[test]
fn scenario_c_variable_block() {
    let samples = [0.0f32, 100.0, 1.0, 99.0];
    let c = classify_blocks(&samples, 4, 0.001).unwrap();
    assert_eq!(c.stats[0].radius, 50.0);
    assert_eq!(c.states[0], BlockState::Variable);

    // exponent(50) = 5, exponent(0.001) = -10: 9 + 5 + 10 + 1.
    let plan = PrecisionPlan::new(0.001, 50.0, 50.0);
    assert_eq!(plan.req_length, 25);
    assert_eq!(plan.req_bytes(), 4);
    assert_eq!(plan.right_shift(), 7);

    roundtrip(&samples, &CompressOptions::new(0.001, 4));

    let summary = inspect(compress_with(&samples, 0.001, 4).unwrap().as_bytes(), 4).unwrap();
    assert_eq!(summary.blocks[0].req_length, Some(25));
}

#[test]
fn scenario_d_short_trailing_block() {
    let samples: Vec<f32> = (0..10).map(|i| i as f32 * 0.5).collect();
    assert_eq!(block_count(samples.len(), 4), 3);

    let opts = CompressOptions::new(0.25, 4);
    let stream = compress(&samples, &opts).unwrap();
    assert_eq!(stream.nb_blocks(), 3);

    let summary = inspect(stream.as_bytes(), samples.len()).unwrap();
    assert_eq!(summary.blocks[2].len, 2);
    // Trailing block [4.0, 4.5] has radius 0.25: constant at the boundary.
    assert_eq!(summary.blocks[2].state, BlockState::Constant);
    assert_eq!(summary.blocks[2].median, 4.25);

    roundtrip(&samples, &opts);
}

// ---------------------------------------------------------------------------
// Layout and size consistency
// ---------------------------------------------------------------------------

#[test]
fn output_size_is_sum_of_sections() {
    let samples = generate_field(5000, 7);
    for &block_size in &[1usize, 7, 64, 500] {
        let stream = compress_with(&samples, 0.05, block_size).unwrap();
        let summary = inspect(stream.as_bytes(), samples.len()).unwrap();
        let layout = StreamLayout::new(stream.nb_blocks(), stream.nb_constant_blocks()).unwrap();

        let expected = HEADER_LEN
            + 2 * stream.nb_variable_blocks()
            + stream.nb_blocks().div_ceil(8)
            + 4 * stream.nb_constant_blocks()
            + summary.payload_len();
        assert_eq!(stream.len(), expected, "block size {block_size}");
        assert_eq!(layout.fixed_len(), summary.fixed_len);
    }
}

#[test]
fn constant_blocks_reconstruct_to_median() {
    let mut samples = vec![3.0f32; 128];
    samples[5] = 3.004;
    samples[70] = 2.996;
    let decoded = roundtrip(&samples, &CompressOptions::new(0.005, 64));
    assert!(decoded[..64].iter().all(|&v| v == decoded[0]));
    assert!(decoded[64..].iter().all(|&v| v == decoded[64]));
}

#[test]
fn block_size_one_is_all_constant() {
    let samples = generate_field(100, 1);
    let stream = compress_with(&samples, 0.0, 1).unwrap();
    assert_eq!(stream.nb_constant_blocks(), 100);
    assert_eq!(decompress(stream.as_bytes(), 100).unwrap(), samples);
}

// ---------------------------------------------------------------------------
// Format versions
// ---------------------------------------------------------------------------

#[test]
fn legacy_and_portable_decode_alike() {
    let samples = generate_field(4096, 3);
    let legacy = CompressOptions {
        version: FormatVersion::Legacy,
        ..CompressOptions::new(0.05, 128)
    };
    let portable = CompressOptions::new(0.05, 128);

    let a = compress(&samples, &legacy).unwrap();
    let b = compress(&samples, &portable).unwrap();
    assert_eq!(&a.as_bytes()[..2], &[0, 1]);
    assert_eq!(&b.as_bytes()[..2], &[0, 2]);
    assert_eq!(a.len(), b.len());
    assert_eq!(
        decompress(a.as_bytes(), samples.len()).unwrap(),
        decompress(b.as_bytes(), samples.len()).unwrap()
    );
}

#[test]
fn legacy_reports_unsupported_precision() {
    let opts = CompressOptions {
        version: FormatVersion::Legacy,
        ..CompressOptions::new(1e-6, 64)
    };
    let err = compress(&generate_field(256, 9), &opts).unwrap_err();
    assert!(matches!(err, EncodeError::UnsupportedPrecision { req_bytes: 4, .. }));
}

#[test]
fn unknown_version_rejected() {
    let stream = compress_with(&[1.0; 8], 0.1, 4).unwrap();
    let mut bytes = stream.into_bytes();
    bytes[1] = 3;
    assert_eq!(
        decompress(&bytes, 8),
        Err(DecodeError::UnsupportedVersion { major: 0, minor: 3 })
    );
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

#[test]
fn emulated_offload_matches_software() {
    let samples = generate_field(20_000, 11);
    let software = compress_with(&samples, 0.01, 256).unwrap();

    let device = std::sync::Arc::new(std::sync::Mutex::new(EmulatedDevice::default()));
    let opts = CompressOptions {
        backend: Backend::Offload(device.clone()),
        ..CompressOptions::new(0.01, 256)
    };
    let offload = compress(&samples, &opts).unwrap();

    assert_eq!(software.as_bytes(), offload.as_bytes());
    let compressed = device.lock().unwrap().blocks_compressed();
    assert_eq!(compressed as usize, offload.nb_variable_blocks());
}

#[test]
fn emulated_offload_follows_stream_format() {
    let samples = generate_field(4096, 3);
    let legacy = CompressOptions {
        version: FormatVersion::Legacy,
        ..CompressOptions::new(0.01, 64)
    };

    let offload = CompressOptions {
        backend: Backend::offload(EmulatedDevice::new(FormatVersion::Legacy)),
        ..legacy.clone()
    };
    let stream = compress(&samples, &offload).unwrap();
    assert_eq!(stream, compress(&samples, &legacy).unwrap());
    let decoded = decompress(stream.as_bytes(), samples.len()).unwrap();
    for (a, b) in samples.iter().zip(&decoded) {
        assert!((a - b).abs() <= 0.01, "{a} vs {b}");
    }

    let mismatched = CompressOptions {
        backend: Backend::offload(EmulatedDevice::new(FormatVersion::Portable)),
        ..legacy
    };
    assert!(matches!(
        compress(&samples, &mismatched),
        Err(EncodeError::FormatMismatch { .. })
    ));
}

#[cfg(feature = "parallel")]
#[test]
fn parallel_output_is_identical() {
    let samples = generate_field(100_000, 5);
    let opts = CompressOptions::new(0.001, 64);
    let serial = compress(&samples, &opts).unwrap();
    let parallel = oxiszx::compress::compress_parallel(&samples, &opts).unwrap();
    assert_eq!(serial, parallel);
}

// ---------------------------------------------------------------------------
// Larger data
// ---------------------------------------------------------------------------

#[test]
fn generated_field_compresses() {
    let samples = generate_field(1 << 18, 42);
    let opts = CompressOptions::new(0.01, 64);
    let stream = compress(&samples, &opts).unwrap();
    assert!(stream.len() < samples.len() * 4, "no gain: {} bytes", stream.len());
    roundtrip(&samples, &opts);
}

#[test]
fn tight_bounds_roundtrip() {
    let samples = generate_field(10_000, 99);
    for &bound in &[1.0f32, 0.1, 1e-3, 1e-5] {
        roundtrip(&samples, &CompressOptions::new(bound, 100));
    }
}
