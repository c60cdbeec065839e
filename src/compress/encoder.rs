// Stream assembler.
//
// compress() turns a sample sequence into one self-describing stream:
//   - Blocks are classified once (stats.rs)
//   - Fixed sections (header, size table, state bitmap, constant medians)
//     are laid out up front from the block counts and written in place
//   - Variable block payloads are appended in block order, each one's size
//     back-filled into its size table entry
//
// The output is reserved at `4 * n` bytes (the raw input size). Tiny or
// incompressible inputs can exceed that; strict mode turns the overrun
// into an error, otherwise the buffer grows and the overrun is logged.

use crate::compress::backend::Backend;
use crate::compress::stats::{BlockClassification, BlockState, classify_blocks};
use crate::error::EncodeError;
use crate::format::bitpack::pack_1b_into;
use crate::format::header::{FormatVersion, StreamFlags, StreamHeader, StreamLayout};

#[cfg(feature = "parallel")]
use crate::compress::stats::BlockStats;
#[cfg(feature = "parallel")]
use crate::format::block;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for one compression call.
#[derive(Debug, Clone)]
pub struct CompressOptions {
    /// Maximum absolute reconstruction error per sample.
    pub error_bound: f32,
    /// Samples per block. The last block may be shorter.
    pub block_size: usize,
    /// On-disk format variant to write.
    pub version: FormatVersion,
    /// Encoder used for variable blocks.
    pub backend: Backend,
    /// Fail with `CapacityExceeded` instead of growing past `4 * n` bytes.
    pub strict_capacity: bool,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            error_bound: 1e-3,
            block_size: 64,
            version: FormatVersion::default(),
            backend: Backend::default(),
            strict_capacity: false,
        }
    }
}

impl CompressOptions {
    /// Options with the given bound and block size, defaults elsewhere.
    pub fn new(error_bound: f32, block_size: usize) -> Self {
        Self {
            error_bound,
            block_size,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), EncodeError> {
        if !self.error_bound.is_finite() || self.error_bound < 0.0 {
            return Err(EncodeError::InvalidErrorBound(self.error_bound));
        }
        if self.block_size == 0 {
            return Err(EncodeError::InvalidBlockSize(self.block_size));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// A finished compressed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedStream {
    bytes: Vec<u8>,
    nb_blocks: usize,
    nb_constant_blocks: usize,
}

impl CompressedStream {
    /// Total stream length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Number of blocks, including a short trailing block.
    pub fn nb_blocks(&self) -> usize {
        self.nb_blocks
    }

    pub fn nb_constant_blocks(&self) -> usize {
        self.nb_constant_blocks
    }

    pub fn nb_variable_blocks(&self) -> usize {
        self.nb_blocks - self.nb_constant_blocks
    }
}

impl AsRef<[u8]> for CompressedStream {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

// ---------------------------------------------------------------------------
// Stream writer
// ---------------------------------------------------------------------------

/// Output buffer with its fixed sections already written; payloads are
/// appended through `push_block`.
struct StreamWriter<'a> {
    opts: &'a CompressOptions,
    layout: StreamLayout,
    out: Vec<u8>,
    capacity: usize,
    next_entry: usize,
    payload_bytes: usize,
}

impl<'a> StreamWriter<'a> {
    fn begin(
        samples_len: usize,
        classification: &BlockClassification,
        opts: &'a CompressOptions,
    ) -> Result<Self, EncodeError> {
        let layout = StreamLayout::new(
            classification.nb_blocks(),
            classification.nb_constant_blocks,
        )
        .ok_or(EncodeError::AllocationFailure {
            what: "output",
            bytes: usize::MAX,
        })?;
        let capacity = samples_len.saturating_mul(std::mem::size_of::<f32>());

        let reserve = capacity.max(layout.fixed_len());
        let mut out = Vec::new();
        out.try_reserve_exact(reserve)
            .map_err(EncodeError::alloc("output", reserve))?;
        out.resize(layout.fixed_len(), 0);

        StreamHeader {
            version: opts.version,
            flags: StreamFlags::default(),
            block_size: opts.block_size as u64,
            nb_constant_blocks: classification.nb_constant_blocks as u64,
        }
        .encode(&mut out[layout.header.clone()]);

        let mut bits = Vec::new();
        bits.try_reserve_exact(classification.nb_blocks())
            .map_err(EncodeError::alloc("state array", classification.nb_blocks()))?;
        bits.extend(classification.states.iter().map(|s| s.bit()));
        pack_1b_into(&bits, &mut out[layout.state_bitmap.clone()]);

        let constants = classification
            .stats
            .iter()
            .zip(&classification.states)
            .filter(|(_, state)| **state == BlockState::Constant);
        for (i, (stats, _)) in constants.enumerate() {
            out[layout.constant_median(i)].copy_from_slice(&opts.version.f32_to_bytes(stats.median));
        }

        let writer = Self {
            opts,
            layout,
            out,
            capacity,
            next_entry: 0,
            payload_bytes: 0,
        };
        writer.check_capacity()?;
        Ok(writer)
    }

    /// Record the size of the payload that was just appended to `out`.
    fn record_block(&mut self, block: usize, size: usize) -> Result<(), EncodeError> {
        let entry = u16::try_from(size).map_err(|_| EncodeError::BlockTooLarge { block, size })?;
        let range = self.layout.size_entry(self.next_entry);
        self.out[range].copy_from_slice(&self.opts.version.u16_to_bytes(entry));
        self.next_entry += 1;
        self.payload_bytes += size;
        log::trace!("block {block}: {size} bytes");
        self.check_capacity()
    }

    /// Append a payload encoded elsewhere.
    #[cfg(feature = "parallel")]
    fn push_block(&mut self, block: usize, payload: &[u8]) -> Result<(), EncodeError> {
        self.out
            .try_reserve(payload.len())
            .map_err(EncodeError::alloc("output", payload.len()))?;
        self.out.extend_from_slice(payload);
        self.record_block(block, payload.len())
    }

    fn check_capacity(&self) -> Result<(), EncodeError> {
        if self.opts.strict_capacity && self.out.len() > self.capacity {
            return Err(EncodeError::CapacityExceeded {
                size: self.out.len(),
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    fn finish(self, classification: &BlockClassification) -> CompressedStream {
        debug_assert_eq!(self.next_entry, classification.nb_variable_blocks());
        debug_assert_eq!(self.out.len(), self.layout.fixed_len() + self.payload_bytes);

        if self.out.len() > self.capacity {
            log::warn!(
                "compressed stream ({} bytes) exceeds the {}-byte input size",
                self.out.len(),
                self.capacity
            );
        }

        CompressedStream {
            bytes: self.out,
            nb_blocks: classification.nb_blocks(),
            nb_constant_blocks: classification.nb_constant_blocks,
        }
    }
}

fn log_summary(classification: &BlockClassification) {
    let nb_blocks = classification.nb_blocks();
    let percent = if nb_blocks == 0 {
        0.0
    } else {
        classification.nb_constant_blocks as f64 * 100.0 / nb_blocks as f64
    };
    log::debug!(
        "blocks: {nb_blocks}, constant: {} ({percent:.1}%)",
        classification.nb_constant_blocks
    );
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Compress `samples` into a single stream.
///
/// Every decoded sample is within `opts.error_bound` of its input, with two
/// exceptions. Blocks holding non-finite values are stored bit-exact. A
/// constant block (radius within the bound) decodes to its f32 median, which
/// can land one ulp past the bound when the bound is smaller than the ulp of
/// the block's values, e.g. `[16.0, 16.000002]` with a bound of `1e-6`.
pub fn compress(samples: &[f32], opts: &CompressOptions) -> Result<CompressedStream, EncodeError> {
    opts.validate()?;
    let classification = classify_blocks(samples, opts.block_size, opts.error_bound)?;
    log_summary(&classification);

    let mut writer = StreamWriter::begin(samples.len(), &classification, opts)?;
    let mut encoder = opts.backend.encoder(opts.version, opts.block_size)?;

    let blocks = samples
        .chunks(opts.block_size)
        .zip(classification.stats.iter().zip(&classification.states))
        .enumerate();
    for (i, (block, (stats, state))) in blocks {
        if *state == BlockState::Constant {
            continue;
        }
        let size = encoder.encode_block(block, opts.error_bound, stats, &mut writer.out)?;
        writer.record_block(i, size)?;
    }

    Ok(writer.finish(&classification))
}

/// Compress with the default format and software backend.
pub fn compress_with(
    samples: &[f32],
    error_bound: f32,
    block_size: usize,
) -> Result<CompressedStream, EncodeError> {
    compress(samples, &CompressOptions::new(error_bound, block_size))
}

/// Compress with variable blocks encoded in parallel.
///
/// The output is byte-identical to [`compress`]. Offload backends drive a
/// single shared device and run through [`compress`] unchanged.
#[cfg(feature = "parallel")]
pub fn compress_parallel(
    samples: &[f32],
    opts: &CompressOptions,
) -> Result<CompressedStream, EncodeError> {
    if opts.backend.is_offload() {
        return compress(samples, opts);
    }
    opts.validate()?;
    let classification = classify_blocks(samples, opts.block_size, opts.error_bound)?;
    log_summary(&classification);

    let variable: Vec<(usize, &[f32], &BlockStats)> = samples
        .chunks(opts.block_size)
        .zip(classification.stats.iter().zip(&classification.states))
        .enumerate()
        .filter(|(_, (_, (_, state)))| **state == BlockState::Variable)
        .map(|(i, (chunk, (stats, _)))| (i, chunk, stats))
        .collect();

    let payloads: Result<Vec<Vec<u8>>, EncodeError> = variable
        .par_iter()
        .map(|&(_, chunk, stats)| {
            let mut leads = Vec::new();
            let mut payload = Vec::new();
            block::encode_block(
                chunk,
                f64::from(opts.error_bound),
                stats.median,
                stats.radius,
                opts.version,
                &mut leads,
                &mut payload,
            )?;
            Ok::<_, EncodeError>(payload)
        })
        .collect();
    let payloads = payloads?;

    let mut writer = StreamWriter::begin(samples.len(), &classification, opts)?;
    for (&(i, _, _), payload) in variable.iter().zip(&payloads) {
        writer.push_block(i, payload)?;
    }
    Ok(writer.finish(&classification))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
