// Stream decoder.
//
// decompress() is the inverse of compress(): it walks the fixed sections to
// recover each block's state and payload size, then fills constant blocks
// with their median and rebuilds variable blocks through format::block.
//
// The stream does not record its element count, so the caller passes it.
// Every section is bounds-checked; a payload must consume exactly the bytes
// its size table entry claims, and no bytes may follow the last payload.

use crate::compress::stats::{BlockState, block_count};
use crate::error::DecodeError;
use crate::format::bitpack::unpack_1b;
use crate::format::block::{decode_block, read_block_plan};
use crate::format::header::{FormatVersion, StreamHeader, StreamLayout};

// ---------------------------------------------------------------------------
// Parsed fixed sections
// ---------------------------------------------------------------------------

struct ParsedStream {
    header: StreamHeader,
    layout: StreamLayout,
    block_size: usize,
    states: Vec<BlockState>,
    sizes: Vec<u16>,
}

impl ParsedStream {
    fn parse(data: &[u8], len: usize) -> Result<Self, DecodeError> {
        let header = StreamHeader::decode(data)?;
        let version = header.version;

        let block_size = usize::try_from(header.block_size).map_err(|_| {
            DecodeError::InvalidHeader(format!("block size {} too large", header.block_size))
        })?;
        let nb_blocks = block_count(len, block_size);
        let nb_constant = usize::try_from(header.nb_constant_blocks)
            .ok()
            .filter(|&c| c <= nb_blocks)
            .ok_or_else(|| {
                DecodeError::InvalidHeader(format!(
                    "{} constant blocks in a stream of {nb_blocks} blocks",
                    header.nb_constant_blocks
                ))
            })?;

        let layout = StreamLayout::new(nb_blocks, nb_constant).ok_or_else(|| {
            DecodeError::InvalidHeader(format!("{len} samples overflow the section layout"))
        })?;
        if data.len() < layout.fixed_len() {
            return Err(DecodeError::Truncated {
                section: "fixed sections",
                needed: layout.fixed_len(),
                available: data.len(),
            });
        }

        let states: Vec<BlockState> = unpack_1b(&data[layout.state_bitmap.clone()], nb_blocks)?
            .into_iter()
            .map(BlockState::from_bit)
            .collect();
        let counted = states.iter().filter(|s| **s == BlockState::Constant).count();
        if counted != nb_constant {
            return Err(DecodeError::Corrupt(format!(
                "state bitmap marks {counted} constant blocks, header says {nb_constant}"
            )));
        }

        let sizes = (0..nb_blocks - nb_constant)
            .map(|i| {
                let r = layout.size_entry(i);
                version.u16_from_bytes([data[r.start], data[r.start + 1]])
            })
            .collect();

        Ok(Self {
            header,
            layout,
            block_size,
            states,
            sizes,
        })
    }

    fn version(&self) -> FormatVersion {
        self.header.version
    }

    /// Length of block `i` out of `len` samples.
    fn block_len(&self, i: usize, len: usize) -> usize {
        let start = i * self.block_size;
        self.block_size.min(len - start)
    }

    fn constant_median(&self, data: &[u8], i: usize) -> f32 {
        let r = self.layout.constant_median(i);
        self.version()
            .f32_from_bytes([data[r.start], data[r.start + 1], data[r.start + 2], data[r.start + 3]])
    }
}

/// Slice the payload of the next variable block starting at `cursor`.
fn payload_at(data: &[u8], cursor: usize, size: u16) -> Result<&[u8], DecodeError> {
    let end = cursor + usize::from(size);
    data.get(cursor..end).ok_or(DecodeError::Truncated {
        section: "block payload",
        needed: end,
        available: data.len(),
    })
}

fn check_trailing(data: &[u8], cursor: usize) -> Result<(), DecodeError> {
    if cursor != data.len() {
        return Err(DecodeError::Corrupt(format!(
            "{} trailing bytes after the last block",
            data.len() - cursor
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Decompression
// ---------------------------------------------------------------------------

/// Decompress a stream holding `len` samples.
pub fn decompress(data: &[u8], len: usize) -> Result<Vec<f32>, DecodeError> {
    let parsed = ParsedStream::parse(data, len)?;
    let version = parsed.version();

    let mut out = Vec::new();
    out.try_reserve_exact(len)
        .map_err(|_| DecodeError::AllocationFailure(len.saturating_mul(std::mem::size_of::<f32>())))?;
    let mut leads = Vec::new();

    let mut cursor = parsed.layout.blocks_start;
    let (mut next_constant, mut next_variable) = (0usize, 0usize);

    for (i, state) in parsed.states.iter().enumerate() {
        let block_len = parsed.block_len(i, len);
        match state {
            BlockState::Constant => {
                let median = parsed.constant_median(data, next_constant);
                out.extend(std::iter::repeat_n(median, block_len));
                next_constant += 1;
            }
            BlockState::Variable => {
                let size = parsed.sizes[next_variable];
                let payload = payload_at(data, cursor, size)?;
                let used = decode_block(payload, block_len, version, &mut leads, &mut out)?;
                if used != payload.len() {
                    return Err(DecodeError::Corrupt(format!(
                        "block {i} uses {used} of its {size} payload bytes"
                    )));
                }
                log::trace!("block {i}: {size} bytes -> {block_len} samples");
                cursor += payload.len();
                next_variable += 1;
            }
        }
    }

    check_trailing(data, cursor)?;
    debug_assert_eq!(out.len(), len);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

/// One block as recorded in a stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockSummary {
    pub index: usize,
    pub state: BlockState,
    /// Number of samples in the block.
    pub len: usize,
    /// Stored median (constant blocks) or payload median (variable blocks).
    pub median: f32,
    /// Variable blocks only.
    pub req_length: Option<u8>,
    /// Variable blocks only.
    pub payload_size: Option<u16>,
}

/// Layout and per-block facts of a stream, read without reconstructing
/// samples.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    pub version: FormatVersion,
    pub block_size: u64,
    pub nb_blocks: usize,
    pub nb_constant_blocks: usize,
    /// Bytes before the first payload.
    pub fixed_len: usize,
    pub total_len: usize,
    pub blocks: Vec<BlockSummary>,
}

impl StreamSummary {
    pub fn nb_variable_blocks(&self) -> usize {
        self.nb_blocks - self.nb_constant_blocks
    }

    /// Sum of the variable block payload sizes.
    pub fn payload_len(&self) -> usize {
        self.blocks
            .iter()
            .filter_map(|b| b.payload_size)
            .map(usize::from)
            .sum()
    }
}

/// Read the layout of a stream holding `len` samples.
pub fn inspect(data: &[u8], len: usize) -> Result<StreamSummary, DecodeError> {
    let parsed = ParsedStream::parse(data, len)?;
    let version = parsed.version();

    let mut blocks = Vec::with_capacity(parsed.states.len());
    let mut cursor = parsed.layout.blocks_start;
    let (mut next_constant, mut next_variable) = (0usize, 0usize);

    for (index, &state) in parsed.states.iter().enumerate() {
        let block_len = parsed.block_len(index, len);
        let summary = match state {
            BlockState::Constant => {
                let median = parsed.constant_median(data, next_constant);
                next_constant += 1;
                BlockSummary {
                    index,
                    state,
                    len: block_len,
                    median,
                    req_length: None,
                    payload_size: None,
                }
            }
            BlockState::Variable => {
                let size = parsed.sizes[next_variable];
                let payload = payload_at(data, cursor, size)?;
                let plan = read_block_plan(payload, version)?;
                cursor += payload.len();
                next_variable += 1;
                BlockSummary {
                    index,
                    state,
                    len: block_len,
                    median: plan.median,
                    req_length: Some(plan.req_length),
                    payload_size: Some(size),
                }
            }
        };
        blocks.push(summary);
    }

    check_trailing(data, cursor)?;
    Ok(StreamSummary {
        version,
        block_size: parsed.header.block_size,
        nb_blocks: parsed.states.len(),
        nb_constant_blocks: next_constant,
        fixed_len: parsed.layout.fixed_len(),
        total_len: data.len(),
        blocks,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
