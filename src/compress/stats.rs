// Per-block statistics and constant/variable classification.
//
// One linear pass per block. A block whose radius is within the error bound
// is constant and stored as its median alone. The median is rounded to f32,
// so when the bound is below one ulp of the block's values a constant block
// can reconstruct up to one ulp past the bound.

use crate::error::EncodeError;

/// Range statistics of one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockStats {
    pub min: f32,
    pub max: f32,
    /// Half the value range.
    pub radius: f32,
    /// `min + radius`.
    pub median: f32,
}

impl BlockStats {
    /// Scan `block` (non-empty) for its extremes.
    ///
    /// Comparisons are strict, so the first of several equal extremes wins
    /// and NaN samples after the first are skipped.
    pub fn of(block: &[f32]) -> Self {
        debug_assert!(!block.is_empty());
        let first = block[0];
        let (mut min, mut max) = (first, first);
        for &v in &block[1..] {
            if min > v {
                min = v;
            } else if max < v {
                max = v;
            }
        }
        let radius = (max - min) / 2.0;
        Self {
            min,
            max,
            radius,
            median: min + radius,
        }
    }
}

/// Classification of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockState {
    /// Stored as its median only.
    Constant,
    /// Stored as a delta-XOR payload.
    Variable,
}

impl BlockState {
    /// Classify a block radius against the error bound (inclusive).
    #[inline]
    pub fn classify(radius: f32, error_bound: f32) -> Self {
        if radius <= error_bound {
            Self::Constant
        } else {
            Self::Variable
        }
    }

    /// Bit recorded in the state bitmap.
    #[inline]
    pub fn bit(self) -> u8 {
        match self {
            Self::Constant => 0,
            Self::Variable => 1,
        }
    }

    #[inline]
    pub fn from_bit(bit: u8) -> Self {
        if bit == 0 {
            Self::Constant
        } else {
            Self::Variable
        }
    }
}

/// Statistics and states for every block of a sample sequence.
#[derive(Debug, Clone, Default)]
pub struct BlockClassification {
    pub stats: Vec<BlockStats>,
    pub states: Vec<BlockState>,
    pub nb_constant_blocks: usize,
}

impl BlockClassification {
    /// Total number of blocks, including a short trailing block.
    pub fn nb_blocks(&self) -> usize {
        self.states.len()
    }

    pub fn nb_variable_blocks(&self) -> usize {
        self.nb_blocks() - self.nb_constant_blocks
    }
}

/// Number of blocks covering `len` samples.
#[inline]
pub fn block_count(len: usize, block_size: usize) -> usize {
    len.div_ceil(block_size)
}

/// Compute statistics and states for all blocks of `samples`.
pub fn classify_blocks(
    samples: &[f32],
    block_size: usize,
    error_bound: f32,
) -> Result<BlockClassification, EncodeError> {
    if block_size == 0 {
        return Err(EncodeError::InvalidBlockSize(block_size));
    }
    let nb_blocks = block_count(samples.len(), block_size);

    let mut stats = Vec::new();
    stats.try_reserve_exact(nb_blocks).map_err(EncodeError::alloc(
        "median/radius arrays",
        nb_blocks * std::mem::size_of::<BlockStats>(),
    ))?;
    let mut states = Vec::new();
    states
        .try_reserve_exact(nb_blocks)
        .map_err(EncodeError::alloc("state array", nb_blocks))?;

    let mut nb_constant_blocks = 0;
    for block in samples.chunks(block_size) {
        let s = BlockStats::of(block);
        let state = BlockState::classify(s.radius, error_bound);
        if state == BlockState::Constant {
            nb_constant_blocks += 1;
        }
        stats.push(s);
        states.push(state);
    }

    Ok(BlockClassification {
        stats,
        states,
        nb_constant_blocks,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
