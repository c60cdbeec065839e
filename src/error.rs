// Error types shared by the format layer and the compress pipeline.
//
// Encoding fails only on resource or configuration problems; decoding
// additionally rejects malformed streams. Neither path panics on bad input.

use std::collections::TryReserveError;

use thiserror::Error;

use crate::format::header::FormatVersion;

// ---------------------------------------------------------------------------
// Encode errors
// ---------------------------------------------------------------------------

/// Errors raised while compressing a sample sequence.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A scratch or output buffer could not be acquired.
    #[error("allocation failure: {what} ({bytes} bytes)")]
    AllocationFailure {
        /// Which buffer failed (e.g. "output", "state array").
        what: &'static str,
        /// Requested size in bytes.
        bytes: usize,
    },

    /// A block needs four stored bytes per value, which the selected
    /// format version cannot express.
    #[error("unsupported precision: reqLength {req_length} needs {req_bytes} bytes per value")]
    UnsupportedPrecision {
        /// Required bit length computed by the precision planner.
        req_length: u8,
        /// Bytes per value derived from `req_length`.
        req_bytes: u8,
    },

    /// The stream outgrew the `4 * n` capacity in strict mode.
    #[error("compressed size {size} exceeds capacity {capacity}")]
    CapacityExceeded {
        /// Bytes the stream would occupy.
        size: usize,
        /// Bytes reserved for the stream (`4 * n`).
        capacity: usize,
    },

    /// `block_size` must be at least 1.
    #[error("invalid block size: {0}")]
    InvalidBlockSize(usize),

    /// The error bound must be finite and non-negative.
    #[error("invalid error bound: {0}")]
    InvalidErrorBound(f32),

    /// A compressed block does not fit the 16-bit size table entry.
    #[error("block {block} compressed to {size} bytes, exceeding the u16 size table")]
    BlockTooLarge {
        /// Block index.
        block: usize,
        /// Encoded payload size.
        size: usize,
    },

    /// The offload device writes a different format than the stream header.
    #[error("offload device writes format {device}, stream requested {requested}")]
    FormatMismatch {
        /// Version in `CompressOptions`.
        requested: FormatVersion,
        /// Version the device encodes.
        device: FormatVersion,
    },

    /// The offload device rejected a request or broke the protocol.
    #[error("offload device: {0}")]
    Offload(#[from] OffloadError),
}

impl EncodeError {
    /// Map a failed `try_reserve` to [`EncodeError::AllocationFailure`].
    pub(crate) fn alloc(what: &'static str, bytes: usize) -> impl FnOnce(TryReserveError) -> Self {
        move |_| Self::AllocationFailure { what, bytes }
    }
}

// ---------------------------------------------------------------------------
// Offload errors
// ---------------------------------------------------------------------------

/// Errors reported by an offload device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OffloadError {
    /// An operation was issued out of protocol order.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
    /// The device is unavailable (e.g. a poisoned lock).
    #[error("device unavailable: {0}")]
    Unavailable(String),
    /// The device refused the block.
    #[error("device rejected block: {0}")]
    Rejected(String),
}

// ---------------------------------------------------------------------------
// Decode errors
// ---------------------------------------------------------------------------

/// Errors raised while decompressing a stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The stream ended before a section was complete.
    #[error("truncated stream: {section} needs {needed} bytes, {available} available")]
    Truncated {
        /// Section being read.
        section: &'static str,
        /// Bytes required.
        needed: usize,
        /// Bytes left in the stream.
        available: usize,
    },

    /// Version bytes name a format this crate does not read.
    #[error("unsupported format version {major}.{minor}")]
    UnsupportedVersion {
        /// Major version byte.
        major: u8,
        /// Minor version byte.
        minor: u8,
    },

    /// Header fields are inconsistent or out of range.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// A section's content contradicts the header or the size table.
    #[error("corrupt stream: {0}")]
    Corrupt(String),

    /// The output buffer could not be acquired.
    #[error("allocation failure: {0} bytes")]
    AllocationFailure(usize),
}
