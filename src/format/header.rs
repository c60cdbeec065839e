// Stream header, format versions, and section layout.
//
// Section order (all versions):
//   1. version major, version minor, flag bytes (4 bytes)
//   2. block size                     (u64, big-endian)
//   3. constant block count           (u64, big-endian)
//   4. block size table               (u16 per variable block)
//   5. state bitmap                   (1 bit per block, 1 = variable)
//   6. constant block medians         (f32 per constant block)
//   7. variable block payloads
//
// Version 0.1 writes sections 4 and 6 (and the per-block median) in the
// writer's native byte order, so a 0.1 stream only decodes on a host of the
// same endianness. Version 0.2 writes them big-endian.

use std::ops::Range;

use bitflags::bitflags;

use crate::error::DecodeError;
use crate::format::bitpack::packed_len_1b;

/// Fixed header length: version/flags + block size + constant count.
pub const HEADER_LEN: usize = 4 + 8 + 8;

/// Width of one size table entry.
pub const SIZE_ENTRY_LEN: usize = 2;

/// Width of one stored median.
pub const MEDIAN_LEN: usize = 4;

// ---------------------------------------------------------------------------
// Format version
// ---------------------------------------------------------------------------

/// On-disk format variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FormatVersion {
    /// Version 0.1: host-native size table and medians; blocks needing four
    /// bytes per value are rejected at encode time.
    Legacy,
    /// Version 0.2: big-endian size table and medians; full-width blocks
    /// are supported.
    #[default]
    Portable,
}

impl FormatVersion {
    /// `[major, minor]` as written to the stream.
    pub const fn bytes(self) -> [u8; 2] {
        match self {
            Self::Legacy => [0, 1],
            Self::Portable => [0, 2],
        }
    }

    /// Resolve version bytes read from a stream.
    pub fn from_bytes(major: u8, minor: u8) -> Result<Self, DecodeError> {
        match (major, minor) {
            (0, 1) => Ok(Self::Legacy),
            (0, 2) => Ok(Self::Portable),
            _ => Err(DecodeError::UnsupportedVersion { major, minor }),
        }
    }

    /// Whether blocks with `reqBytesLength == 4` can be written.
    pub const fn supports_full_width(self) -> bool {
        matches!(self, Self::Portable)
    }

    #[inline]
    pub fn u16_to_bytes(self, v: u16) -> [u8; 2] {
        match self {
            Self::Legacy => v.to_ne_bytes(),
            Self::Portable => v.to_be_bytes(),
        }
    }

    #[inline]
    pub fn u16_from_bytes(self, b: [u8; 2]) -> u16 {
        match self {
            Self::Legacy => u16::from_ne_bytes(b),
            Self::Portable => u16::from_be_bytes(b),
        }
    }

    #[inline]
    pub fn f32_to_bytes(self, v: f32) -> [u8; 4] {
        match self {
            Self::Legacy => v.to_ne_bytes(),
            Self::Portable => v.to_be_bytes(),
        }
    }

    #[inline]
    pub fn f32_from_bytes(self, b: [u8; 4]) -> f32 {
        match self {
            Self::Legacy => f32::from_ne_bytes(b),
            Self::Portable => f32::from_be_bytes(b),
        }
    }
}

impl std::fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [major, minor] = self.bytes();
        write!(f, "{major}.{minor}")
    }
}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

bitflags! {
    /// Header bytes 2..4, read as a big-endian `u16`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StreamFlags: u16 {
        /// A state bitmap follows the size table (byte 2).
        const BLOCK_STATES = 0x0100;
        /// Blocks can be located without decoding their predecessors (byte 3).
        const RANDOM_ACCESS = 0x0001;
    }
}

impl Default for StreamFlags {
    fn default() -> Self {
        Self::BLOCK_STATES | Self::RANDOM_ACCESS
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Parsed fixed-size stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub version: FormatVersion,
    pub flags: StreamFlags,
    pub block_size: u64,
    pub nb_constant_blocks: u64,
}

impl StreamHeader {
    /// Write the header into `out`, which must be `HEADER_LEN` bytes.
    pub fn encode(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), HEADER_LEN);
        out[..2].copy_from_slice(&self.version.bytes());
        out[2..4].copy_from_slice(&self.flags.bits().to_be_bytes());
        out[4..12].copy_from_slice(&self.block_size.to_be_bytes());
        out[12..20].copy_from_slice(&self.nb_constant_blocks.to_be_bytes());
    }

    /// Parse the header from the front of `data`.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let Some(raw) = data.get(..HEADER_LEN) else {
            return Err(DecodeError::Truncated {
                section: "header",
                needed: HEADER_LEN,
                available: data.len(),
            });
        };

        let version = FormatVersion::from_bytes(raw[0], raw[1])?;

        let flag_bits = u16::from_be_bytes([raw[2], raw[3]]);
        let flags = StreamFlags::from_bits(flag_bits).ok_or_else(|| {
            DecodeError::InvalidHeader(format!("unknown flag bits: {flag_bits:#06X}"))
        })?;
        if !flags.contains(StreamFlags::BLOCK_STATES) {
            return Err(DecodeError::InvalidHeader(
                "stream has no block state bitmap".into(),
            ));
        }

        let block_size = u64::from_be_bytes(raw[4..12].try_into().unwrap_or_default());
        if block_size == 0 {
            return Err(DecodeError::InvalidHeader("block size is zero".into()));
        }
        let nb_constant_blocks = u64::from_be_bytes(raw[12..20].try_into().unwrap_or_default());

        Ok(Self {
            version,
            flags,
            block_size,
            nb_constant_blocks,
        })
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Byte ranges of the fixed sections, computed once the block counts are
/// known. Every fixed-section write goes through one of these ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLayout {
    pub header: Range<usize>,
    pub size_table: Range<usize>,
    pub state_bitmap: Range<usize>,
    pub constant_medians: Range<usize>,
    /// Offset of the first variable block payload.
    pub blocks_start: usize,
}

impl StreamLayout {
    /// Layout for `nb_blocks` blocks of which `nb_constant` are constant.
    ///
    /// Returns `None` if `nb_constant > nb_blocks` or an offset overflows
    /// `usize`.
    pub fn new(nb_blocks: usize, nb_constant: usize) -> Option<Self> {
        let nb_variable = nb_blocks.checked_sub(nb_constant)?;

        let header = 0..HEADER_LEN;
        let size_table = header.end..nb_variable
            .checked_mul(SIZE_ENTRY_LEN)?
            .checked_add(header.end)?;
        let state_bitmap =
            size_table.end..size_table.end.checked_add(packed_len_1b(nb_blocks))?;
        let constant_medians = state_bitmap.end..nb_constant
            .checked_mul(MEDIAN_LEN)?
            .checked_add(state_bitmap.end)?;
        let blocks_start = constant_medians.end;

        Some(Self {
            header,
            size_table,
            state_bitmap,
            constant_medians,
            blocks_start,
        })
    }

    /// Total bytes before the first payload.
    #[inline]
    pub fn fixed_len(&self) -> usize {
        self.blocks_start
    }

    /// Range of the `i`-th size table entry.
    #[inline]
    pub fn size_entry(&self, i: usize) -> Range<usize> {
        let start = self.size_table.start + i * SIZE_ENTRY_LEN;
        start..start + SIZE_ENTRY_LEN
    }

    /// Range of the `i`-th constant median.
    #[inline]
    pub fn constant_median(&self, i: usize) -> Range<usize> {
        let start = self.constant_medians.start + i * MEDIAN_LEN;
        start..start + MEDIAN_LEN
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn header(version: FormatVersion) -> StreamHeader {
        StreamHeader {
            version,
            flags: StreamFlags::default(),
            block_size: 64,
            nb_constant_blocks: 3,
        }
    }

    #[test]
    fn header_bytes() {
        let mut out = [0u8; HEADER_LEN];
        header(FormatVersion::Legacy).encode(&mut out);
        assert_eq!(&out[..4], &[0, 1, 1, 1]);
        assert_eq!(&out[4..12], &[0, 0, 0, 0, 0, 0, 0, 64]);
        assert_eq!(&out[12..20], &[0, 0, 0, 0, 0, 0, 0, 3]);

        header(FormatVersion::Portable).encode(&mut out);
        assert_eq!(&out[..4], &[0, 2, 1, 1]);
    }

    #[test]
    fn header_decode_roundtrip() {
        let h = header(FormatVersion::Portable);
        let mut out = [0u8; HEADER_LEN];
        h.encode(&mut out);
        assert_eq!(StreamHeader::decode(&out).unwrap(), h);
    }

    #[test]
    fn header_rejects_bad_input() {
        let mut out = [0u8; HEADER_LEN];
        header(FormatVersion::Legacy).encode(&mut out);

        assert!(matches!(
            StreamHeader::decode(&out[..10]),
            Err(DecodeError::Truncated { section: "header", .. })
        ));

        let mut bad_version = out;
        bad_version[1] = 9;
        assert_eq!(
            StreamHeader::decode(&bad_version),
            Err(DecodeError::UnsupportedVersion { major: 0, minor: 9 })
        );

        let mut bad_flags = out;
        bad_flags[3] = 0x80;
        assert!(matches!(
            StreamHeader::decode(&bad_flags),
            Err(DecodeError::InvalidHeader(_))
        ));

        let mut no_states = out;
        no_states[2] = 0;
        assert!(matches!(
            StreamHeader::decode(&no_states),
            Err(DecodeError::InvalidHeader(_))
        ));

        let mut zero_block = out;
        zero_block[4..12].fill(0);
        assert!(matches!(
            StreamHeader::decode(&zero_block),
            Err(DecodeError::InvalidHeader(_))
        ));
    }

    #[test]
    fn portable_fields_are_big_endian() {
        let v = FormatVersion::Portable;
        assert_eq!(v.u16_to_bytes(0x0102), [1, 2]);
        assert_eq!(v.f32_to_bytes(1.0), [0x3F, 0x80, 0, 0]);
        assert_eq!(v.f32_from_bytes([0x3F, 0x80, 0, 0]), 1.0);
    }

    #[test]
    fn legacy_fields_follow_host_order() {
        let v = FormatVersion::Legacy;
        assert_eq!(v.u16_to_bytes(0x0102), 0x0102u16.to_ne_bytes());
        assert_eq!(v.u16_from_bytes(0x0102u16.to_ne_bytes()), 0x0102);
        assert_eq!(v.f32_to_bytes(2.5), 2.5f32.to_ne_bytes());
    }

    #[test]
    fn layout_offsets() {
        // 10 blocks, 4 constant: 6 table entries, 2 bitmap bytes, 4 medians.
        let l = StreamLayout::new(10, 4).unwrap();
        assert_eq!(l.header, 0..20);
        assert_eq!(l.size_table, 20..32);
        assert_eq!(l.state_bitmap, 32..34);
        assert_eq!(l.constant_medians, 34..50);
        assert_eq!(l.blocks_start, 50);
        assert_eq!(l.size_entry(1), 22..24);
        assert_eq!(l.constant_median(3), 46..50);
    }

    #[test]
    fn empty_layout_is_header_only() {
        let l = StreamLayout::new(0, 0).unwrap();
        assert_eq!(l.fixed_len(), HEADER_LEN);
    }

    #[test]
    fn layout_rejects_overflow() {
        assert!(StreamLayout::new(usize::MAX, 0).is_none());
        assert!(StreamLayout::new(usize::MAX, usize::MAX).is_none());
        assert!(StreamLayout::new(3, 4).is_none());
    }
}
