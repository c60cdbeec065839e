// Fixed-width bit packing for per-block flags and leading-byte counts.
//
// 1-bit: 8 flags per byte, first flag in bit 7.
// 2-bit: 4 values per byte, first value in bits 7..6.
// Unused low bits of a trailing partial byte are zero. Neither encoding
// records its element count; callers pass it back when unpacking.

use crate::error::DecodeError;

/// Bytes needed to hold `len` 1-bit flags.
#[inline]
pub const fn packed_len_1b(len: usize) -> usize {
    len.div_ceil(8)
}

/// Bytes needed to hold `len` 2-bit values.
#[inline]
pub const fn packed_len_2b(len: usize) -> usize {
    len.div_ceil(4)
}

// ---------------------------------------------------------------------------
// 1-bit
// ---------------------------------------------------------------------------

/// Pack `flags` (each 0 or 1) into `out`, MSB first.
///
/// `out` must be exactly `packed_len_1b(flags.len())` bytes long. Returns
/// the number of bytes written.
pub fn pack_1b_into(flags: &[u8], out: &mut [u8]) -> usize {
    debug_assert_eq!(out.len(), packed_len_1b(flags.len()));
    for (byte, chunk) in out.iter_mut().zip(flags.chunks(8)) {
        let mut acc = 0u8;
        for (j, &flag) in chunk.iter().enumerate() {
            acc |= (flag & 1) << (7 - j);
        }
        *byte = acc;
    }
    out.len()
}

/// Pack `flags` into a freshly allocated buffer.
pub fn pack_1b(flags: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; packed_len_1b(flags.len())];
    pack_1b_into(flags, &mut out);
    out
}

/// Unpack `len` 1-bit flags from the front of `packed`.
pub fn unpack_1b(packed: &[u8], len: usize) -> Result<Vec<u8>, DecodeError> {
    let needed = packed_len_1b(len);
    if packed.len() < needed {
        return Err(DecodeError::Truncated {
            section: "1-bit array",
            needed,
            available: packed.len(),
        });
    }
    Ok((0..len)
        .map(|i| (packed[i / 8] >> (7 - (i % 8))) & 1)
        .collect())
}

// ---------------------------------------------------------------------------
// 2-bit
// ---------------------------------------------------------------------------

/// Pack `values` (each in `0..=3`) into `out`, four per byte from bit 6 down.
///
/// `out` must be exactly `packed_len_2b(values.len())` bytes long. Returns
/// the number of bytes written.
pub fn pack_2b_into(values: &[u8], out: &mut [u8]) -> usize {
    debug_assert_eq!(out.len(), packed_len_2b(values.len()));
    for (byte, chunk) in out.iter_mut().zip(values.chunks(4)) {
        *byte = chunk
            .iter()
            .enumerate()
            .fold(0u8, |acc, (j, &v)| acc | ((v & 0b11) << (6 - 2 * j)));
    }
    out.len()
}

/// Pack `values` into a freshly allocated buffer.
pub fn pack_2b(values: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; packed_len_2b(values.len())];
    pack_2b_into(values, &mut out);
    out
}

/// Unpack `len` 2-bit values from the front of `packed` into `out`.
///
/// `out` is cleared first so a caller can reuse one scratch buffer.
pub fn unpack_2b_into(packed: &[u8], len: usize, out: &mut Vec<u8>) -> Result<(), DecodeError> {
    let needed = packed_len_2b(len);
    if packed.len() < needed {
        return Err(DecodeError::Truncated {
            section: "2-bit array",
            needed,
            available: packed.len(),
        });
    }
    out.clear();
    out.extend((0..len).map(|i| (packed[i / 4] >> (6 - 2 * (i % 4))) & 0b11));
    Ok(())
}

/// Unpack `len` 2-bit values into a freshly allocated buffer.
pub fn unpack_2b(packed: &[u8], len: usize) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(len);
    unpack_2b_into(packed, len, &mut out)?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_lengths() {
        assert_eq!(packed_len_1b(0), 0);
        assert_eq!(packed_len_1b(1), 1);
        assert_eq!(packed_len_1b(8), 1);
        assert_eq!(packed_len_1b(9), 2);
        assert_eq!(packed_len_2b(0), 0);
        assert_eq!(packed_len_2b(4), 1);
        assert_eq!(packed_len_2b(5), 2);
    }

    #[test]
    fn one_bit_is_msb_first() {
        assert_eq!(pack_1b(&[1]), vec![0b1000_0000]);
        assert_eq!(pack_1b(&[0, 1, 0, 1, 1, 0, 0, 1]), vec![0b0101_1001]);
        // Trailing partial byte keeps its unused low bits clear.
        assert_eq!(pack_1b(&[1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 1]), vec![0xFF, 0b1010_0000]);
    }

    #[test]
    fn two_bit_layout() {
        assert_eq!(pack_2b(&[3, 2, 1, 0]), vec![0b1110_0100]);
        assert_eq!(pack_2b(&[1, 2, 3, 3, 2]), vec![0b0110_1111, 0b1000_0000]);
    }

    #[test]
    fn empty_inputs() {
        assert!(pack_1b(&[]).is_empty());
        assert!(pack_2b(&[]).is_empty());
        assert!(unpack_1b(&[], 0).unwrap().is_empty());
        assert!(unpack_2b(&[], 0).unwrap().is_empty());
    }

    #[test]
    fn unpack_ignores_trailing_bytes() {
        let packed = [0b1100_0000, 0xAB];
        assert_eq!(unpack_1b(&packed, 2).unwrap(), vec![1, 1]);
        assert_eq!(unpack_2b(&packed, 1).unwrap(), vec![3]);
    }

    #[test]
    fn unpack_rejects_short_input() {
        assert!(matches!(
            unpack_1b(&[0xFF], 9),
            Err(DecodeError::Truncated { needed: 2, available: 1, .. })
        ));
        assert!(matches!(
            unpack_2b(&[0xFF], 5),
            Err(DecodeError::Truncated { needed: 2, available: 1, .. })
        ));
    }

    #[test]
    fn two_bit_roundtrip_all_remainders() {
        for len in 0..13 {
            let values: Vec<u8> = (0..len).map(|i| (i * 7 % 4) as u8).collect();
            let packed = pack_2b(&values);
            assert_eq!(packed.len(), packed_len_2b(len));
            assert_eq!(unpack_2b(&packed, len).unwrap(), values);
        }
    }

    #[test]
    fn pack_2b_into_overwrites_region() {
        let mut out = [0xEE, 0xEE, 0xEE];
        let n = pack_2b_into(&[3, 3, 0, 0, 1], &mut out[1..]);
        assert_eq!(n, 2);
        assert_eq!(out, [0xEE, 0b1111_0000, 0b0100_0000]);
    }
}
