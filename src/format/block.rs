// Delta-XOR byte coding for one variable block.
//
// Payload layout:
//   [reqLength: u8][median: f32][leading counts: 2 bits each][residual bytes]
//
// Each sample is centered on the median, reinterpreted as u32 and shifted
// right so the kept bits end on a byte boundary (call the result `t`). XOR
// with the previous `t` tells how many of `t`'s top bytes repeat (0..=3);
// only the kept bytes below those are stored, lowest index first, where
// byte 3 is the most significant. With `r` kept bytes and `k` repeating:
//
//   r \ k |  0           |  1        |  2      |  3
//   ------+--------------+-----------+---------+-----
//     2   |  b2 b3       |  b2       |  -      |  -
//     3   |  b1 b2 b3    |  b1 b2    |  b1     |  -
//     4   |  b0 b1 b2 b3 |  b0 b1 b2 |  b0 b1  |  b0

use crate::error::{DecodeError, EncodeError};
use crate::format::bitpack::{pack_2b_into, packed_len_2b, unpack_2b_into};
use crate::format::header::{FormatVersion, MEDIAN_LEN};
use crate::format::precision::PrecisionPlan;

/// `reqLength` byte + median.
pub const BLOCK_HEADER_LEN: usize = 1 + MEDIAN_LEN;

/// Number of top bytes of `xor` that are zero, capped at 3.
#[inline]
pub fn leading_zero_bytes(xor: u32) -> u8 {
    (xor.leading_zeros() / 8).min(3) as u8
}

/// Byte indices of `t` stored for `req_bytes` kept bytes and `lead`
/// repeating top bytes. Empty when every kept byte repeats.
#[inline]
fn stored_range(req_bytes: usize, lead: usize) -> std::ops::Range<usize> {
    let low = 4 - req_bytes;
    let high = 4 - lead;
    low..high.max(low)
}

/// Upper bound on the payload size of a block of `len` samples.
pub fn max_block_len(len: usize, req_bytes: usize) -> usize {
    BLOCK_HEADER_LEN + packed_len_2b(len) + len * req_bytes
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode one variable block, appending the payload to `out`.
///
/// `leads` is scratch space for the per-sample leading byte counts; it is
/// cleared and refilled. Returns the payload length.
pub fn encode_block(
    block: &[f32],
    error_bound: f64,
    median: f32,
    radius: f32,
    version: FormatVersion,
    leads: &mut Vec<u8>,
    out: &mut Vec<u8>,
) -> Result<usize, EncodeError> {
    let plan = PrecisionPlan::new(error_bound, radius, median);
    let req_bytes = usize::from(plan.req_bytes());
    if req_bytes == 4 && !version.supports_full_width() {
        return Err(EncodeError::UnsupportedPrecision {
            req_length: plan.req_length,
            req_bytes: plan.req_bytes(),
        });
    }

    let worst = max_block_len(block.len(), req_bytes);
    out.try_reserve(worst)
        .map_err(EncodeError::alloc("block payload", worst))?;
    leads.clear();
    leads
        .try_reserve(block.len())
        .map_err(EncodeError::alloc("leading count scratch", block.len()))?;

    let start = out.len();
    out.push(plan.req_length);
    out.extend_from_slice(&version.f32_to_bytes(plan.median));

    // Reserve the counts region now, fill it once the counts are known.
    let counts_at = out.len();
    let counts_len = packed_len_2b(block.len());
    out.resize(counts_at + counts_len, 0);

    let shift = plan.right_shift();
    let mut prev = 0u32;
    for &x in block {
        let t = (x - plan.median).to_bits() >> shift;
        let lead = leading_zero_bytes(t ^ prev);
        leads.push(lead);
        out.extend_from_slice(&t.to_le_bytes()[stored_range(req_bytes, usize::from(lead))]);
        prev = t;
    }

    pack_2b_into(leads, &mut out[counts_at..counts_at + counts_len]);

    Ok(out.len() - start)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Read the `reqLength` byte and median of a payload.
pub fn read_block_plan(payload: &[u8], version: FormatVersion) -> Result<PrecisionPlan, DecodeError> {
    let Some(head) = payload.get(..BLOCK_HEADER_LEN) else {
        return Err(DecodeError::Truncated {
            section: "block header",
            needed: BLOCK_HEADER_LEN,
            available: payload.len(),
        });
    };
    let median = version.f32_from_bytes([head[1], head[2], head[3], head[4]]);
    PrecisionPlan::from_stored(head[0], median)
        .ok_or_else(|| DecodeError::Corrupt(format!("reqLength {} outside 9..=32", head[0])))
}

/// Decode one variable block of `len` samples, appending them to `out`.
///
/// `leads` is scratch space for the unpacked leading counts. Returns the
/// number of payload bytes consumed.
pub fn decode_block(
    payload: &[u8],
    len: usize,
    version: FormatVersion,
    leads: &mut Vec<u8>,
    out: &mut Vec<f32>,
) -> Result<usize, DecodeError> {
    let plan = read_block_plan(payload, version)?;
    let req_bytes = usize::from(plan.req_bytes());
    let shift = plan.right_shift();

    let counts = &payload[BLOCK_HEADER_LEN..];
    unpack_2b_into(counts, len, leads)?;
    let residual = &counts[packed_len_2b(len)..];

    let mut cursor = 0usize;
    let mut prev = [0u8; 4];
    for &lead in leads.iter() {
        let mut cur = [0u8; 4];
        let stored = stored_range(req_bytes, usize::from(lead));
        let take = stored.len();
        let Some(src) = residual.get(cursor..cursor + take) else {
            return Err(DecodeError::Truncated {
                section: "residual bytes",
                needed: cursor + take,
                available: residual.len(),
            });
        };
        cur[stored.clone()].copy_from_slice(src);
        cursor += take;
        // Repeating top bytes come from the previous value.
        cur[stored.end..].copy_from_slice(&prev[stored.end..]);

        let t = u32::from_le_bytes(cur);
        out.push(f32::from_bits(t << shift) + plan.median);
        prev = cur;
    }

    Ok(BLOCK_HEADER_LEN + packed_len_2b(len) + cursor)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(block: &[f32], bound: f32, version: FormatVersion) -> Vec<u8> {
        let (min, max) = block
            .iter()
            .fold((block[0], block[0]), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let radius = (max - min) / 2.0;
        let mut leads = Vec::new();
        let mut out = Vec::new();
        let n = encode_block(
            block,
            f64::from(bound),
            min + radius,
            radius,
            version,
            &mut leads,
            &mut out,
        )
        .unwrap();
        assert_eq!(n, out.len());
        out
    }

    fn decode(payload: &[u8], len: usize, version: FormatVersion) -> Vec<f32> {
        let mut leads = Vec::new();
        let mut out = Vec::new();
        let used = decode_block(payload, len, version, &mut leads, &mut out).unwrap();
        assert_eq!(used, payload.len());
        out
    }

    fn assert_within(orig: &[f32], got: &[f32], bound: f32) {
        assert_eq!(orig.len(), got.len());
        for (i, (a, b)) in orig.iter().zip(got).enumerate() {
            assert!((a - b).abs() <= bound, "sample {i}: {a} vs {b} (bound {bound})");
        }
    }

    #[test]
    fn leading_zero_byte_classes() {
        assert_eq!(leading_zero_bytes(0), 3);
        assert_eq!(leading_zero_bytes(0x0000_00FF), 3);
        assert_eq!(leading_zero_bytes(0x0000_0100), 2);
        assert_eq!(leading_zero_bytes(0x0000_FFFF), 2);
        assert_eq!(leading_zero_bytes(0x0001_0000), 1);
        assert_eq!(leading_zero_bytes(0x00FF_FFFF), 1);
        assert_eq!(leading_zero_bytes(0x0100_0000), 0);
        assert_eq!(leading_zero_bytes(0xFFFF_FFFF), 0);
    }

    #[test]
    fn stored_byte_table() {
        assert_eq!(stored_range(2, 0), 2..4);
        assert_eq!(stored_range(2, 1), 2..3);
        assert!(stored_range(2, 2).is_empty());
        assert!(stored_range(2, 3).is_empty());
        assert_eq!(stored_range(3, 0), 1..4);
        assert_eq!(stored_range(3, 1), 1..3);
        assert_eq!(stored_range(3, 2), 1..2);
        assert!(stored_range(3, 3).is_empty());
        assert_eq!(stored_range(4, 0), 0..4);
        assert_eq!(stored_range(4, 3), 0..1);
    }

    #[test]
    fn two_byte_block_layout() {
        // radius 0.5 (exp -1), bound 1.0 (exp 0): reqLength 9, shift 7, 2 bytes.
        let block = [1.0f32, 2.0, 2.0, 1.5];
        let payload = encode(&block, 1.0, FormatVersion::Portable);
        assert_eq!(payload[0], 9);
        assert_eq!(&payload[1..5], &1.5f32.to_be_bytes());

        // Hand-computed t values (bits >> 7) and their XOR classes.
        let t: Vec<u32> = block.iter().map(|x| (x - 1.5f32).to_bits() >> 7).collect();
        let mut prev = 0u32;
        let mut expected_leads = Vec::new();
        let mut expected_residual = Vec::new();
        for &v in &t {
            let lead = leading_zero_bytes(v ^ prev);
            expected_leads.push(lead);
            let b = v.to_le_bytes();
            match lead {
                0 => expected_residual.extend_from_slice(&[b[2], b[3]]),
                1 => expected_residual.push(b[2]),
                _ => {}
            }
            prev = v;
        }
        assert_eq!(payload[5], crate::format::bitpack::pack_2b(&expected_leads)[0]);
        assert_eq!(&payload[6..], &expected_residual[..]);
    }

    #[test]
    fn constant_run_after_first_value_stores_nothing() {
        let mut block = vec![10.0f32; 16];
        block[0] = 12.0;
        let payload = encode(&block, 0.1, FormatVersion::Portable);
        let leads = crate::format::bitpack::unpack_2b(&payload[5..], block.len()).unwrap();
        assert!(leads[2..].iter().all(|&l| l == 3));
        assert_within(&block, &decode(&payload, block.len(), FormatVersion::Portable), 0.1);
    }

    #[test]
    fn roundtrip_three_byte_plan() {
        // radius ~1 (exp 0), bound 2^-10: reqLength 20 -> 3 bytes.
        let block: Vec<f32> = (0..37).map(|i| (i as f32 * 0.37).sin() + 3.0).collect();
        let bound = 2f32.powi(-10);
        let payload = encode(&block, bound, FormatVersion::Legacy);
        assert_eq!(read_block_plan(&payload, FormatVersion::Legacy).unwrap().req_bytes(), 3);
        assert_within(&block, &decode(&payload, block.len(), FormatVersion::Legacy), bound);
    }

    #[test]
    fn roundtrip_full_width_plan() {
        let block = [0.0f32, 100.0, 1.0, 99.0];
        let payload = encode(&block, 0.001, FormatVersion::Portable);
        assert_eq!(payload[0], 25);
        assert_within(&block, &decode(&payload, 4, FormatVersion::Portable), 0.001);
    }

    #[test]
    fn saturated_plan_is_lossless() {
        let block = [1.0e-3f32, 7.5e4, -3.25, 0.0, f32::MIN_POSITIVE];
        let payload = encode(&block, 0.0, FormatVersion::Portable);
        assert_eq!(payload[0], 32);
        assert_eq!(&payload[1..5], &0f32.to_be_bytes());
        assert_eq!(decode(&payload, block.len(), FormatVersion::Portable), block);
    }

    #[test]
    fn legacy_rejects_full_width() {
        let mut leads = Vec::new();
        let mut out = Vec::new();
        let err = encode_block(
            &[0.0, 100.0],
            0.001,
            50.0,
            50.0,
            FormatVersion::Legacy,
            &mut leads,
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EncodeError::UnsupportedPrecision { req_length: 25, req_bytes: 4 }
        ));
    }

    #[test]
    fn decode_rejects_bad_payloads() {
        let block = [1.0f32, 5.0, 3.0, 2.0];
        let payload = encode(&block, 0.01, FormatVersion::Portable);
        let mut leads = Vec::new();
        let mut out = Vec::new();

        assert!(matches!(
            decode_block(&payload[..3], 4, FormatVersion::Portable, &mut leads, &mut out),
            Err(DecodeError::Truncated { section: "block header", .. })
        ));
        assert!(matches!(
            decode_block(&payload[..payload.len() - 1], 4, FormatVersion::Portable, &mut leads, &mut out),
            Err(DecodeError::Truncated { section: "residual bytes", .. })
        ));

        let mut bad = payload.clone();
        bad[0] = 40;
        assert!(matches!(
            decode_block(&bad, 4, FormatVersion::Portable, &mut leads, &mut out),
            Err(DecodeError::Corrupt(_))
        ));
    }
}
