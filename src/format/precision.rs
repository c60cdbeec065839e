// Precision planning: how many leading bits of each (x - median) must be
// kept so that truncation stays inside the error bound.
//
// The plan compares the exponent of the block radius (largest magnitude a
// centered value can reach) with the exponent of the error bound. Sign and
// exponent fields always survive (9 bits); every binade between the two
// exponents, plus one guard bit, adds a mantissa bit.

/// Bits always kept: sign + 8 exponent bits.
pub const MIN_REQ_LENGTH: i32 = 9;

/// Full width of an `f32`.
pub const MAX_REQ_LENGTH: i32 = 32;

const F32_EXP_MASK: u32 = 0x7F80_0000;
const F32_EXP_SHIFT: u32 = 23;
const F32_EXP_BIAS: i32 = 127;

const F64_EXP_MASK: u64 = 0x7FF0_0000_0000_0000;
const F64_EXP_SHIFT: u32 = 52;
const F64_EXP_BIAS: i32 = 1023;

/// Unbiased exponent field of an `f32` (`-127` for zero/subnormals,
/// `128` for infinities and NaN).
#[inline]
pub fn exponent_f32(value: f32) -> i16 {
    let biased = ((value.to_bits() & F32_EXP_MASK) >> F32_EXP_SHIFT) as i32;
    (biased - F32_EXP_BIAS) as i16
}

/// Unbiased exponent field of an `f64` (`-1023` for zero/subnormals).
#[inline]
pub fn exponent_f64(value: f64) -> i16 {
    let biased = ((value.to_bits() & F64_EXP_MASK) >> F64_EXP_SHIFT) as i32;
    (biased - F64_EXP_BIAS) as i16
}

/// Truncation plan for one variable block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrecisionPlan {
    /// Leading bits of the centered value that are kept, in `9..=32`.
    pub req_length: u8,
    /// Median to center the block on. Zero when the plan saturated.
    pub median: f32,
}

impl PrecisionPlan {
    /// Compute the plan for a block with the given `radius` and `median`.
    ///
    /// When more than 32 bits would be needed, the plan keeps all 32 and
    /// drops the median: values are then stored verbatim, which is exact.
    pub fn new(error_bound: f64, radius: f32, median: f32) -> Self {
        let rad_exp = i32::from(exponent_f32(radius));
        let err_exp = i32::from(exponent_f64(error_bound));
        let req = MIN_REQ_LENGTH + rad_exp - err_exp + 1;

        if req > MAX_REQ_LENGTH {
            Self {
                req_length: MAX_REQ_LENGTH as u8,
                median: 0.0,
            }
        } else {
            Self {
                req_length: req.max(MIN_REQ_LENGTH) as u8,
                median,
            }
        }
    }

    /// Rebuild a plan from a stored `reqLength` byte (decode side).
    pub fn from_stored(req_length: u8, median: f32) -> Option<Self> {
        let len = i32::from(req_length);
        (MIN_REQ_LENGTH..=MAX_REQ_LENGTH)
            .contains(&len)
            .then_some(Self { req_length, median })
    }

    /// Bytes of the shifted value that carry kept bits (`ceil(req_length / 8)`).
    #[inline]
    pub fn req_bytes(&self) -> u8 {
        self.req_length.div_ceil(8)
    }

    /// Low bits discarded before byte selection, so the kept bits end on a
    /// byte boundary.
    #[inline]
    pub fn right_shift(&self) -> u32 {
        match self.req_length % 8 {
            0 => 0,
            rem => u32::from(8 - rem),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
