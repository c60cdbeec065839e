// Binary format of an oxiszx stream.
//
// This module holds the encode/decode primitives that define the bytes on
// disk; the `compress` module drives them over a whole sample sequence.
//
// # Modules
//
// - `bitpack`   — 1-bit state bitmap and 2-bit leading-count packing
// - `precision` — exponent extraction and the per-block truncation plan
// - `block`     — delta-XOR byte coding of one variable block
// - `header`    — stream header, format versions, section layout

pub mod bitpack;
pub mod block;
pub mod header;
pub mod precision;

pub use block::{BLOCK_HEADER_LEN, decode_block, encode_block};
pub use header::{FormatVersion, HEADER_LEN, StreamFlags, StreamHeader, StreamLayout};
pub use precision::PrecisionPlan;
