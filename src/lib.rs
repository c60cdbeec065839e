//! Oxiszx: error-bounded lossy compression of `f32` sequences in Rust.
//!
//! Samples are split into fixed-size blocks. A block whose value range fits
//! inside the error bound is stored as a single median; every other block
//! keeps only the leading bits each value needs and drops the bytes it
//! shares with its predecessor.
//!
//! The crate provides:
//! - The on-disk format primitives (`format`)
//! - High-level compression APIs (`compress`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use oxiszx::compress::{CompressOptions, compress, decompress};
//!
//! let samples: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.01).sin()).collect();
//!
//! let opts = CompressOptions::new(1e-3, 64);
//! let stream = compress(&samples, &opts).unwrap();
//! let restored = decompress(stream.as_bytes(), samples.len()).unwrap();
//!
//! for (a, b) in samples.iter().zip(&restored) {
//!     assert!((a - b).abs() <= 1e-3);
//! }
//! ```

pub mod compress;
pub mod error;
pub mod format;
pub mod io;

#[cfg(feature = "cli")]
pub mod cli;
