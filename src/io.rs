// File-level I/O helpers.
//
// Flat binary files: a float file is a packed sequence of host-endian f32
// values with no header; a byte file is opaque. `compress_file()` and
// `decompress_file()` wrap the in-memory pipeline with buffered file I/O
// and return size statistics. With the `file-io` feature they also carry
// SHA-256 digests of the data on both sides.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[cfg(feature = "file-io")]
use sha2::Digest;
use thiserror::Error;

use crate::compress::decoder::decompress;
use crate::compress::encoder::{CompressOptions, compress};
use crate::error::{DecodeError, EncodeError};

const FLOAT_LEN: usize = std::mem::size_of::<f32>();

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for file operations.
#[derive(Debug, Error)]
pub enum IoError {
    /// File open, read or write failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A float file whose length is not a whole number of samples.
    #[error("float file length {len} is not a multiple of 4")]
    Misaligned { len: u64 },
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

// ---------------------------------------------------------------------------
// Flat files
// ---------------------------------------------------------------------------

/// Read a flat file of host-endian `f32` samples.
pub fn read_floats(path: &Path) -> Result<Vec<f32>, IoError> {
    let bytes = std::fs::read(path)?;
    floats_from_bytes(&bytes)
}

/// Reinterpret host-endian bytes as samples.
pub fn floats_from_bytes(bytes: &[u8]) -> Result<Vec<f32>, IoError> {
    if bytes.len() % FLOAT_LEN != 0 {
        return Err(IoError::Misaligned {
            len: bytes.len() as u64,
        });
    }
    Ok(bytes
        .chunks_exact(FLOAT_LEN)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Write `samples` as a flat file of host-endian `f32`.
pub fn write_floats(path: &Path, samples: &[f32]) -> Result<(), IoError> {
    let mut w = BufWriter::with_capacity(BUF_SIZE, File::create(path)?);
    for v in samples {
        w.write_all(&v.to_ne_bytes())?;
    }
    w.flush()?;
    Ok(())
}

pub fn read_bytes(path: &Path) -> Result<Vec<u8>, IoError> {
    Ok(std::fs::read(path)?)
}

pub fn write_bytes(path: &Path, data: &[u8]) -> Result<(), IoError> {
    let mut w = BufWriter::with_capacity(BUF_SIZE, File::create(path)?);
    w.write_all(data)?;
    w.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `compress_file()`.
#[derive(Debug, Clone)]
pub struct CompressStats {
    /// Number of samples read.
    pub count: usize,
    /// Float file size in bytes.
    pub input_size: u64,
    /// Compressed stream size in bytes.
    pub output_size: u64,
    pub nb_blocks: usize,
    pub nb_constant_blocks: usize,
    /// SHA-256 of the float file (if `file-io` feature is enabled).
    pub input_sha256: Option<[u8; 32]>,
    /// SHA-256 of the compressed stream (if `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

impl CompressStats {
    /// Input size over output size.
    pub fn ratio(&self) -> f64 {
        ratio(self.input_size, self.output_size)
    }
}

/// Statistics returned by `decompress_file()`.
#[derive(Debug, Clone)]
pub struct DecompressStats {
    /// Number of samples written.
    pub count: usize,
    /// Compressed stream size in bytes.
    pub input_size: u64,
    /// Reconstructed float file size in bytes.
    pub output_size: u64,
    /// SHA-256 of the reconstructed float file (if `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

fn ratio(raw: u64, compressed: u64) -> f64 {
    if compressed == 0 {
        0.0
    } else {
        raw as f64 / compressed as f64
    }
}

#[cfg(feature = "file-io")]
fn sha256(data: &[u8]) -> Option<[u8; 32]> {
    Some(sha2::Sha256::digest(data).into())
}

#[cfg(not(feature = "file-io"))]
fn sha256(_data: &[u8]) -> Option<[u8; 32]> {
    None
}

/// SHA-256 of samples as they are laid out in a float file.
#[cfg(feature = "file-io")]
fn sha256_floats(samples: &[f32]) -> Option<[u8; 32]> {
    let mut h = sha2::Sha256::new();
    for v in samples {
        h.update(v.to_ne_bytes());
    }
    Some(h.finalize().into())
}

#[cfg(not(feature = "file-io"))]
fn sha256_floats(_samples: &[f32]) -> Option<[u8; 32]> {
    None
}

// ---------------------------------------------------------------------------
// compress_file / decompress_file
// ---------------------------------------------------------------------------

/// Compress the float file at `input_path` into `output_path`.
pub fn compress_file(
    input_path: &Path,
    output_path: &Path,
    opts: &CompressOptions,
) -> Result<CompressStats, IoError> {
    let raw = std::fs::read(input_path)?;
    let samples = floats_from_bytes(&raw)?;
    let input_sha256 = sha256(&raw);
    drop(raw);

    let stream = compress(&samples, opts)?;
    write_bytes(output_path, stream.as_bytes())?;

    Ok(CompressStats {
        count: samples.len(),
        input_size: (samples.len() * FLOAT_LEN) as u64,
        output_size: stream.len() as u64,
        nb_blocks: stream.nb_blocks(),
        nb_constant_blocks: stream.nb_constant_blocks(),
        input_sha256,
        output_sha256: sha256(stream.as_bytes()),
    })
}

/// Decompress the `count`-sample stream at `input_path` into a float file.
pub fn decompress_file(
    input_path: &Path,
    output_path: &Path,
    count: usize,
) -> Result<DecompressStats, IoError> {
    let data = std::fs::read(input_path)?;
    let samples = decompress(&data, count)?;
    write_floats(output_path, &samples)?;

    Ok(DecompressStats {
        count: samples.len(),
        input_size: data.len() as u64,
        output_size: (samples.len() * FLOAT_LEN) as u64,
        output_sha256: sha256_floats(&samples),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
