// Compression pipeline.
//
// Builds whole streams on top of the format layer:
//
// - `stats`   — per-block min/max/median/radius and constant classification
// - `backend` — block encoder seam: software coder or an offload device
// - `encoder` — stream assembler: compress(), CompressOptions
// - `decoder` — stream decoder: decompress(), inspect()

pub mod backend;
pub mod decoder;
pub mod encoder;
pub mod stats;

pub use backend::{Backend, BlockEncoder, EmulatedDevice, OffloadDevice, SoftwareEncoder};
pub use decoder::{BlockSummary, StreamSummary, decompress, inspect};
#[cfg(feature = "parallel")]
pub use encoder::compress_parallel;
pub use encoder::{CompressOptions, CompressedStream, compress, compress_with};
pub use stats::{BlockClassification, BlockState, BlockStats, classify_blocks};
