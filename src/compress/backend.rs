// Block encoder backends.
//
// Every variable block goes through a `BlockEncoder`. Two are provided:
//   - `SoftwareEncoder` — the in-process delta-XOR coder (`format::block`)
//   - `OffloadEncoder`  — drives an external `OffloadDevice` through its
//                         four-step protocol: configure, set radius,
//                         bulk load, compress
//
// The backend is chosen per call through `CompressOptions::backend`. A
// device that follows the protocol must produce the same payload bytes as
// the software coder, so streams stay decodable by `decompress`.

use std::sync::{Arc, Mutex};

use crate::compress::stats::BlockStats;
use crate::error::{EncodeError, OffloadError};
use crate::format::block;
use crate::format::header::FormatVersion;

// ---------------------------------------------------------------------------
// BlockEncoder trait
// ---------------------------------------------------------------------------

/// Encodes one variable block, appending its payload to `out`.
pub trait BlockEncoder {
    /// Returns the payload length in bytes.
    fn encode_block(
        &mut self,
        block: &[f32],
        error_bound: f32,
        stats: &BlockStats,
        out: &mut Vec<u8>,
    ) -> Result<usize, EncodeError>;
}

// ---------------------------------------------------------------------------
// Software backend
// ---------------------------------------------------------------------------

/// In-process delta-XOR block coder with a reusable leading-count scratch.
#[derive(Debug, Clone)]
pub struct SoftwareEncoder {
    version: FormatVersion,
    leads: Vec<u8>,
}

impl SoftwareEncoder {
    /// Create an encoder whose scratch holds one block of `block_size`.
    pub fn new(version: FormatVersion, block_size: usize) -> Result<Self, EncodeError> {
        let mut leads = Vec::new();
        leads
            .try_reserve_exact(block_size)
            .map_err(EncodeError::alloc("leading count scratch", block_size))?;
        Ok(Self { version, leads })
    }
}

impl BlockEncoder for SoftwareEncoder {
    fn encode_block(
        &mut self,
        samples: &[f32],
        error_bound: f32,
        stats: &BlockStats,
        out: &mut Vec<u8>,
    ) -> Result<usize, EncodeError> {
        block::encode_block(
            samples,
            f64::from(error_bound),
            stats.median,
            stats.radius,
            self.version,
            &mut self.leads,
            out,
        )
    }
}

// ---------------------------------------------------------------------------
// Offload protocol
// ---------------------------------------------------------------------------

/// An external per-block encoder (e.g. a co-processor).
///
/// Per block the caller issues, in order: [`configure`](Self::configure),
/// [`set_radius`](Self::set_radius), [`bulk_load`](Self::bulk_load),
/// [`compress`](Self::compress). The device appends the block payload to
/// the output buffer in the same layout as the software coder.
///
/// # Implementing a device
///
/// ```no_run
/// use oxiszx::compress::backend::OffloadDevice;
/// use oxiszx::error::OffloadError;
/// use oxiszx::format::header::FormatVersion;
///
/// struct Accelerator { /* register handles */ }
///
/// impl OffloadDevice for Accelerator {
///     fn configure(&mut self, _error_bound: f32, _median: f32) -> Result<(), OffloadError> {
///         Ok(())
///     }
///     fn set_radius(&mut self, _radius: f32) -> Result<(), OffloadError> {
///         Ok(())
///     }
///     fn bulk_load(&mut self, _block: &[f32]) -> Result<(), OffloadError> {
///         Ok(())
///     }
///     fn compress(&mut self, _out: &mut Vec<u8>) -> Result<usize, OffloadError> {
///         Err(OffloadError::Rejected("not wired up".into()))
///     }
///     fn format_version(&self) -> FormatVersion {
///         FormatVersion::Portable
///     }
/// }
/// ```
pub trait OffloadDevice: Send {
    /// Load the error bound and block median.
    fn configure(&mut self, error_bound: f32, median: f32) -> Result<(), OffloadError>;

    /// Load the block radius.
    fn set_radius(&mut self, radius: f32) -> Result<(), OffloadError>;

    /// Transfer the block samples to the device.
    fn bulk_load(&mut self, block: &[f32]) -> Result<(), OffloadError>;

    /// Encode the loaded block, appending the payload to `out`. Returns the
    /// payload length.
    fn compress(&mut self, out: &mut Vec<u8>) -> Result<usize, OffloadError>;

    /// Format variant of the payloads the device writes. Must match the
    /// stream's `CompressOptions::version`.
    fn format_version(&self) -> FormatVersion;

    /// Short device name for logs.
    fn name(&self) -> &str {
        "offload"
    }
}

/// Runs the offload protocol for each block against a shared device.
pub struct OffloadEncoder<'d> {
    device: &'d Mutex<dyn OffloadDevice>,
}

impl<'d> OffloadEncoder<'d> {
    pub fn new(device: &'d Mutex<dyn OffloadDevice>) -> Self {
        Self { device }
    }
}

impl BlockEncoder for OffloadEncoder<'_> {
    fn encode_block(
        &mut self,
        samples: &[f32],
        error_bound: f32,
        stats: &BlockStats,
        out: &mut Vec<u8>,
    ) -> Result<usize, EncodeError> {
        let mut device = self
            .device
            .lock()
            .map_err(|e| OffloadError::Unavailable(format!("device lock poisoned: {e}")))?;
        device.configure(error_bound, stats.median)?;
        device.set_radius(stats.radius)?;
        device.bulk_load(samples)?;
        let size = device.compress(out)?;
        log::trace!("{}: block of {} samples -> {size} bytes", device.name(), samples.len());
        Ok(size)
    }
}

// ---------------------------------------------------------------------------
// Emulated device
// ---------------------------------------------------------------------------

/// An `OffloadDevice` that runs the software coder behind the protocol.
///
/// Useful for exercising the offload path without hardware, and as the
/// reference a real device's output must match. Protocol misuse (compress
/// before configure or load) is reported as [`OffloadError::Protocol`].
#[derive(Debug, Clone)]
pub struct EmulatedDevice {
    version: FormatVersion,
    config: Option<(f32, f32)>,
    radius: Option<f32>,
    scratchpad: Vec<f32>,
    loaded: bool,
    leads: Vec<u8>,
    blocks_compressed: u64,
}

impl EmulatedDevice {
    pub fn new(version: FormatVersion) -> Self {
        Self {
            version,
            config: None,
            radius: None,
            scratchpad: Vec::new(),
            loaded: false,
            leads: Vec::new(),
            blocks_compressed: 0,
        }
    }

    /// Number of blocks compressed since creation.
    pub fn blocks_compressed(&self) -> u64 {
        self.blocks_compressed
    }
}

impl Default for EmulatedDevice {
    fn default() -> Self {
        Self::new(FormatVersion::default())
    }
}

impl OffloadDevice for EmulatedDevice {
    fn configure(&mut self, error_bound: f32, median: f32) -> Result<(), OffloadError> {
        self.config = Some((error_bound, median));
        Ok(())
    }

    fn set_radius(&mut self, radius: f32) -> Result<(), OffloadError> {
        if self.config.is_none() {
            return Err(OffloadError::Protocol("set_radius before configure"));
        }
        self.radius = Some(radius);
        Ok(())
    }

    fn bulk_load(&mut self, block: &[f32]) -> Result<(), OffloadError> {
        self.scratchpad.clear();
        self.scratchpad.extend_from_slice(block);
        self.loaded = true;
        Ok(())
    }

    fn compress(&mut self, out: &mut Vec<u8>) -> Result<usize, OffloadError> {
        let (error_bound, median) = self
            .config
            .ok_or(OffloadError::Protocol("compress before configure"))?;
        let radius = self
            .radius
            .ok_or(OffloadError::Protocol("compress before set_radius"))?;
        if !self.loaded {
            return Err(OffloadError::Protocol("compress before bulk_load"));
        }

        let size = block::encode_block(
            &self.scratchpad,
            f64::from(error_bound),
            median,
            radius,
            self.version,
            &mut self.leads,
            out,
        )
        .map_err(|e| OffloadError::Rejected(e.to_string()))?;

        // A block is consumed by compress; the next one needs a fresh setup.
        self.config = None;
        self.radius = None;
        self.loaded = false;
        self.blocks_compressed += 1;
        Ok(size)
    }

    fn format_version(&self) -> FormatVersion {
        self.version
    }

    fn name(&self) -> &str {
        "emulated"
    }
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

/// Which block encoder a compression call uses.
#[derive(Clone, Default)]
pub enum Backend {
    /// In-process software coder.
    #[default]
    Software,
    /// A shared external device.
    Offload(Arc<Mutex<dyn OffloadDevice>>),
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Software => write!(f, "Software"),
            Self::Offload(_) => write!(f, "Offload"),
        }
    }
}

impl Backend {
    /// Wrap a device for use in `CompressOptions`.
    pub fn offload<D: OffloadDevice + 'static>(device: D) -> Self {
        Self::Offload(Arc::new(Mutex::new(device)))
    }

    pub fn is_offload(&self) -> bool {
        matches!(self, Self::Offload(_))
    }

    /// Build the block encoder for one compression call.
    ///
    /// An offload device must write payloads in `version`, otherwise the
    /// call fails with [`EncodeError::FormatMismatch`].
    pub fn encoder(
        &self,
        version: FormatVersion,
        block_size: usize,
    ) -> Result<Box<dyn BlockEncoder + '_>, EncodeError> {
        match self {
            Self::Software => Ok(Box::new(SoftwareEncoder::new(version, block_size)?)),
            Self::Offload(device) => {
                let device_version = device
                    .lock()
                    .map_err(|e| OffloadError::Unavailable(format!("device lock poisoned: {e}")))?
                    .format_version();
                if device_version != version {
                    return Err(EncodeError::FormatMismatch {
                        requested: version,
                        device: device_version,
                    });
                }
                Ok(Box::new(OffloadEncoder::new(device)))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
