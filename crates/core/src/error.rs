//! Error types for byte devices and packed EEPROM images.

/// Failure to decode or persist a packed EEPROM image.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// The file is shorter than the fixed header.
    #[error("image too small: {0} bytes")]
    TooSmall(usize),

    /// The file does not start with the packed-image magic.
    #[error("invalid EEPROM image (bad magic)")]
    BadMagic,

    /// The header carries a format version this build cannot read.
    #[error("unsupported image version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// The image was written for a device of a different size.
    #[error("capacity mismatch: image={found} device={expected}")]
    CapacityMismatch { found: usize, expected: usize },

    /// The deflate stream is damaged.
    #[error("decompress error: {0}")]
    Decompress(String),

    /// The payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// I/O error while reading or writing the image file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by a byte device's `begin` or `commit`.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// An access outside the device was latched under [`BoundsPolicy::Fault`].
    ///
    /// [`BoundsPolicy::Fault`]: crate::BoundsPolicy::Fault
    #[error("out-of-bounds access at 0x{address:04X} (capacity {capacity})")]
    OutOfBounds { address: usize, capacity: usize },

    /// The backing image could not be loaded or saved.
    #[error("image error: {0}")]
    Image(#[from] ImageError),

    /// The flash medium rejected an operation.
    #[error("flash {operation} failed at 0x{address:06X}: {reason}")]
    Flash {
        operation: &'static str,
        address: u32,
        reason: String,
    },

    /// Read-back after programming did not match the buffer.
    #[error("verify failed at 0x{address:04X}: wrote {expected:02X}, read {found:02X}")]
    Verify { address: usize, expected: u8, found: u8 },

    /// The durability barrier failed for a backend-specific reason.
    #[error("commit failed: {0}")]
    CommitFailed(String),

    /// I/O error from a host-side backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for device lifecycle operations.
pub type DeviceResult<T> = Result<T, DeviceError>;
