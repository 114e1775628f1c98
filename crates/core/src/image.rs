//! EEPROM image files.
//!
//! Two on-disk formats are supported:
//!
//! - **Raw**: the cell contents and nothing else. This is the `.eep`
//!   convention shared with other Arduboy tools.
//! - **Packed**: a small header followed by a deflate-compressed bincode
//!   payload. A mostly blank EEPROM packs down to a few dozen bytes.
//!
//! ## Packed format
//!
//! ```text
//! +------------------+
//! | Magic "ABEE"     |  4 bytes
//! +------------------+
//! | Format version   |  u32 little-endian (currently 1)
//! +------------------+
//! | Capacity         |  u32 little-endian
//! +------------------+
//! | Compressed data  |  deflate-compressed bincode payload
//! +------------------+
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ImageError;

/// Magic bytes identifying a packed EEPROM image.
const MAGIC: &[u8; 4] = b"ABEE";
/// Current packed format version.
const FORMAT_VERSION: u32 = 1;
/// Magic + version + capacity
const HEADER_LEN: usize = 12;

/// On-disk representation of an image file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ImageFormat {
    #[default]
    Raw,
    Packed,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Raw => "raw",
            ImageFormat::Packed => "packed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "raw" | "eep" | "bin" => Some(ImageFormat::Raw),
            "packed" | "abee" => Some(ImageFormat::Packed),
            _ => None,
        }
    }

    /// Identify the format of file contents by their magic.
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.len() >= HEADER_LEN && &bytes[0..4] == MAGIC {
            ImageFormat::Packed
        } else {
            ImageFormat::Raw
        }
    }
}

/// Serialized payload of a packed image.
#[derive(Serialize, Deserialize)]
pub struct EepromImage {
    pub data: Vec<u8>,
}

/// Encode cell contents as a packed image.
pub fn pack(data: &[u8]) -> Result<Vec<u8>, ImageError> {
    let image = EepromImage { data: data.to_vec() };
    let payload = bincode::serialize(&image)?;
    let compressed = miniz_oxide::deflate::compress_to_vec(&payload, 6);

    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Decode a packed image, verifying magic, version, and capacity.
pub fn unpack(bytes: &[u8], expected_capacity: usize) -> Result<Vec<u8>, ImageError> {
    if bytes.len() < HEADER_LEN {
        return Err(ImageError::TooSmall(bytes.len()));
    }
    if &bytes[0..4] != MAGIC {
        return Err(ImageError::BadMagic);
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != FORMAT_VERSION {
        return Err(ImageError::UnsupportedVersion { found: version, expected: FORMAT_VERSION });
    }
    let capacity = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    if capacity != expected_capacity {
        return Err(ImageError::CapacityMismatch { found: capacity, expected: expected_capacity });
    }

    let decompressed = miniz_oxide::inflate::decompress_to_vec(&bytes[HEADER_LEN..])
        .map_err(|e| ImageError::Decompress(format!("{:?}", e)))?;
    let image: EepromImage = bincode::deserialize(&decompressed)?;
    if image.data.len() != capacity {
        return Err(ImageError::CapacityMismatch { found: image.data.len(), expected: capacity });
    }
    Ok(image.data)
}

/// Decode file contents of either format into exactly `capacity` cells.
///
/// Raw contents shorter than the device are padded with `erased_value`;
/// longer contents are truncated.
pub fn decode(bytes: &[u8], capacity: usize, erased_value: u8) -> Result<Vec<u8>, ImageError> {
    match ImageFormat::detect(bytes) {
        ImageFormat::Packed => unpack(bytes, capacity),
        ImageFormat::Raw => {
            let mut cells = vec![erased_value; capacity];
            let len = bytes.len().min(capacity);
            cells[..len].copy_from_slice(&bytes[..len]);
            Ok(cells)
        }
    }
}

/// Encode cell contents in the requested format.
pub fn encode(data: &[u8], format: ImageFormat) -> Result<Vec<u8>, ImageError> {
    match format {
        ImageFormat::Raw => Ok(data.to_vec()),
        ImageFormat::Packed => pack(data),
    }
}

/// Read and decode an image file.
pub fn load_from_file(path: &Path, capacity: usize, erased_value: u8) -> Result<Vec<u8>, ImageError> {
    let bytes = std::fs::read(path)?;
    decode(&bytes, capacity, erased_value)
}

/// Encode and write an image file. The data goes to a sibling temporary
/// file first and is renamed over `path`, so a crash never leaves a
/// half-written image behind.
pub fn save_to_file(path: &Path, data: &[u8], format: ImageFormat) -> Result<(), ImageError> {
    let out = encode(data, format)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);
    std::fs::write(tmp, &out)?;
    std::fs::rename(tmp, path)?;
    Ok(())
}
