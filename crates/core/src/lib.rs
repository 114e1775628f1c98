//! # arduboy-eeprom
//!
//! Save-data storage for the Arduboy's 1 KB EEPROM (addresses 0–1023).
//!
//! Games store fixed-size records at addresses they choose themselves; there
//! is no directory, header, or allocation table. What this crate adds on top
//! of raw byte access is a hash-guarded record format that notices when a
//! record's bytes were changed by something other than its own last write,
//! and a write path that never spends a write-erase cycle on a byte that
//! already holds the right value.
//!
//! ## Architecture
//!
//! - [`Eeprom`] — object, hash-guarded and typed access over any device
//! - [`hash()`] — the rotate-xor record hash and [`HashCode`]
//! - [`ByteDevice`] — backend trait: `begin`, `commit`, `read_byte`, `write_byte`
//! - [`device`] — [`MemoryDevice`], [`FileDevice`], [`FlashDevice`], [`AvrDevice`]
//! - [`DeviceConfig`] — capacity, erased value, and [`BoundsPolicy`]
//! - [`image`] — raw `.eep` and packed (deflate + bincode) image files
//! - [`inspect`] — hex dumps and diffs for debugging save data
//!
//! ## Example
//!
//! ```
//! use arduboy_eeprom::{Eeprom, MemoryDevice};
//! use bytemuck::{Pod, Zeroable};
//!
//! #[repr(C)]
//! #[derive(Clone, Copy, Pod, Zeroable)]
//! struct Progress { level: u16, hp: u16 }
//!
//! let mut eeprom = Eeprom::new(MemoryDevice::new());
//! eeprom.begin().unwrap();
//! eeprom.write_object_with_hash(100, &Progress { level: 5, hp: 20 });
//! eeprom.commit().unwrap();
//!
//! let mut loaded = Progress::zeroed();
//! if !eeprom.read_object_with_hash(100, &mut loaded) {
//!     // Corrupt or never written: start a fresh save
//!     loaded = Progress { level: 1, hp: 20 };
//! }
//! assert_eq!(loaded.level, 5);
//! ```
//!
//! Give every logical record its own hash. One hash over several records
//! means a stray write to any of them throws all of them away.

pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod hash;
pub mod image;
pub mod inspect;

pub use codec::Eeprom;
pub use config::{BoundsPolicy, DeviceConfig};
pub use device::{
    AvrDevice, ByteDevice, EepromController, EepromRegisters, FileDevice, FlashDevice,
    FlashMedium, MemoryDevice, SimFlash, WearStats,
};
pub use error::{DeviceError, DeviceResult, ImageError};
pub use hash::{hash, hash_object, hashed_len, HashCode, HASH_SIZE};
pub use image::ImageFormat;

/// EEPROM size: 1 KB
pub const EEPROM_SIZE: usize = 1024;
