//! Byte-addressable persistent storage backends.
//!
//! The codec only ever talks to a [`ByteDevice`]. Four backends are provided:
//!
//! - [`MemoryDevice`] — instrumented in-memory test double
//! - [`FileDevice`] — host-side emulation backed by an image file
//! - [`FlashDevice`] — RAM buffer flushed to a NOR flash region on commit
//! - [`AvrDevice`] — native access through the AVR EEPROM registers
//!
//! Every backend upholds the write-elision contract: writing the value a
//! cell already holds must not consume a write-erase cycle.

pub mod avr;
pub mod file;
pub mod flash;
pub mod memory;

pub use avr::{AvrDevice, EepromController, EepromRegisters};
pub use file::{eeprom_path, FileDevice};
pub use flash::{FlashDevice, FlashMedium, SimFlash, SimFlashError};
pub use memory::{MemoryDevice, WearStats};

use crate::config::{BoundsPolicy, DeviceConfig};
use crate::error::{DeviceError, DeviceResult};

/// Raw persistent byte storage.
///
/// Addresses run from 0 to `capacity() - 1`. Accesses outside that range are
/// resolved by the backend's [`BoundsPolicy`]; callers above this trait do not
/// re-check bounds.
///
/// `begin` must be called once before any access. Writes are only durable
/// after `commit` returns `Ok`.
pub trait ByteDevice {
    /// Number of addressable bytes.
    fn capacity(&self) -> usize;

    /// One-time initialization. A second call is logged and ignored.
    fn begin(&mut self) -> DeviceResult<()>;

    /// Durability barrier for all writes since the previous commit.
    fn commit(&mut self) -> DeviceResult<()>;

    /// Read one byte. Takes `&mut self` because register-level backends
    /// have to drive hardware to read.
    fn read_byte(&mut self, address: usize) -> u8;

    /// Write one byte, skipping the physical write when the cell already
    /// holds `value`.
    fn write_byte(&mut self, address: usize, value: u8);
}

impl<D: ByteDevice + ?Sized> ByteDevice for &mut D {
    fn capacity(&self) -> usize { (**self).capacity() }
    fn begin(&mut self) -> DeviceResult<()> { (**self).begin() }
    fn commit(&mut self) -> DeviceResult<()> { (**self).commit() }
    fn read_byte(&mut self, address: usize) -> u8 { (**self).read_byte(address) }
    fn write_byte(&mut self, address: usize, value: u8) { (**self).write_byte(address, value) }
}

impl<D: ByteDevice + ?Sized> ByteDevice for Box<D> {
    fn capacity(&self) -> usize { (**self).capacity() }
    fn begin(&mut self) -> DeviceResult<()> { (**self).begin() }
    fn commit(&mut self) -> DeviceResult<()> { (**self).commit() }
    fn read_byte(&mut self, address: usize) -> u8 { (**self).read_byte(address) }
    fn write_byte(&mut self, address: usize, value: u8) { (**self).write_byte(address, value) }
}

/// Bounds resolution shared by the backends.
#[derive(Debug, Clone)]
pub(crate) struct Bounds {
    capacity: usize,
    policy: BoundsPolicy,
    /// First out-of-bounds address seen under `BoundsPolicy::Fault`
    fault: Option<usize>,
}

impl Bounds {
    pub(crate) fn new(config: &DeviceConfig) -> Self {
        Bounds { capacity: config.capacity, policy: config.bounds, fault: None }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Map `address` to a cell index, or `None` if the access must be dropped.
    pub(crate) fn resolve(&mut self, address: usize, op: &str) -> Option<usize> {
        if address < self.capacity {
            return Some(address);
        }
        if self.capacity == 0 {
            return None;
        }
        match self.policy {
            BoundsPolicy::Wrap => {
                let wrapped = address % self.capacity;
                log::warn!("{} at 0x{:04X} wrapped to 0x{:04X}", op, address, wrapped);
                Some(wrapped)
            }
            BoundsPolicy::Discard => {
                log::warn!("{} at 0x{:04X} discarded (capacity {})", op, address, self.capacity);
                None
            }
            BoundsPolicy::Fault => {
                log::warn!("{} at 0x{:04X} out of bounds (capacity {})", op, address, self.capacity);
                self.fault.get_or_insert(address);
                None
            }
        }
    }

    /// Report and clear a latched fault.
    pub(crate) fn take_fault(&mut self) -> DeviceResult<()> {
        match self.fault.take() {
            Some(address) => Err(DeviceError::OutOfBounds { address, capacity: self.capacity }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(policy: BoundsPolicy) -> Bounds {
        Bounds::new(&DeviceConfig::with_capacity(1024).bounds(policy))
    }

    #[test]
    fn test_in_range_passes_through() {
        let mut b = bounds(BoundsPolicy::Fault);
        assert_eq!(b.resolve(0, "read"), Some(0));
        assert_eq!(b.resolve(1023, "write"), Some(1023));
        assert!(b.take_fault().is_ok());
    }

    #[test]
    fn test_wrap() {
        let mut b = bounds(BoundsPolicy::Wrap);
        assert_eq!(b.resolve(1024, "read"), Some(0));
        assert_eq!(b.resolve(1030, "write"), Some(6));
        assert!(b.take_fault().is_ok());
    }

    #[test]
    fn test_discard() {
        let mut b = bounds(BoundsPolicy::Discard);
        assert_eq!(b.resolve(2000, "write"), None);
        assert!(b.take_fault().is_ok());
    }

    #[test]
    fn test_fault_latches_first_address() {
        let mut b = bounds(BoundsPolicy::Fault);
        assert_eq!(b.resolve(1500, "write"), None);
        assert_eq!(b.resolve(1600, "write"), None);
        match b.take_fault() {
            Err(DeviceError::OutOfBounds { address, capacity }) => {
                assert_eq!(address, 1500);
                assert_eq!(capacity, 1024);
            }
            other => panic!("unexpected {:?}", other),
        }
        // Cleared after reporting
        assert!(b.take_fault().is_ok());
    }

    #[test]
    fn test_zero_capacity_drops_everything() {
        let mut b = Bounds::new(&DeviceConfig::with_capacity(0));
        assert_eq!(b.resolve(0, "read"), None);
    }
}
