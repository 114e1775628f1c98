//! Object-level and hash-guarded access on top of a [`ByteDevice`].
//!
//! Objects are opaque byte sequences copied in ascending address order.
//! There is no endianness conversion: a record written on one platform is
//! only guaranteed to read back on the same platform.
//!
//! A hash-guarded record is laid out as
//!
//! ```text
//! address                 address + HASH_SIZE
//! |                       |
//! [ hash: HASH_SIZE bytes ][ payload: n bytes ]
//! ```
//!
//! with the hash stored in native byte order. Nothing stops two records from
//! overlapping; a record whose bytes were changed by anything other than its
//! own `write_with_hash` fails `read_with_hash`, unless the change happens
//! to produce a matching hash.
//!
//! # Caller obligations
//!
//! No bounds checks happen at this layer: `address + len` must fit the
//! device, otherwise the device's [`BoundsPolicy`] applies byte by byte.
//! Addresses advance with wrapping arithmetic, so even a record placed at
//! the top of `usize` reaches the policy rather than overflowing.
//! Typed helpers require `bytemuck` traits, which rule out pointers,
//! references and padding, so a stored object never depends on process
//! state that does not survive a power cycle.
//!
//! [`BoundsPolicy`]: crate::BoundsPolicy

use bytemuck::{NoUninit, Pod};

use crate::device::ByteDevice;
use crate::error::DeviceResult;
use crate::hash::{hash, HashCode, HASH_SIZE};

/// Codec over a byte device. Holds the device by value; pass `&mut dev` to
/// keep ownership.
pub struct Eeprom<D> {
    device: D,
}

impl<D: ByteDevice> Eeprom<D> {
    pub fn new(device: D) -> Self {
        Eeprom { device }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_inner(self) -> D {
        self.device
    }

    pub fn capacity(&self) -> usize {
        self.device.capacity()
    }

    /// Initialize the device. Call once before any access.
    pub fn begin(&mut self) -> DeviceResult<()> {
        log::debug!("eeprom: begin ({} bytes)", self.device.capacity());
        self.device.begin()
    }

    /// Make all writes since the last commit durable. On `Err`, any of them
    /// may have been lost; nothing is retried or rolled back.
    pub fn commit(&mut self) -> DeviceResult<()> {
        let result = self.device.commit();
        match &result {
            Ok(()) => log::debug!("eeprom: commit ok"),
            Err(e) => log::debug!("eeprom: commit failed: {}", e),
        }
        result
    }

    pub fn read_byte(&mut self, address: usize) -> u8 {
        self.device.read_byte(address)
    }

    /// Write one byte. Writing the value already stored costs no wear.
    pub fn write_byte(&mut self, address: usize, value: u8) {
        self.device.write_byte(address, value)
    }

    /// Fill `buf` from `buf.len()` bytes starting at `address`.
    pub fn read(&mut self, address: usize, buf: &mut [u8]) {
        log::trace!("eeprom: read {} bytes at 0x{:04X}", buf.len(), address);
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.device.read_byte(address.wrapping_add(i));
        }
    }

    /// Store `data` starting at `address`, one byte write per byte.
    pub fn write(&mut self, address: usize, data: &[u8]) {
        log::trace!("eeprom: write {} bytes at 0x{:04X}", data.len(), address);
        for (i, &b) in data.iter().enumerate() {
            self.device.write_byte(address.wrapping_add(i), b);
        }
    }

    /// Store `data` preceded by its [`hash`].
    ///
    /// The hash goes first. If power fails between the two halves the
    /// record no longer verifies, which is the intended outcome.
    pub fn write_with_hash(&mut self, address: usize, data: &[u8]) {
        self.write(address, &hash(data).to_ne_bytes());
        self.write(address.wrapping_add(HASH_SIZE), data);
    }

    /// Read a record written by [`write_with_hash`](Self::write_with_hash).
    ///
    /// `buf` is always overwritten. Returns `false` if its contents do not
    /// match the stored hash; the caller must then treat them as garbage
    /// (offer a reset, or refuse to use the record).
    pub fn read_with_hash(&mut self, address: usize, buf: &mut [u8]) -> bool {
        let mut stored = [0u8; HASH_SIZE];
        self.read(address, &mut stored);
        self.read(address.wrapping_add(HASH_SIZE), buf);
        let ok = HashCode::from_ne_bytes(stored) == hash(buf);
        if !ok {
            log::debug!("eeprom: hash mismatch for {}-byte record at 0x{:04X}", buf.len(), address);
        }
        ok
    }

    /// [`write_with_hash`](Self::write_with_hash) with a caller-supplied
    /// hash. The stored code takes `size_of::<H>()` bytes.
    pub fn write_with_custom_hash<H, F>(&mut self, address: usize, data: &[u8], hasher: F)
    where
        H: NoUninit,
        F: FnOnce(&[u8]) -> H,
    {
        let code = hasher(data);
        self.write(address, bytemuck::bytes_of(&code));
        self.write(address.wrapping_add(core::mem::size_of::<H>()), data);
    }

    /// [`read_with_hash`](Self::read_with_hash) with a caller-supplied hash.
    pub fn read_with_custom_hash<H, F>(&mut self, address: usize, buf: &mut [u8], hasher: F) -> bool
    where
        H: Pod + PartialEq,
        F: FnOnce(&[u8]) -> H,
    {
        let mut stored = H::zeroed();
        self.read(address, bytemuck::bytes_of_mut(&mut stored));
        self.read(address.wrapping_add(core::mem::size_of::<H>()), buf);
        stored == hasher(&*buf)
    }

    // ─── Typed helpers ──────────────────────────────────────────────────

    /// Overwrite `object` with `size_of::<T>()` bytes read at `address`.
    pub fn read_object<T: Pod>(&mut self, address: usize, object: &mut T) {
        self.read(address, bytemuck::bytes_of_mut(object));
    }

    pub fn write_object<T: NoUninit>(&mut self, address: usize, object: &T) {
        self.write(address, bytemuck::bytes_of(object));
    }

    pub fn write_object_with_hash<T: NoUninit>(&mut self, address: usize, object: &T) {
        self.write_with_hash(address, bytemuck::bytes_of(object));
    }

    /// Typed [`read_with_hash`](Self::read_with_hash). `object` is
    /// overwritten even when the check fails.
    pub fn read_object_with_hash<T: Pod>(&mut self, address: usize, object: &mut T) -> bool {
        self.read_with_hash(address, bytemuck::bytes_of_mut(object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoundsPolicy, DeviceConfig};
    use crate::device::MemoryDevice;
    use crate::hash::hashed_len;
    use bytemuck::Zeroable;
    use proptest::prelude::*;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
    struct Progress {
        level: u16,
        hp: u16,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
    struct Settings {
        volume: u8,
        flags: u8,
        high_score: [u8; 6],
    }

    fn blank() -> Eeprom<MemoryDevice> {
        let mut eeprom = Eeprom::new(MemoryDevice::new());
        eeprom.begin().unwrap();
        eeprom
    }

    #[test]
    fn test_bytes_round_trip() {
        let mut e = blank();
        e.write(10, &[1, 2, 3, 4, 5]);
        let mut buf = [0u8; 5];
        e.read(10, &mut buf);
        assert_eq!(buf, [1, 2, 3, 4, 5]);
        assert_eq!(e.device().stats().physical_writes, 5);
    }

    #[test]
    fn test_rewrite_same_object_costs_nothing() {
        let mut e = blank();
        let p = Progress { level: 3, hp: 99 };
        e.write_object_with_hash(0, &p);
        let before = e.device().stats().physical_writes;
        e.write_object_with_hash(0, &p);
        assert_eq!(e.device().stats().physical_writes, before);
        assert_eq!(e.device().max_wear(), 1);
    }

    #[test]
    fn test_partial_change_writes_only_changed_bytes() {
        let mut e = blank();
        e.write_object(0, &Progress { level: 1, hp: 20 });
        e.device_mut().reset_stats();
        e.write_object(0, &Progress { level: 1, hp: 21 });
        // Only the low byte of hp changed (in either byte order)
        assert_eq!(e.device().stats().physical_writes, 1);
    }

    #[test]
    fn test_hash_round_trip() {
        let mut e = blank();
        let s = Settings { volume: 7, flags: 0b101, high_score: *b"ABC123" };
        e.write_object_with_hash(200, &s);
        let mut out = Settings::zeroed();
        assert!(e.read_object_with_hash(200, &mut out));
        assert_eq!(out, s);
    }

    #[test]
    fn test_hash_stored_first() {
        let mut e = blank();
        e.write_with_hash(0, &[9, 8, 7]);
        let mut stored = [0u8; HASH_SIZE];
        e.read(0, &mut stored);
        assert_eq!(HashCode::from_ne_bytes(stored), hash(&[9, 8, 7]));
        let mut payload = [0u8; 3];
        e.read(HASH_SIZE, &mut payload);
        assert_eq!(payload, [9, 8, 7]);
    }

    #[test]
    fn test_level_hp_scenario() {
        let mut e = blank();
        let p = Progress { level: 5, hp: 20 };
        e.write_object_with_hash(100, &p);

        // Exactly [100, 108) touched
        for a in 0..1024 {
            let touched = e.device().wear(a) > 0;
            assert_eq!(touched, (100..108).contains(&a), "address {}", a);
        }
        assert_eq!(hashed_len(core::mem::size_of::<Progress>()), 8);

        let mut out = Progress::zeroed();
        assert!(e.read_object_with_hash(100, &mut out));

        let b = e.read_byte(104);
        e.device_mut().poke(104, b ^ 0x01);
        assert!(!e.read_object_with_hash(100, &mut out));
        // Output still overwritten with what was on the device
        assert_ne!(out, p);
    }

    #[test]
    fn test_blank_device_fails_check() {
        let mut e = blank();
        let mut out = Progress::zeroed();
        assert!(!e.read_object_with_hash(0, &mut out));
    }

    #[test]
    fn test_interrupted_write_detected() {
        let mut e = blank();
        e.write_object_with_hash(0, &Progress { level: 1, hp: 1 });
        // Power lost after the hash of a new value went out, before its payload
        let newer = Progress { level: 2, hp: 2 };
        e.write(0, &hash(bytemuck::bytes_of(&newer)).to_ne_bytes());
        let mut out = Progress::zeroed();
        assert!(!e.read_object_with_hash(0, &mut out));
    }

    #[test]
    fn test_multi_record_isolation() {
        let mut e = blank();
        let a1 = 0;
        let a2 = hashed_len(core::mem::size_of::<Progress>());
        e.write_object_with_hash(a1, &Progress { level: 1, hp: 10 });
        e.write_object_with_hash(a2, &Settings { volume: 3, flags: 0, high_score: [0; 6] });

        let b = e.read_byte(a1 + HASH_SIZE);
        e.device_mut().poke(a1 + HASH_SIZE, !b);

        let mut p = Progress::zeroed();
        let mut s = Settings::zeroed();
        assert!(!e.read_object_with_hash(a1, &mut p));
        assert!(e.read_object_with_hash(a2, &mut s));
        assert_eq!(s.volume, 3);
    }

    #[test]
    fn test_overlapping_record_invalidates_other() {
        let mut e = blank();
        e.write_with_hash(0, &[1; 8]);
        // A second record placed on top of the first one's payload tail
        e.write_with_hash(8, &[2; 4]);
        let mut buf = [0u8; 8];
        assert!(!e.read_with_hash(0, &mut buf));
        let mut buf = [0u8; 4];
        assert!(e.read_with_hash(8, &mut buf));
    }

    #[test]
    fn test_empty_payload() {
        let mut e = blank();
        e.write_with_hash(50, &[]);
        let mut stored = [0u8; HASH_SIZE];
        e.read(50, &mut stored);
        assert_eq!(stored, [0; HASH_SIZE]);
        assert!(e.read_with_hash(50, &mut []));
    }

    #[test]
    fn test_custom_hash_u16() {
        let mut e = blank();
        let sum = |d: &[u8]| d.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16));
        e.write_with_custom_hash(10, &[1, 2, 3], sum);
        // 2-byte code then payload
        let mut raw = [0u8; 5];
        e.read(10, &mut raw);
        assert_eq!(u16::from_ne_bytes([raw[0], raw[1]]), 6);
        assert_eq!(&raw[2..], &[1, 2, 3]);

        let mut buf = [0u8; 3];
        assert!(e.read_with_custom_hash(10, &mut buf, sum));
        e.device_mut().poke(12, 9);
        assert!(!e.read_with_custom_hash(10, &mut buf, sum));
    }

    #[test]
    fn test_custom_hash_u64() {
        let mut e = blank();
        let fnv = |d: &[u8]| {
            d.iter().fold(0xcbf2_9ce4_8422_2325u64, |h, &b| (h ^ b as u64).wrapping_mul(0x100_0000_01b3))
        };
        e.write_with_custom_hash(0, b"save", fnv);
        let mut buf = [0u8; 4];
        assert!(e.read_with_custom_hash(0, &mut buf, fnv));
        assert_eq!(&buf, b"save");
        // The default 32-bit check does not accept a 64-bit record
        assert!(!e.read_with_hash(0, &mut [0u8; 8]));
    }

    #[test]
    fn test_borrowed_device() {
        let mut dev = MemoryDevice::new();
        {
            let mut e = Eeprom::new(&mut dev);
            e.begin().unwrap();
            e.write_with_hash(0, &[42]);
            e.commit().unwrap();
        }
        assert_eq!(dev.stats().commits, 1);
        assert_eq!(dev.as_bytes()[HASH_SIZE], 42);
    }

    #[test]
    fn test_boxed_device() {
        let dev: Box<dyn ByteDevice> = Box::new(MemoryDevice::new());
        let mut e = Eeprom::new(dev);
        e.begin().unwrap();
        e.write_object_with_hash(0, &7u32);
        let mut v = 0u32;
        assert!(e.read_object_with_hash(0, &mut v));
        assert_eq!(v, 7);
        assert_eq!(e.capacity(), 1024);
    }

    #[test]
    fn test_commit_failure_surfaces() {
        let mut e = blank();
        e.write(0, &[1]);
        e.device_mut().fail_next_commit(1);
        assert!(e.commit().is_err());
        assert!(e.commit().is_ok());
    }

    #[test]
    fn test_record_past_end_faults_on_commit() {
        let cfg = DeviceConfig::default().bounds(BoundsPolicy::Fault);
        let mut e = Eeprom::new(MemoryDevice::with_config(&cfg));
        e.begin().unwrap();
        e.write_with_hash(1020, &[1, 2, 3, 4]);
        assert!(e.commit().is_err());
    }

    #[test]
    fn test_address_overflow_reaches_bounds_policy() {
        let mut e = blank();
        e.write(usize::MAX, &[0x11, 0x22]);
        // usize::MAX wraps to the last cell, the next address to cell 0
        assert_eq!(e.read_byte(1023), 0x11);
        assert_eq!(e.read_byte(0), 0x22);

        let cfg = DeviceConfig::default().bounds(BoundsPolicy::Fault);
        let mut e = Eeprom::new(MemoryDevice::with_config(&cfg));
        e.begin().unwrap();
        e.write_with_hash(usize::MAX - 1, &[1, 2, 3]);
        let mut buf = [0u8; 3];
        // First two hash bytes were faulted away
        assert!(!e.read_with_hash(usize::MAX - 1, &mut buf));
        assert!(matches!(
            e.commit(),
            Err(crate::error::DeviceError::OutOfBounds { address, .. }) if address == usize::MAX - 1
        ));
    }

    proptest! {
        #[test]
        fn prop_any_single_byte_flip_detected(
            payload in proptest::collection::vec(any::<u8>(), 1..64),
            addr in 0usize..512,
            pos in any::<proptest::sample::Index>(),
            mask in 1u8..=255,
        ) {
            let mut e = blank();
            e.write_with_hash(addr, &payload);
            let mut buf = vec![0u8; payload.len()];
            prop_assert!(e.read_with_hash(addr, &mut buf));
            prop_assert_eq!(&buf, &payload);

            let target = addr + pos.index(hashed_len(payload.len()));
            let b = e.read_byte(target);
            e.device_mut().poke(target, b ^ mask);
            prop_assert!(!e.read_with_hash(addr, &mut buf));
        }
    }
}
