//! In-memory byte device with wear instrumentation.
//!
//! Used as the test double for the codec: every physical write, elided
//! write, read and commit is counted, and each cell keeps its own wear
//! counter so write-elision can be asserted directly.

use crate::config::DeviceConfig;
use crate::device::{Bounds, ByteDevice};
use crate::error::{DeviceError, DeviceResult};

/// Access counters for a [`MemoryDevice`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WearStats {
    /// Writes that changed a cell
    pub physical_writes: u64,
    /// Writes skipped because the cell already held the value
    pub elided_writes: u64,
    /// Byte reads
    pub reads: u64,
    /// Successful commits
    pub commits: u64,
}

/// RAM-backed EEPROM.
pub struct MemoryDevice {
    cells: Vec<u8>,
    /// Physical write count per cell
    wear: Vec<u32>,
    bounds: Bounds,
    erased_value: u8,
    began: bool,
    stats: WearStats,
    /// Number of upcoming commits that will fail
    fail_commits: usize,
}

impl MemoryDevice {
    /// A blank 1 KiB device.
    pub fn new() -> Self {
        Self::with_config(&DeviceConfig::default())
    }

    pub fn with_config(config: &DeviceConfig) -> Self {
        MemoryDevice {
            cells: vec![config.erased_value; config.capacity],
            wear: vec![0; config.capacity],
            bounds: Bounds::new(config),
            erased_value: config.erased_value,
            began: false,
            stats: WearStats::default(),
            fail_commits: 0,
        }
    }

    /// Device preloaded with `data`. Shorter data leaves the tail erased,
    /// longer data is truncated.
    pub fn from_bytes(config: &DeviceConfig, data: &[u8]) -> Self {
        let mut dev = Self::with_config(config);
        let len = data.len().min(dev.cells.len());
        dev.cells[..len].copy_from_slice(&data[..len]);
        dev
    }

    /// Current contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.cells
    }

    pub fn stats(&self) -> WearStats {
        self.stats
    }

    /// Physical writes performed on one cell.
    pub fn wear(&self, address: usize) -> u32 {
        self.wear.get(address).copied().unwrap_or(0)
    }

    /// Highest per-cell wear count.
    pub fn max_wear(&self) -> u32 {
        self.wear.iter().copied().max().unwrap_or(0)
    }

    pub fn reset_stats(&mut self) {
        self.stats = WearStats::default();
        self.wear.iter_mut().for_each(|w| *w = 0);
    }

    /// Change a cell behind the codec's back, without counting it.
    /// Simulates corruption from a stray write or a worn cell.
    pub fn poke(&mut self, address: usize, value: u8) {
        if let Some(cell) = self.cells.get_mut(address) {
            *cell = value;
        }
    }

    /// Make the next `count` commits fail.
    pub fn fail_next_commit(&mut self, count: usize) {
        self.fail_commits = count;
    }

    /// Restore every cell to the erased value.
    pub fn erase(&mut self) {
        let erased = self.erased_value;
        self.cells.iter_mut().for_each(|c| *c = erased);
    }
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteDevice for MemoryDevice {
    fn capacity(&self) -> usize {
        self.bounds.capacity()
    }

    fn begin(&mut self) -> DeviceResult<()> {
        if self.began {
            log::warn!("memory device: begin() called twice, ignoring");
            return Ok(());
        }
        self.began = true;
        Ok(())
    }

    fn commit(&mut self) -> DeviceResult<()> {
        if self.fail_commits > 0 {
            self.fail_commits -= 1;
            return Err(DeviceError::CommitFailed("injected failure".into()));
        }
        self.bounds.take_fault()?;
        self.stats.commits += 1;
        Ok(())
    }

    fn read_byte(&mut self, address: usize) -> u8 {
        self.stats.reads += 1;
        match self.bounds.resolve(address, "read") {
            Some(i) => self.cells[i],
            None => self.erased_value,
        }
    }

    fn write_byte(&mut self, address: usize, value: u8) {
        let Some(i) = self.bounds.resolve(address, "write") else { return };
        if self.cells[i] == value {
            self.stats.elided_writes += 1;
            return;
        }
        self.cells[i] = value;
        self.wear[i] += 1;
        self.stats.physical_writes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoundsPolicy;

    #[test]
    fn test_new_is_erased() {
        let dev = MemoryDevice::new();
        assert_eq!(dev.capacity(), 1024);
        assert!(dev.as_bytes().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_write_elision() {
        let mut dev = MemoryDevice::new();
        dev.write_byte(10, 0x42);
        assert_eq!(dev.stats().physical_writes, 1);
        assert_eq!(dev.wear(10), 1);

        dev.write_byte(10, 0x42);
        assert_eq!(dev.stats().physical_writes, 1);
        assert_eq!(dev.stats().elided_writes, 1);
        assert_eq!(dev.wear(10), 1);

        // Writing the erased value to a blank cell is also free
        dev.write_byte(11, 0xFF);
        assert_eq!(dev.wear(11), 0);
    }

    #[test]
    fn test_poke_not_counted() {
        let mut dev = MemoryDevice::new();
        dev.poke(5, 0x00);
        assert_eq!(dev.read_byte(5), 0x00);
        assert_eq!(dev.stats().physical_writes, 0);
    }

    #[test]
    fn test_from_bytes_pads_and_truncates() {
        let cfg = DeviceConfig::with_capacity(4);
        let short = MemoryDevice::from_bytes(&cfg, &[1, 2]);
        assert_eq!(short.as_bytes(), &[1, 2, 0xFF, 0xFF]);
        let long = MemoryDevice::from_bytes(&cfg, &[1, 2, 3, 4, 5, 6]);
        assert_eq!(long.as_bytes(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_commit_failure_injection() {
        let mut dev = MemoryDevice::new();
        dev.begin().unwrap();
        dev.fail_next_commit(1);
        assert!(dev.commit().is_err());
        assert!(dev.commit().is_ok());
        assert_eq!(dev.stats().commits, 1);
    }

    #[test]
    fn test_fault_policy_reported_on_commit() {
        let cfg = DeviceConfig::default().bounds(BoundsPolicy::Fault);
        let mut dev = MemoryDevice::with_config(&cfg);
        dev.begin().unwrap();
        dev.write_byte(1024, 1);
        assert_eq!(dev.read_byte(4000), 0xFF);
        assert!(matches!(
            dev.commit(),
            Err(DeviceError::OutOfBounds { address: 1024, .. })
        ));
        assert!(dev.commit().is_ok());
    }

    #[test]
    fn test_wrap_policy() {
        let mut dev = MemoryDevice::new();
        dev.write_byte(1024 + 3, 0x77);
        assert_eq!(dev.read_byte(3), 0x77);
    }

    #[test]
    fn test_double_begin_keeps_contents() {
        let mut dev = MemoryDevice::new();
        dev.begin().unwrap();
        dev.write_byte(0, 1);
        dev.begin().unwrap();
        assert_eq!(dev.read_byte(0), 1);
    }

    #[test]
    fn test_erase_and_reset_stats() {
        let mut dev = MemoryDevice::new();
        dev.write_byte(0, 0);
        dev.write_byte(0, 1);
        assert_eq!(dev.max_wear(), 2);
        dev.erase();
        dev.reset_stats();
        assert_eq!(dev.read_byte(0), 0xFF);
        assert_eq!(dev.max_wear(), 0);
        assert_eq!(dev.stats().physical_writes, 0);
    }
}
