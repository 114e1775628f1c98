//! EEPROM emulation on top of NOR flash.
//!
//! Flash can only clear bits when programming and must erase a whole
//! sector to set them again, so byte-granular updates are buffered in RAM.
//! `begin` reads the reserved region into the buffer; `commit` rewrites
//! each covering sector with the buffer overlaid on its current contents,
//! page by page, and verifies the region.
//! A commit with nothing changed does not touch the flash.

use std::fmt;

use crate::config::DeviceConfig;
use crate::device::{Bounds, ByteDevice};
use crate::error::{DeviceError, DeviceResult};

/// Minimal NOR flash interface.
pub trait FlashMedium {
    type Error: fmt::Display;

    /// Erase granularity in bytes.
    fn sector_size(&self) -> usize;

    /// Program granularity in bytes. A program never crosses a page.
    fn page_size(&self) -> usize;

    /// Read flash contents into `buf`, starting at `addr`.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Set the sector containing `addr` to all 1s (0xFF).
    fn sector_erase(&mut self, addr: u32) -> Result<(), Self::Error>;

    /// Program up to one page at `addr`. Only clears bits.
    fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error>;
}

impl<F: FlashMedium + ?Sized> FlashMedium for &mut F {
    type Error = F::Error;
    fn sector_size(&self) -> usize { (**self).sector_size() }
    fn page_size(&self) -> usize { (**self).page_size() }
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Error> { (**self).read(addr, buf) }
    fn sector_erase(&mut self, addr: u32) -> Result<(), Self::Error> { (**self).sector_erase(addr) }
    fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error> {
        (**self).page_program(addr, data)
    }
}

/// EEPROM emulated in a region of flash starting at `base`.
pub struct FlashDevice<F> {
    flash: F,
    base: u32,
    cells: Vec<u8>,
    bounds: Bounds,
    erased_value: u8,
    dirty: bool,
    began: bool,
}

impl<F: FlashMedium> FlashDevice<F> {
    /// 1 KiB region at `base`. Other data in the region's sectors is
    /// preserved across commits, at the cost of an erase per sector.
    pub fn new(flash: F, base: u32) -> Self {
        Self::with_config(flash, base, &DeviceConfig::default())
    }

    pub fn with_config(flash: F, base: u32, config: &DeviceConfig) -> Self {
        FlashDevice {
            flash,
            base,
            cells: vec![config.erased_value; config.capacity],
            bounds: Bounds::new(config),
            erased_value: config.erased_value,
            dirty: false,
            began: false,
        }
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    pub fn into_flash(self) -> F {
        self.flash
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn flash_err(operation: &'static str, address: u32, e: F::Error) -> DeviceError {
        DeviceError::Flash { operation, address, reason: e.to_string() }
    }

    fn flush(&mut self) -> DeviceResult<()> {
        let sector = self.flash.sector_size().max(1);
        let page = self.flash.page_size().max(1);
        let base = self.base as usize;
        let end = base + self.cells.len();

        // Read-modify-write each covering sector so bytes sharing a sector
        // with the region survive the erase.
        let mut scratch = vec![0u8; sector];
        let mut start = base / sector * sector;
        while start < end {
            self.flash
                .read(start as u32, &mut scratch)
                .map_err(|e| Self::flash_err("read", start as u32, e))?;
            let lo = base.max(start);
            let hi = end.min(start + sector);
            scratch[lo - start..hi - start].copy_from_slice(&self.cells[lo - base..hi - base]);

            self.flash
                .sector_erase(start as u32)
                .map_err(|e| Self::flash_err("erase", start as u32, e))?;
            for (i, chunk) in scratch.chunks(page).enumerate() {
                // Erased pages already read 0xFF
                if chunk.iter().all(|&b| b == 0xFF) {
                    continue;
                }
                let addr = (start + i * page) as u32;
                self.flash
                    .page_program(addr, chunk)
                    .map_err(|e| Self::flash_err("program", addr, e))?;
            }
            start += sector;
        }

        let mut check = vec![0u8; self.cells.len()];
        self.flash
            .read(self.base, &mut check)
            .map_err(|e| Self::flash_err("read", self.base, e))?;
        if let Some(i) = (0..check.len()).find(|&i| check[i] != self.cells[i]) {
            return Err(DeviceError::Verify { address: i, expected: self.cells[i], found: check[i] });
        }
        Ok(())
    }
}

impl<F: FlashMedium> ByteDevice for FlashDevice<F> {
    fn capacity(&self) -> usize {
        self.bounds.capacity()
    }

    fn begin(&mut self) -> DeviceResult<()> {
        if self.began {
            log::warn!("flash device: begin() called twice, ignoring");
            return Ok(());
        }
        let base = self.base;
        self.flash
            .read(base, &mut self.cells)
            .map_err(|e| Self::flash_err("read", base, e))?;
        self.dirty = false;
        self.began = true;
        log::debug!("flash device: loaded {} bytes from 0x{:06X}", self.cells.len(), base);
        Ok(())
    }

    fn commit(&mut self) -> DeviceResult<()> {
        if self.dirty {
            self.flush()?;
            self.dirty = false;
            log::debug!("flash device: committed {} bytes at 0x{:06X}", self.cells.len(), self.base);
        }
        self.bounds.take_fault()
    }

    fn read_byte(&mut self, address: usize) -> u8 {
        match self.bounds.resolve(address, "read") {
            Some(i) => self.cells[i],
            None => self.erased_value,
        }
    }

    fn write_byte(&mut self, address: usize, value: u8) {
        let Some(i) = self.bounds.resolve(address, "write") else { return };
        if self.cells[i] != value {
            self.cells[i] = value;
            self.dirty = true;
        }
    }
}

// ─── Simulated flash ────────────────────────────────────────────────────────

/// Errors from [`SimFlash`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimFlashError {
    #[error("address 0x{0:06X} beyond end of flash")]
    OutOfRange(u32),
    #[error("program of {len} bytes at 0x{addr:06X} crosses a page boundary")]
    PageOverflow { addr: u32, len: usize },
    #[error("flash is write protected")]
    WriteProtected,
}

/// In-memory NOR flash with W25Q-style geometry (4 KiB sectors, 256-byte
/// pages). Counts erases per sector.
pub struct SimFlash {
    data: Vec<u8>,
    sector_size: usize,
    page_size: usize,
    erase_counts: Vec<u32>,
    /// Reject erase/program while set
    pub write_protected: bool,
}

impl SimFlash {
    pub fn new(size: usize) -> Self {
        Self::with_geometry(size, 4096, 256)
    }

    pub fn with_geometry(size: usize, sector_size: usize, page_size: usize) -> Self {
        SimFlash {
            data: vec![0xFF; size],
            sector_size,
            page_size,
            erase_counts: vec![0; size.div_ceil(sector_size)],
            write_protected: false,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Erases performed on the sector containing `addr`.
    pub fn erase_count(&self, addr: u32) -> u32 {
        self.erase_counts.get(addr as usize / self.sector_size).copied().unwrap_or(0)
    }

    pub fn total_erases(&self) -> u32 {
        self.erase_counts.iter().sum()
    }

    fn check_range(&self, addr: u32, len: usize) -> Result<usize, SimFlashError> {
        let start = addr as usize;
        if start + len > self.data.len() {
            return Err(SimFlashError::OutOfRange(addr));
        }
        Ok(start)
    }
}

impl FlashMedium for SimFlash {
    type Error = SimFlashError;

    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), SimFlashError> {
        let start = self.check_range(addr, buf.len())?;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn sector_erase(&mut self, addr: u32) -> Result<(), SimFlashError> {
        if self.write_protected {
            return Err(SimFlashError::WriteProtected);
        }
        let start = self.check_range(addr, 1)? / self.sector_size * self.sector_size;
        let end = (start + self.sector_size).min(self.data.len());
        for b in &mut self.data[start..end] {
            *b = 0xFF;
        }
        self.erase_counts[start / self.sector_size] += 1;
        Ok(())
    }

    fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<(), SimFlashError> {
        if self.write_protected {
            return Err(SimFlashError::WriteProtected);
        }
        let start = self.check_range(addr, data.len())?;
        if start % self.page_size + data.len() > self.page_size {
            return Err(SimFlashError::PageOverflow { addr, len: data.len() });
        }
        // Flash programming can only clear bits (AND operation)
        for (cell, &b) in self.data[start..start + data.len()].iter_mut().zip(data) {
            *cell &= b;
        }
        Ok(())
    }
}
