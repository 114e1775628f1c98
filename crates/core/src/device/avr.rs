//! Native EEPROM access through the AVR EEPROM registers.
//!
//! The ATmega32u4 has 1 KB of EEPROM accessible through registers:
//! EECR (0x3F), EEDR (0x40), EEARL (0x41), EEARH (0x42), all given as
//! data-space addresses. [`AvrDevice`] drives them the way avr-libc's
//! `eeprom_read_byte` / `eeprom_update_byte` do, so it runs unchanged on
//! the real chip (via [`Mmio`]) or against [`EepromController`], a
//! register-level model of the EEPROM peripheral.

use crate::config::DeviceConfig;
use crate::device::{Bounds, ByteDevice};
use crate::error::DeviceResult;
use crate::EEPROM_SIZE;

/// EEPROM control register
pub const EECR: u16 = 0x3F;
/// EEPROM data register
pub const EEDR: u16 = 0x40;
/// EEPROM address register, low byte
pub const EEARL: u16 = 0x41;
/// EEPROM address register, high byte
pub const EEARH: u16 = 0x42;

// EECR bits
/// Read enable (strobe)
pub const EERE: u8 = 1 << 0;
/// Program enable (strobe, reads 1 while a write is in progress)
pub const EEPE: u8 = 1 << 1;
/// Master program enable; EEPE is only honoured right after this is set
pub const EEMPE: u8 = 1 << 2;
/// Ready interrupt enable
pub const EERIE: u8 = 1 << 3;
/// Programming mode bits: 00 erase+write, 01 erase only, 10 write only
pub const EEPM0: u8 = 1 << 4;
pub const EEPM1: u8 = 1 << 5;

/// Access to the EEPROM I/O registers.
pub trait EepromRegisters {
    fn read_io(&mut self, addr: u16) -> u8;
    fn write_io(&mut self, addr: u16, value: u8);
}

/// Volatile access to the real registers.
#[cfg(target_arch = "avr")]
pub struct Mmio;

#[cfg(target_arch = "avr")]
impl EepromRegisters for Mmio {
    #[inline(always)]
    fn read_io(&mut self, addr: u16) -> u8 {
        unsafe { core::ptr::read_volatile(addr as usize as *const u8) }
    }

    #[inline(always)]
    fn write_io(&mut self, addr: u16, value: u8) {
        unsafe { core::ptr::write_volatile(addr as usize as *mut u8, value) }
    }
}

/// EEPROM driven through [`EepromRegisters`].
pub struct AvrDevice<R> {
    regs: R,
    bounds: Bounds,
    erased_value: u8,
    began: bool,
}

impl<R: EepromRegisters> AvrDevice<R> {
    pub fn new(regs: R) -> Self {
        Self::with_config(regs, &DeviceConfig::default())
    }

    /// The chip decodes 10 address bits, so a capacity above 1 KB is
    /// clamped; otherwise the upper addresses would alias the lower ones
    /// without the bounds policy ever seeing them.
    pub fn with_config(regs: R, config: &DeviceConfig) -> Self {
        let mut config = config.clone();
        if config.capacity > EEPROM_SIZE {
            log::warn!("avr eeprom: capacity {} clamped to {}", config.capacity, EEPROM_SIZE);
            config.capacity = EEPROM_SIZE;
        }
        AvrDevice {
            regs,
            bounds: Bounds::new(&config),
            erased_value: config.erased_value,
            began: false,
        }
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    pub fn into_registers(self) -> R {
        self.regs
    }

    /// Spin until no write cycle is in progress.
    fn wait_ready(&mut self) {
        while self.regs.read_io(EECR) & EEPE != 0 {
            core::hint::spin_loop();
        }
    }

    fn select(&mut self, cell: usize) {
        self.regs.write_io(EEARH, (cell >> 8) as u8);
        self.regs.write_io(EEARL, cell as u8);
    }

    fn read_cell(&mut self, cell: usize) -> u8 {
        self.wait_ready();
        self.select(cell);
        self.regs.write_io(EECR, EERE);
        self.regs.read_io(EEDR)
    }
}

impl<R: EepromRegisters> ByteDevice for AvrDevice<R> {
    fn capacity(&self) -> usize {
        self.bounds.capacity()
    }

    fn begin(&mut self) -> DeviceResult<()> {
        if self.began {
            log::warn!("avr eeprom: begin() called twice, ignoring");
            return Ok(());
        }
        self.began = true;
        Ok(())
    }

    /// A completed write cycle is already durable; just let any pending
    /// cycle finish.
    fn commit(&mut self) -> DeviceResult<()> {
        self.wait_ready();
        self.bounds.take_fault()
    }

    fn read_byte(&mut self, address: usize) -> u8 {
        match self.bounds.resolve(address, "read") {
            Some(cell) => self.read_cell(cell),
            None => self.erased_value,
        }
    }

    fn write_byte(&mut self, address: usize, value: u8) {
        let Some(cell) = self.bounds.resolve(address, "write") else { return };
        // Leaves EEAR selecting `cell`
        if self.read_cell(cell) == value {
            return;
        }
        self.regs.write_io(EEDR, value);
        // Atomic erase+write mode
        self.regs.write_io(EECR, EEMPE);
        self.regs.write_io(EECR, EEMPE | EEPE);
    }
}

// ─── Simulated EEPROM peripheral ────────────────────────────────────────────

/// Register-level model of the ATmega32u4 EEPROM peripheral.
///
/// The address register decodes 10 bits, so addresses wrap at 1 KB.
/// A write cycle keeps EEPE set for `write_latency` polls of EECR.
pub struct EepromController {
    cells: Vec<u8>,
    eecr: u8,
    eedr: u8,
    eear: u16,
    /// EECR polls left before the current write cycle completes
    busy: u32,
    /// Polls a write cycle stays busy
    pub write_latency: u32,
    /// Completed write cycles
    pub physical_writes: u64,
    /// EEPROM dirty flag (true if modified since last save)
    pub dirty: bool,
}

impl EepromController {
    pub fn new() -> Self {
        EepromController {
            cells: vec![0xFF; EEPROM_SIZE],
            eecr: 0,
            eedr: 0,
            eear: 0,
            busy: 0,
            write_latency: 0,
            physical_writes: 0,
            dirty: false,
        }
    }

    /// Reset registers. EEPROM contents survive, as on the chip.
    pub fn reset(&mut self) {
        self.eecr = 0;
        self.eedr = 0;
        self.eear = 0;
        self.busy = 0;
    }

    /// EEPROM contents.
    pub fn contents(&self) -> &[u8] {
        &self.cells
    }

    /// Load EEPROM contents from a byte slice.
    pub fn load(&mut self, data: &[u8]) {
        let len = data.len().min(self.cells.len());
        self.cells[..len].copy_from_slice(&data[..len]);
        self.dirty = false;
    }

    fn address(&self) -> usize {
        (self.eear as usize) & (EEPROM_SIZE - 1)
    }

    fn write_eecr(&mut self, value: u8) {
        if self.busy > 0 {
            // Strobes are ignored while a write cycle runs
            self.eecr = (self.eecr & !EEMPE) | (value & (EERIE | EEPM0 | EEPM1));
            return;
        }
        let armed = self.eecr & EEMPE != 0;
        let keep = value & (EERIE | EEPM0 | EEPM1);

        if value & EERE != 0 {
            self.eedr = self.cells[self.address()];
        }

        if value & EEPE != 0 {
            if armed {
                let a = self.address();
                let old = self.cells[a];
                self.cells[a] = match value & (EEPM0 | EEPM1) {
                    EEPM0 => 0xFF,           // erase only
                    EEPM1 => old & self.eedr, // write only
                    _ => self.eedr,           // erase + write
                };
                self.physical_writes += 1;
                self.dirty = true;
                self.busy = self.write_latency;
            }
            self.eecr = keep;
        } else {
            self.eecr = keep | (value & EEMPE);
        }
    }
}

impl Default for EepromController {
    fn default() -> Self {
        Self::new()
    }
}

impl EepromRegisters for EepromController {
    fn read_io(&mut self, addr: u16) -> u8 {
        match addr {
            EECR => {
                if self.busy > 0 {
                    self.busy -= 1;
                    self.eecr | EEPE
                } else {
                    self.eecr
                }
            }
            EEDR => self.eedr,
            EEARL => self.eear as u8,
            EEARH => (self.eear >> 8) as u8,
            _ => 0,
        }
    }

    fn write_io(&mut self, addr: u16, value: u8) {
        match addr {
            EECR => self.write_eecr(value),
            EEDR => self.eedr = value,
            EEARL => self.eear = (self.eear & 0xFF00) | value as u16,
            EEARH => self.eear = (self.eear & 0x00FF) | ((value as u16) << 8),
            _ => {}
        }
    }
}
