//! File-backed EEPROM emulation.
//!
//! The whole image lives in RAM. `begin` loads it from disk, writes only
//! touch the buffer and set a dirty flag, and `commit` writes the buffer
//! back when something changed. Write-elision keeps untouched commits from
//! rewriting the file at all.

use std::path::{Path, PathBuf};

use crate::config::DeviceConfig;
use crate::device::{Bounds, ByteDevice};
use crate::error::DeviceResult;
use crate::image::{self, ImageFormat};

/// EEPROM emulated in a host file.
pub struct FileDevice {
    path: PathBuf,
    format: ImageFormat,
    cells: Vec<u8>,
    bounds: Bounds,
    erased_value: u8,
    /// Buffer differs from the file on disk
    dirty: bool,
    began: bool,
    /// Number of times the file has been written
    saves: u64,
}

impl FileDevice {
    /// Raw-format 1 KiB device at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(path, &DeviceConfig::default(), ImageFormat::Raw)
    }

    pub fn with_config(path: impl Into<PathBuf>, config: &DeviceConfig, format: ImageFormat) -> Self {
        FileDevice {
            path: path.into(),
            format,
            cells: vec![config.erased_value; config.capacity],
            bounds: Bounds::new(config),
            erased_value: config.erased_value,
            dirty: false,
            began: false,
            saves: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Change the format used by subsequent saves.
    pub fn set_format(&mut self, format: ImageFormat) {
        if format != self.format {
            self.format = format;
            self.dirty = true;
        }
    }

    /// True if there are writes not yet committed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of times the image file has been written.
    pub fn saves(&self) -> u64 {
        self.saves
    }

    /// Buffered contents, including uncommitted writes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.cells
    }

    /// Fill the buffer with the erased value.
    pub fn wipe(&mut self) {
        let erased = self.erased_value;
        for c in self.cells.iter_mut().filter(|c| **c != erased) {
            *c = erased;
            self.dirty = true;
        }
    }

    /// Write the buffer to another file in `format`, leaving this device's
    /// own file and dirty state untouched.
    pub fn export(&self, path: &Path, format: ImageFormat) -> DeviceResult<()> {
        image::save_to_file(path, &self.cells, format)?;
        Ok(())
    }
}

impl ByteDevice for FileDevice {
    fn capacity(&self) -> usize {
        self.bounds.capacity()
    }

    fn begin(&mut self) -> DeviceResult<()> {
        if self.began {
            log::warn!("{}: begin() called twice, ignoring", self.path.display());
            return Ok(());
        }
        if self.path.exists() {
            self.cells = image::load_from_file(&self.path, self.cells.len(), self.erased_value)?;
            log::debug!("{}: loaded {} bytes", self.path.display(), self.cells.len());
        } else {
            log::debug!("{}: no image yet, starting blank", self.path.display());
        }
        self.dirty = false;
        self.began = true;
        Ok(())
    }

    fn commit(&mut self) -> DeviceResult<()> {
        if self.dirty {
            image::save_to_file(&self.path, &self.cells, self.format)?;
            self.dirty = false;
            self.saves += 1;
            log::debug!("{}: saved ({})", self.path.display(), self.format.as_str());
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

/// Derive the EEPROM image path from a game file path.
/// `game.hex` → `game.eep`, `game.arduboy` → `game.eep`
pub fn eeprom_path(game_path: &str) -> String {
    let p = Path::new(game_path);
    let stem = p.file_stem().and_then(|s| s.to_str()).unwrap_or("game");
    let dir = p.parent().unwrap_or(Path::new("."));
    dir.join(format!("{}.eep", stem)).to_string_lossy().into_owned()
}
