//! Device configuration shared by all backends.

use serde::{Deserialize, Serialize};

use crate::EEPROM_SIZE;

/// What a backend does with an address at or beyond its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BoundsPolicy {
    /// Reduce the address modulo the capacity. The ATmega32u4 only
    /// decodes 10 address bits, so real hardware behaves this way.
    #[default]
    Wrap,
    /// Drop writes and read back the erased value.
    Discard,
    /// Like `Discard`, and latch the first offending address so the next
    /// `commit` reports it.
    Fault,
}

impl BoundsPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoundsPolicy::Wrap => "wrap",
            BoundsPolicy::Discard => "discard",
            BoundsPolicy::Fault => "fault",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "wrap" | "wraparound" => Some(BoundsPolicy::Wrap),
            "discard" | "ignore" => Some(BoundsPolicy::Discard),
            "fault" | "error" => Some(BoundsPolicy::Fault),
            _ => None,
        }
    }
}

/// Geometry and policy of a byte device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Number of addressable bytes.
    pub capacity: usize,
    /// Out-of-bounds handling.
    pub bounds: BoundsPolicy,
    /// Value of a blank cell (0xFF for AVR EEPROM and NOR flash).
    pub erased_value: u8,
}

impl DeviceConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity, ..Self::default() }
    }

    pub fn bounds(mut self, bounds: BoundsPolicy) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn erased_value(mut self, value: u8) -> Self {
        self.erased_value = value;
        self
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            capacity: EEPROM_SIZE,
            bounds: BoundsPolicy::Wrap,
            erased_value: 0xFF,
        }
    }
}
