//! Human-readable views of EEPROM contents.

use std::fmt::Write;

const ROW: usize = 16;

/// Hex + ASCII dump of `data[start..start + length]`, one row per 16
/// bytes, with an extra gap after the eighth column.
///
/// ```text
/// 0060: 80 82 42 00 05 00 14 00  FF FF FF FF FF FF FF FF  ..B.............
/// ```
pub fn dump(data: &[u8], start: usize, length: usize) -> String {
    let end = start.saturating_add(length).min(data.len());
    let Some(window) = data.get(start..end) else { return String::new() };

    let mut s = String::new();
    for (n, row) in window.chunks(ROW).enumerate() {
        let _ = write!(s, "{:04X}: ", start + n * ROW);
        for col in 0..ROW {
            match row.get(col) {
                Some(b) => { let _ = write!(s, "{:02X} ", b); }
                None => s.push_str("   "),
            }
            if col == ROW / 2 - 1 {
                s.push(' ');
            }
        }
        s.push(' ');
        s.extend(row.iter().map(|&c| if c.is_ascii_graphic() || c == b' ' { c as char } else { '.' }));
        s.push('\n');
    }
    s
}

/// List bytes that differ between two images, one `0xAAAA: OO → NN` line
/// each. Only the common prefix is compared.
pub fn diff(old: &[u8], new: &[u8]) -> String {
    let mut s = String::new();
    for (i, (o, n)) in old.iter().zip(new).enumerate().filter(|(_, (o, n))| o != n) {
        let _ = writeln!(s, "  0x{:04X}: {:02X} → {:02X}", i, o, n);
    }
    if s.is_empty() {
        s.push_str("  (no changes)\n");
    }
    s
}

/// Count of cells still holding `erased_value`.
pub fn blank_cells(data: &[u8], erased_value: u8) -> usize {
    data.iter().filter(|&&b| b == erased_value).count()
}
