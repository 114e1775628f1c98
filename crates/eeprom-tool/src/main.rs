//! EEPROM image tool.
//!
//! Inspects and edits Arduboy EEPROM images on the host, using the same
//! codec games use on the device:
//!
//! - `dump` / `read` — view bytes
//! - `write` — poke bytes
//! - `check` / `seal` — verify or re-hash a hash-guarded record
//! - `wipe` — erase the whole image
//! - `convert` — re-save as raw `.eep` or packed
//! - `diff` — compare against another image

use anyhow::{bail, Context};
use arduboy_eeprom::device::eeprom_path;
use arduboy_eeprom::{
    hash, inspect, BoundsPolicy, ByteDevice, DeviceConfig, Eeprom, FileDevice, HashCode,
    ImageFormat, EEPROM_SIZE, HASH_SIZE,
};
use clap::{ArgAction, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Exit status of `check` when the record does not verify.
const EXIT_MISMATCH: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "eeprom-tool", version, about = "Inspect and edit Arduboy EEPROM images")]
struct Cli {
    /// EEPROM image file (raw .eep or packed). A game file (.hex,
    /// .arduboy, .elf) selects the .eep image next to it.
    image: PathBuf,

    /// Device size in bytes
    #[arg(long, value_parser = parse_addr, default_value_t = EEPROM_SIZE)]
    capacity: usize,

    /// Out-of-bounds policy: wrap, discard, fault
    #[arg(long, value_parser = parse_bounds, default_value = "wrap")]
    bounds: BoundsPolicy,

    /// Format used when saving back to IMAGE (default: keep the existing
    /// file's format)
    #[arg(long, value_parser = parse_format)]
    format: Option<ImageFormat>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Hex + ASCII view
    Dump {
        #[arg(long, value_parser = parse_addr, default_value = "0")]
        start: usize,
        #[arg(long, value_parser = parse_addr)]
        len: Option<usize>,
    },
    /// Print LEN bytes at ADDR as hex
    Read {
        #[arg(value_parser = parse_addr)]
        addr: usize,
        #[arg(value_parser = parse_addr)]
        len: usize,
    },
    /// Write hex bytes at ADDR
    Write {
        #[arg(value_parser = parse_addr)]
        addr: usize,
        /// e.g. "05001400" or "05 00 14 00"
        hex: String,
    },
    /// Verify the hash-guarded record with a LEN-byte payload at ADDR
    Check {
        #[arg(value_parser = parse_addr)]
        addr: usize,
        #[arg(value_parser = parse_addr)]
        len: usize,
    },
    /// Recompute and store the hash of the LEN-byte payload at ADDR+4
    Seal {
        #[arg(value_parser = parse_addr)]
        addr: usize,
        #[arg(value_parser = parse_addr)]
        len: usize,
    },
    /// Reset every byte to 0xFF
    Wipe,
    /// Save a copy in another format
    Convert {
        out: PathBuf,
        #[arg(long, value_parser = parse_format, default_value = "packed")]
        format: ImageFormat,
    },
    /// List bytes that differ from another image
    Diff { other: PathBuf },
}

fn parse_addr(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn parse_bounds(s: &str) -> Result<BoundsPolicy, String> {
    BoundsPolicy::from_str(s).ok_or_else(|| format!("unknown bounds policy '{}'", s))
}

fn parse_format(s: &str) -> Result<ImageFormat, String> {
    ImageFormat::from_str(s).ok_or_else(|| format!("unknown image format '{}'", s))
}

/// Parse hex byte pairs, ignoring whitespace.
fn parse_hex_bytes(s: &str) -> anyhow::Result<Vec<u8>> {
    let digits: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        bail!("odd number of hex characters");
    }
    digits
        .chunks(2)
        .map(|pair| {
            let text: String = pair.iter().collect();
            u8::from_str_radix(&text, 16).with_context(|| format!("invalid hex byte '{}'", text))
        })
        .collect()
}

fn hex_string(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(" ")
}

/// Map a game file to its EEPROM image; anything else is used as is.
fn image_path(path: &Path) -> PathBuf {
    match path.extension().and_then(|e| e.to_str()) {
        Some("hex" | "arduboy" | "elf") => PathBuf::from(eeprom_path(&path.to_string_lossy())),
        _ => path.to_path_buf(),
    }
}

fn open(cli: &Cli) -> anyhow::Result<Eeprom<FileDevice>> {
    let path = image_path(&cli.image);
    let config = DeviceConfig::with_capacity(cli.capacity).bounds(cli.bounds);
    let existing = std::fs::read(&path)
        .map(|bytes| ImageFormat::detect(&bytes))
        .unwrap_or_default();
    log::debug!("opening {} ({}, {} bytes)", path.display(), existing.as_str(), cli.capacity);

    let mut eeprom = Eeprom::new(FileDevice::with_config(&path, &config, existing));
    eeprom
        .begin()
        .with_context(|| format!("opening {}", path.display()))?;
    if let Some(format) = cli.format {
        eeprom.device_mut().set_format(format);
    }
    Ok(eeprom)
}

fn check_range(eeprom: &Eeprom<FileDevice>, addr: usize, len: usize) -> anyhow::Result<()> {
    if addr.checked_add(len).map_or(true, |end| end > eeprom.capacity()) {
        bail!("range 0x{:04X}+{} exceeds device size {}", addr, len, eeprom.capacity());
    }
    Ok(())
}

/// Execute a parsed command line, printing results to `out`.
/// Returns the process exit status.
fn run(cli: &Cli, out: &mut impl Write) -> anyhow::Result<u8> {
    let mut eeprom = open(cli)?;

    match &cli.command {
        Command::Dump { start, len } => {
            let data = eeprom.device().as_bytes();
            let len = len.unwrap_or(data.len());
            write!(out, "{}", inspect::dump(data, *start, len))?;
            let blank = inspect::blank_cells(data, 0xFF);
            writeln!(out, "{} of {} bytes blank", blank, data.len())?;
        }
        Command::Read { addr, len } => {
            check_range(&eeprom, *addr, *len)?;
            let mut buf = vec![0u8; *len];
            eeprom.read(*addr, &mut buf);
            writeln!(out, "{}", hex_string(&buf))?;
        }
        Command::Write { addr, hex } => {
            let bytes = parse_hex_bytes(hex)?;
            check_range(&eeprom, *addr, bytes.len())?;
            let before = eeprom.device().as_bytes().to_vec();
            eeprom.write(*addr, &bytes);
            eeprom.commit()?;
            write!(out, "{}", inspect::diff(&before, eeprom.device().as_bytes()))?;
        }
        Command::Check { addr, len } => {
            check_range(&eeprom, *addr, HASH_SIZE + *len)?;
            let mut stored = [0u8; HASH_SIZE];
            eeprom.read(*addr, &mut stored);
            let mut payload = vec![0u8; *len];
            if eeprom.read_with_hash(*addr, &mut payload) {
                writeln!(out, "ok: hash 0x{:08X}", HashCode::from_ne_bytes(stored))?;
            } else {
                log::info!("record at 0x{:04X} ({} bytes) failed its hash check", addr, len);
                writeln!(
                    out,
                    "MISMATCH: stored 0x{:08X}, computed 0x{:08X}",
                    HashCode::from_ne_bytes(stored),
                    hash(&payload)
                )?;
                return Ok(EXIT_MISMATCH);
            }
        }
        Command::Seal { addr, len } => {
            check_range(&eeprom, *addr, HASH_SIZE + *len)?;
            let mut payload = vec![0u8; *len];
            eeprom.read(*addr + HASH_SIZE, &mut payload);
            eeprom.write_with_hash(*addr, &payload);
            eeprom.commit()?;
            writeln!(out, "sealed {} bytes at 0x{:04X}: hash 0x{:08X}", len, addr, hash(&payload))?;
        }
        Command::Wipe => {
            eeprom.device_mut().wipe();
            eeprom.commit()?;
            writeln!(out, "wiped {}", eeprom.device().path().display())?;
        }
        Command::Convert { out: path, format } => {
            eeprom.device().export(path, *format)?;
            writeln!(out, "wrote {} ({})", path.display(), format.as_str())?;
        }
        Command::Diff { other } => {
            let other = image_path(other);
            let config = DeviceConfig::with_capacity(cli.capacity);
            let mut theirs = FileDevice::with_config(&other, &config, ImageFormat::Raw);
            theirs
                .begin()
                .with_context(|| format!("opening {}", other.display()))?;
            write!(out, "{}", inspect::diff(eeprom.device().as_bytes(), theirs.as_bytes()))?;
        }
    }
    Ok(0)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let stdout = std::io::stdout();
    match run(&cli, &mut stdout.lock()) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
