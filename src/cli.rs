//! CLI argument parsing

use clap::{Parser, Subcommand};
use minipro_core::page::PageKind;
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a string as a hex or decimal u64
fn parse_hex_u64(s: &str) -> Result<u64, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u64>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a chip ID given as hex digits
///
/// The ID size is the number of significant digits rounded up to whole
/// bytes, so "1e9205" is a 3 byte ID.
fn parse_chip_id(s: &str) -> Result<ChipIdArg, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let id = u32::from_str_radix(digits, 16).map_err(|e| format!("Invalid chip ID: {}", e))?;
    if id == 0 {
        return Err("Chip ID must not be zero".to_string());
    }
    let significant = format!("{:x}", id).len();

    Ok(ChipIdArg {
        id,
        size: significant.div_ceil(2) as u8,
    })
}

fn parse_page(s: &str) -> Result<PageKind, String> {
    s.parse::<PageKind>()
        .map_err(|_| format!("Unknown memory type \"{}\" [possible: code, data, config]", s))
}

/// Chip ID given on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipIdArg {
    /// ID value
    pub id: u32,
    /// ID size in bytes
    pub size: u8,
}

#[derive(Parser)]
#[command(name = "minipro")]
#[command(author, version, about = "A free and open TL866XX programmer", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to extra chip definitions (a .ron file or a directory of them)
    /// Entries override the built-in chips with the same name
    #[arg(long, global = true)]
    pub chip_db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Chip selection and connection options
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ChipArgs {
    /// Chip name, e.g. ATMEGA48@DIP28
    #[arg(short = 'p', long)]
    pub chip: Option<String>,

    /// Select the chip by its ID (hex, e.g. 1e9205)
    #[arg(long, value_parser = parse_chip_id, conflicts_with = "chip")]
    pub chip_id: Option<ChipIdArg>,

    /// Use ICSP (without enabling Vcc)
    #[arg(long)]
    pub icsp: bool,

    /// Use ICSP
    #[arg(long, conflicts_with = "icsp")]
    pub icsp_vcc: bool,

    /// Do NOT error on ID mismatch
    #[arg(short = 'y', long)]
    pub chip_id_check_no_fail: bool,
}

/// Page and address range options
#[derive(clap::Args, Debug, Clone)]
pub struct PageArgs {
    /// Memory page to operate on
    #[arg(short = 'c', long, value_parser = parse_page, default_value = "code")]
    pub page: PageKind,

    /// Start address inside the page (hex or decimal)
    #[arg(long, value_parser = parse_hex_u32)]
    pub addr: Option<u32>,

    /// Number of bytes to transfer (hex or decimal)
    #[arg(long, value_parser = parse_hex_u32)]
    pub size: Option<u32>,

    /// Offset into the file (hex or decimal)
    #[arg(long, value_parser = parse_hex_u64, default_value = "0")]
    pub file_offset: u64,
}

/// File size checking options
#[derive(clap::Args, Debug, Clone, Copy, Default)]
pub struct SizeCheckArgs {
    /// Do NOT error on file size mismatch (only a warning)
    #[arg(short = 's', long)]
    pub no_size_error: bool,

    /// No warning message for file size mismatch
    #[arg(short = 'S', long, conflicts_with = "no_size_error")]
    pub no_size_error_warn: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read a chip page to a file
    Read {
        #[command(flatten)]
        chip: ChipArgs,

        #[command(flatten)]
        page: PageArgs,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a file to a chip page
    Write {
        #[command(flatten)]
        chip: ChipArgs,

        #[command(flatten)]
        page: PageArgs,

        #[command(flatten)]
        size_check: SizeCheckArgs,

        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Do NOT erase device
        #[arg(long)]
        no_erase: bool,

        /// Do NOT disable write-protect before writing
        #[arg(long)]
        no_pre_unprotect: bool,

        /// Do NOT enable write-protect after writing
        #[arg(long)]
        no_post_protect: bool,

        /// Do NOT verify after write
        #[arg(long)]
        no_verify: bool,
    },

    /// Compare a chip page against a file
    Verify {
        #[command(flatten)]
        chip: ChipArgs,

        #[command(flatten)]
        page: PageArgs,

        #[command(flatten)]
        size_check: SizeCheckArgs,

        /// Input file path to verify against
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Show connected programmers and their firmware
    Info,

    /// Show chip information
    ChipInfo {
        /// Chip name
        #[arg(short = 'p', long)]
        chip: String,
    },

    /// List supported chips
    ListChips {
        /// Only show chips whose name contains this text
        filter: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_chip_id() {
        assert_eq!(
            parse_chip_id("1e9205"),
            Ok(ChipIdArg {
                id: 0x1E9205,
                size: 3
            })
        );
        assert_eq!(
            parse_chip_id("0x560"),
            Ok(ChipIdArg { id: 0x560, size: 2 })
        );
        assert!(parse_chip_id("0").is_err());
        assert!(parse_chip_id("xyz").is_err());
    }

    #[test]
    fn test_parse_write() {
        let cli = Cli::try_parse_from([
            "minipro", "-v", "write", "-p", "ATMEGA48@DIP28", "-c", "data", "--addr", "0x10",
            "-i", "eeprom.bin", "-s", "--no-erase",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Write {
                chip,
                page,
                size_check,
                no_erase,
                no_verify,
                ..
            } => {
                assert_eq!(chip.chip.as_deref(), Some("ATMEGA48@DIP28"));
                assert_eq!(page.page, PageKind::Data);
                assert_eq!(page.addr, Some(0x10));
                assert_eq!(page.file_offset, 0);
                assert!(size_check.no_size_error);
                assert!(no_erase);
                assert!(!no_verify);
            }
            _ => panic!("expected write"),
        }
    }

    #[test]
    fn test_size_flags_conflict() {
        assert!(Cli::try_parse_from(["minipro", "verify", "-i", "f.bin", "-s", "-S"]).is_err());
        assert!(Cli::try_parse_from(["minipro", "read", "-o", "f.bin", "-c", "flash"]).is_err());
    }
}
