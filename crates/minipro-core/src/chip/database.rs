//! Chip database
//!
//! The database is an arena of [`ChipDescriptor`] records. It is filled once
//! at startup (from the built-in table and/or RON files) and read-only
//! afterwards.

use std::fs;
use std::io;
use std::path::Path;

use super::types::{check_fuse_order, ChipDescriptor, FuseField};

/// Error type for chip database operations
#[derive(Debug)]
pub enum ChipDbError {
    /// I/O error reading files
    Io(io::Error),
    /// RON parsing error
    Parse(ron::error::SpannedError),
    /// Validation error
    Validation(String),
}

impl From<io::Error> for ChipDbError {
    fn from(e: io::Error) -> Self {
        ChipDbError::Io(e)
    }
}

impl From<ron::error::SpannedError> for ChipDbError {
    fn from(e: ron::error::SpannedError) -> Self {
        ChipDbError::Parse(e)
    }
}

impl std::fmt::Display for ChipDbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChipDbError::Io(e) => write!(f, "I/O error: {}", e),
            ChipDbError::Parse(e) => write!(f, "Parse error: {}", e),
            ChipDbError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ChipDbError {}

// ============================================================================
// RON deserialization types (intermediate format)
// ============================================================================

/// Single chip definition in RON format
#[derive(Debug, Clone, serde::Deserialize)]
struct ChipDef {
    name: String,
    protocol_id: u8,
    #[serde(default)]
    variant: u8,
    #[serde(default)]
    addressing_mode: u8,
    read_block_size: u16,
    write_block_size: u16,
    code_memory_size: u32,
    #[serde(default)]
    data_memory_size: u32,
    #[serde(default)]
    data_memory2_size: u32,
    #[serde(default)]
    chip_id: u32,
    #[serde(default)]
    chip_id_size: u8,
    #[serde(default)]
    opts1: u32,
    #[serde(default)]
    opts2: u32,
    #[serde(default)]
    opts3: u32,
    #[serde(default)]
    opts4: u32,
    #[serde(default)]
    package_details: u32,
    #[serde(default)]
    write_unlock: u8,
    #[serde(default)]
    fuses: Vec<FuseField>,
}

/// File-level wrapper
#[derive(Debug, Clone, serde::Deserialize)]
struct ChipFileDef {
    chips: Vec<ChipDef>,
}

impl TryFrom<ChipDef> for ChipDescriptor {
    type Error = ChipDbError;

    fn try_from(def: ChipDef) -> Result<Self, Self::Error> {
        if def.chip_id_size > 4 {
            return Err(ChipDbError::Validation(format!(
                "{}: chip_id_size {} exceeds 4 bytes",
                def.name, def.chip_id_size
            )));
        }
        if def.read_block_size == 0 || def.write_block_size == 0 {
            return Err(ChipDbError::Validation(format!(
                "{}: block sizes must be non-zero",
                def.name
            )));
        }
        check_fuse_order(&def.fuses)
            .map_err(|e| ChipDbError::Validation(format!("{}: {}", def.name, e)))?;

        Ok(ChipDescriptor {
            name: def.name,
            protocol_id: def.protocol_id,
            variant: def.variant,
            addressing_mode: def.addressing_mode,
            read_block_size: def.read_block_size,
            write_block_size: def.write_block_size,
            code_memory_size: def.code_memory_size,
            data_memory_size: def.data_memory_size,
            data_memory2_size: def.data_memory2_size,
            chip_id: def.chip_id,
            chip_id_size: def.chip_id_size,
            opts1: def.opts1,
            opts2: def.opts2,
            opts3: def.opts3,
            opts4: def.opts4,
            package_details: def.package_details,
            write_unlock: def.write_unlock,
            fuses: def.fuses,
        })
    }
}

// ============================================================================
// Built-in fuse tables
// ============================================================================

fn avr_fuses() -> Vec<FuseField> {
    vec![
        FuseField::new("fuses", 0x12, 1, 0),
        FuseField::new("lock_byte", 0x41, 1, 0),
    ]
}

fn avr2_fuses() -> Vec<FuseField> {
    vec![
        FuseField::new("fuses_lo", 0x12, 1, 0),
        FuseField::new("fuses_hi", 0x12, 1, 1),
        FuseField::new("lock_byte", 0x41, 1, 0),
    ]
}

fn avr3_fuses() -> Vec<FuseField> {
    vec![
        FuseField::new("fuses_lo", 0x12, 1, 0),
        FuseField::new("fuses_hi", 0x12, 1, 1),
        FuseField::new("fuses_ext", 0x12, 1, 2),
        FuseField::new("lock_byte", 0x41, 1, 0),
    ]
}

fn pic_fuses() -> Vec<FuseField> {
    vec![
        FuseField::new("user_id0", 0x10, 2, 0),
        FuseField::new("user_id1", 0x10, 2, 2),
        FuseField::new("user_id2", 0x10, 2, 4),
        FuseField::new("user_id3", 0x10, 2, 6),
        FuseField::new("conf_word", 0x12, 2, 0),
    ]
}

fn pic2_fuses() -> Vec<FuseField> {
    let mut fuses = pic_fuses();
    fuses.push(FuseField::new("conf_word1", 0x12, 2, 2));
    fuses
}

/// Compact constructor for the built-in table
#[allow(clippy::too_many_arguments)]
fn builtin_chip(
    name: &str,
    protocol_id: u8,
    variant: u8,
    blocks: (u16, u16),
    sizes: (u32, u32),
    chip_id: (u32, u8),
    opts: [u32; 4],
    package_details: u32,
    fuses: Vec<FuseField>,
) -> ChipDescriptor {
    ChipDescriptor {
        name: name.to_string(),
        protocol_id,
        variant,
        addressing_mode: 0,
        read_block_size: blocks.0,
        write_block_size: blocks.1,
        code_memory_size: sizes.0,
        data_memory_size: sizes.1,
        data_memory2_size: 0,
        chip_id: chip_id.0,
        chip_id_size: chip_id.1,
        opts1: opts[0],
        opts2: opts[1],
        opts3: opts[2],
        opts4: opts[3],
        package_details,
        write_unlock: 0,
        fuses,
    }
}

// ============================================================================
// Chip database
// ============================================================================

/// Runtime chip database
#[derive(Debug, Clone, Default)]
pub struct ChipDatabase {
    chips: Vec<ChipDescriptor>,
}

impl ChipDatabase {
    /// Create an empty chip database
    pub fn new() -> Self {
        Self { chips: Vec::new() }
    }

    /// Database holding the built-in chip table
    pub fn builtin() -> Self {
        let chips = vec![
            builtin_chip(
                "ATTINY12@DIP8",
                0x71,
                0x03,
                (0x40, 0x20),
                (0x400, 0x40),
                (0x1E9005, 3),
                [0x03, 0x20, 0x00, 0x4000],
                0x0800_0000,
                avr_fuses(),
            ),
            builtin_chip(
                "ATTINY13@DIP8",
                0x71,
                0x14,
                (0x40, 0x20),
                (0x400, 0x40),
                (0x1E9007, 3),
                [0x03, 0x20, 0x00, 0x4000],
                0x0800_0000,
                avr2_fuses(),
            ),
            builtin_chip(
                "ATMEGA48@DIP28",
                0x71,
                0x32,
                (0x80, 0x40),
                (0x1000, 0x100),
                (0x1E9205, 3),
                [0x03, 0x40, 0x00, 0x4000],
                0x1C00_0000,
                avr3_fuses(),
            ),
            builtin_chip(
                "ATMEGA8@DIP28",
                0x71,
                0x22,
                (0x80, 0x40),
                (0x2000, 0x200),
                (0x1E9307, 3),
                [0x03, 0x40, 0x00, 0x4000],
                0x1C00_0000,
                avr2_fuses(),
            ),
            builtin_chip(
                "ATMEGA328P@DIP28",
                0x71,
                0x33,
                (0x100, 0x80),
                (0x8000, 0x400),
                (0x1E950F, 3),
                [0x03, 0x80, 0x00, 0x4000],
                0x1C00_0000,
                avr3_fuses(),
            ),
            builtin_chip(
                "PIC16F84A@DIP18",
                0x63,
                0x00,
                (0x40, 0x10),
                (0x800, 0x40),
                (0x0560, 2),
                [0x00, 0x00, 0x00, 0x0100_2000],
                0x1200_0000,
                pic_fuses(),
            ),
            builtin_chip(
                "PIC16F628A@DIP18",
                0x63,
                0x01,
                (0x40, 0x10),
                (0x1000, 0x80),
                (0x1060, 2),
                [0x00, 0x00, 0x00, 0x0100_2000],
                0x1200_0000,
                pic_fuses(),
            ),
            builtin_chip(
                "PIC16F88@DIP18",
                0x63,
                0x02,
                (0x40, 0x10),
                (0x2000, 0x100),
                (0x0760, 2),
                [0x00, 0x00, 0x00, 0x0100_2000],
                0x1200_0000,
                pic2_fuses(),
            ),
            builtin_chip(
                "24C02@DIP8",
                0x41,
                0x00,
                (0x80, 0x10),
                (0x100, 0),
                (0, 0),
                [0x00, 0x00, 0x00, 0x00],
                0x0800_0000,
                Vec::new(),
            ),
            builtin_chip(
                "AT28C256@DIP28",
                0x31,
                0x00,
                (0x200, 0x40),
                (0x8000, 0),
                (0, 0),
                [0x00, 0x00, 0x00, 0x00],
                0x1C00_0000,
                Vec::new(),
            ),
        ];
        Self { chips }
    }

    /// Load chip definitions from a single RON file
    pub fn load_file(&mut self, path: &Path) -> Result<usize, ChipDbError> {
        let content = fs::read_to_string(path)?;
        self.load_ron(&content)
    }

    /// Load chip definitions from a RON string
    ///
    /// Chips whose name is already present replace the existing entry.
    pub fn load_ron(&mut self, content: &str) -> Result<usize, ChipDbError> {
        let file_def: ChipFileDef = ron::from_str(content)?;
        let count = file_def.chips.len();

        for chip_def in file_def.chips {
            let chip = ChipDescriptor::try_from(chip_def)?;
            match self
                .chips
                .iter_mut()
                .find(|c| c.name.eq_ignore_ascii_case(&chip.name))
            {
                Some(existing) => {
                    log::debug!("Overriding chip definition {}", chip.name);
                    *existing = chip;
                }
                None => self.chips.push(chip),
            }
        }

        Ok(count)
    }

    /// Load all RON files from a directory
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, ChipDbError> {
        let mut total = 0;

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().is_some_and(|ext| ext == "ron") {
                total += self.load_file(&path)?;
            }
        }

        Ok(total)
    }

    /// Get all chips in the database
    pub fn chips(&self) -> &[ChipDescriptor] {
        &self.chips
    }

    /// Get the number of chips in the database
    pub fn len(&self) -> usize {
        self.chips.len()
    }

    /// Check if the database is empty
    pub fn is_empty(&self) -> bool {
        self.chips.is_empty()
    }

    /// Find a chip by its exact name (case-insensitive)
    pub fn find_by_name(&self, name: &str) -> Option<&ChipDescriptor> {
        self.chips.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Find a chip by ID, requiring the declared ID size to match exactly
    pub fn find_by_id(&self, id: u32, id_size: u8) -> Option<&ChipDescriptor> {
        self.chips
            .iter()
            .find(|c| c.chip_id_size == id_size && c.chip_id == id && c.chip_id_size != 0)
    }

    /// Find chips whose name contains `filter` (case-insensitive)
    pub fn filter(&self, filter: &str) -> Vec<&ChipDescriptor> {
        let filter_lower = filter.to_lowercase();
        self.chips
            .iter()
            .filter(|c| c.name.to_lowercase().contains(&filter_lower))
            .collect()
    }

    /// Iterate over all chips
    pub fn iter(&self) -> impl Iterator<Item = &ChipDescriptor> {
        self.chips.iter()
    }
}
