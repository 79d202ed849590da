//! Chip descriptor type definitions

use std::fmt;

use crate::error::{Error, Result};

/// Mask selecting the memory shape byte of `opts4`
const OPTS4_SHAPE_MASK: u32 = 0xFF00_0000;
/// `opts4` flag: addresses are in words and must be halved on the wire
const OPTS4_HALF_ADDRESS: u32 = 0x2000;
/// `opts4` bits locating a write-protection bit
const OPTS4_PROTECTION_MASK: u32 = 0xC000;

/// One configuration field (fuse, lock byte, config word, user ID)
///
/// Fields sharing an `opcode` are transferred together in one payload of
/// the summed field sizes; `offset` locates the field inside that payload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct FuseField {
    /// Name used in the fuse file
    pub name: String,
    /// Command byte used to read/write this field
    pub opcode: u8,
    /// Field size in bytes
    pub size: u8,
    /// Byte offset within the opcode's combined payload
    pub offset: u8,
}

impl FuseField {
    /// Create a new fuse field
    pub fn new(name: &str, opcode: u8, size: u8, offset: u8) -> Self {
        Self {
            name: name.to_string(),
            opcode,
            size,
            offset,
        }
    }
}

/// Check that a fuse table is ordered by opcode
///
/// The fuse codec batches fields sharing an opcode into one transfer, which
/// only works when those fields are contiguous.
pub fn check_fuse_order(fuses: &[FuseField]) -> Result<()> {
    for pair in fuses.windows(2) {
        if pair[1].opcode < pair[0].opcode {
            return Err(Error::DatabaseInvariantViolation(format!(
                "field '{}' (opcode 0x{:02X}) follows '{}' (opcode 0x{:02X})",
                pair[1].name, pair[1].opcode, pair[0].name, pair[0].opcode
            )));
        }
    }
    Ok(())
}

/// Unit of the code memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryShape {
    /// Byte organized
    Bytes,
    /// Word organized
    Words,
    /// Bit organized
    Bits,
    /// Unrecognized shape code
    Unknown(u8),
}

impl fmt::Display for MemoryShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryShape::Bytes => write!(f, "Bytes"),
            MemoryShape::Words => write!(f, "Words"),
            MemoryShape::Bits => write!(f, "Bits"),
            MemoryShape::Unknown(code) => write!(f, "Unknown(0x{:02x})", code),
        }
    }
}

/// Socket/ICSP package description decoded from `package_details`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Package {
    /// Needs an adapter, identified by its image number
    Adapter(u8),
    /// Fits the ZIF socket directly
    Dip(u8),
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Package::Adapter(id) => write!(f, "Adapter{:03}.JPG", id),
            Package::Dip(pins) => write!(f, "DIP{}", pins),
        }
    }
}

/// Static description of one programmable part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipDescriptor {
    /// Chip name, e.g. "ATMEGA48@DIP28"
    pub name: String,
    /// Programming algorithm selector
    pub protocol_id: u8,
    /// Algorithm variant
    pub variant: u8,
    /// Addressing mode hint
    pub addressing_mode: u8,
    /// Bytes per read block
    pub read_block_size: u16,
    /// Bytes per write block
    pub write_block_size: u16,
    /// Code memory size in bytes
    pub code_memory_size: u32,
    /// Data memory (EEPROM) size in bytes
    pub data_memory_size: u32,
    /// Secondary data memory size in bytes
    pub data_memory2_size: u32,
    /// Vendor-specific chip ID (e.g. 0x1E9205 for ATMEGA48)
    pub chip_id: u32,
    /// Size of `chip_id` in bytes; 0 disables the ID check
    pub chip_id_size: u8,
    /// Option word 1
    pub opts1: u32,
    /// Option word 2
    pub opts2: u32,
    /// Option word 3
    pub opts3: u32,
    /// Option word 4 (memory shape, address halving, protection bit)
    pub opts4: u32,
    /// Package/adapter information
    pub package_details: u32,
    /// Value sent with the erase command
    pub write_unlock: u8,
    /// Configuration fields, ordered by opcode
    pub fuses: Vec<FuseField>,
}

impl ChipDescriptor {
    /// Shape of the code memory
    pub fn memory_shape(&self) -> MemoryShape {
        match ((self.opts4 & OPTS4_SHAPE_MASK) >> 24) as u8 {
            0x00 => MemoryShape::Bytes,
            0x01 => MemoryShape::Words,
            0x02 => MemoryShape::Bits,
            code => MemoryShape::Unknown(code),
        }
    }

    /// Bytes per addressable unit of the code memory
    pub fn word_size(&self) -> u32 {
        if self.memory_shape() == MemoryShape::Words {
            2
        } else {
            1
        }
    }

    /// Whether block addresses are halved before transmission
    pub fn halves_address(&self) -> bool {
        self.opts4 & OPTS4_HALF_ADDRESS != 0
    }

    /// Whether writes must be bracketed by protect off/on commands
    pub fn has_protection(&self) -> bool {
        self.opts4 & OPTS4_PROTECTION_MASK != 0
    }

    /// Whether the chip ID can be checked before operating
    pub fn has_chip_id(&self) -> bool {
        self.chip_id_size != 0 && self.chip_id != 0
    }

    /// Package as described by `package_details`
    pub fn package(&self) -> Package {
        let bytes = self.package_details.to_le_bytes();
        if bytes[0] != 0 {
            Package::Adapter(bytes[0])
        } else {
            Package::Dip(bytes[3])
        }
    }

    /// ICSP connection diagram number, if the chip supports ICSP
    pub fn icsp_image(&self) -> Option<u8> {
        match self.package_details.to_le_bytes()[1] {
            0 => None,
            id => Some(id),
        }
    }

    /// Whether this chip has any configuration fields
    pub fn has_fuses(&self) -> bool {
        !self.fuses.is_empty()
    }
}
