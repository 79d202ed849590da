//! TL866 protocol implementation
//!
//! This module contains the command set spoken by the programmer
//! firmware and the [`Session`] that frames and sequences it.

mod frame;
mod session;

pub use session::*;

use crate::error::{Error, Result};

// Command opcodes
/// Query programmer model and firmware
pub const CMD_GET_SYSTEM_INFO: u8 = 0x00;
/// Power up the socket and select the chip algorithm
pub const CMD_BEGIN_TRANSACTION: u8 = 0x03;
/// Power down the socket
pub const CMD_END_TRANSACTION: u8 = 0x04;
/// Read the chip signature
pub const CMD_GET_CHIP_ID: u8 = 0x05;
/// Write a code memory block
pub const CMD_WRITE_CODE: u8 = 0x20;
/// Read a code memory block
pub const CMD_READ_CODE: u8 = 0x21;
/// Erase and unlock the chip for writing
pub const CMD_PREPARE_WRITING: u8 = 0x22;
/// Read a data memory block
pub const CMD_READ_DATA: u8 = 0x30;
/// Write a data memory block
pub const CMD_WRITE_DATA: u8 = 0x31;
/// Clear the write-protection bit
pub const CMD_PROTECT_OFF: u8 = 0x44;
/// Set the write-protection bit
pub const CMD_PROTECT_ON: u8 = 0x45;
/// Read the status word
pub const CMD_GET_STATUS: u8 = 0xFE;

// Frame lengths (bytes sent / bytes received)
pub(crate) const BEGIN_TRANSACTION_LEN: usize = 48;
pub(crate) const END_TRANSACTION_LEN: usize = 4;
pub(crate) const STATUS_LEN: usize = 5;
pub(crate) const STATUS_REPLY_LEN: usize = 32;
pub(crate) const CHIP_ID_LEN: usize = 8;
pub(crate) const CHIP_ID_REPLY_HEADER: usize = 5;
pub(crate) const READ_BLOCK_LEN: usize = 18;
pub(crate) const PREPARE_WRITING_LEN: usize = 15;
pub(crate) const PREPARE_WRITING_REPLY_LEN: usize = 10;
pub(crate) const PROTECT_LEN: usize = 10;
pub(crate) const FUSE_READ_LEN: usize = 18;
pub(crate) const SYSTEM_INFO_LEN: usize = 5;
pub(crate) const SYSTEM_INFO_REPLY_LEN: usize = 40;

/// Offset of the payload in block writes and fuse frames
pub const PAYLOAD_OFFSET: usize = 7;

/// Size of the session scratch buffer; no transfer is larger
pub const MSG_BUF_SIZE: usize = 0x400;

/// Largest payload a single block write can carry
pub const MAX_BLOCK_PAYLOAD: usize = MSG_BUF_SIZE - PAYLOAD_OFFSET;

/// Status reply byte flagging an overcurrent condition
pub const STATUS_OVERCURRENT_BYTE: usize = 9;

/// Oldest firmware this protocol is known to work with (03.2.61)
pub const MIN_FIRMWARE_VERSION: u16 = 0x023d;

/// Programmer model reported by system info
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    /// TL866A
    Tl866A,
    /// TL866CS
    Tl866Cs,
}

impl Model {
    /// Decode the model byte of the system info reply
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Model::Tl866A),
            2 => Some(Model::Tl866Cs),
            _ => None,
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Model::Tl866A => write!(f, "TL866A"),
            Model::Tl866Cs => write!(f, "TL866CS"),
        }
    }
}

/// Block transfer opcodes of a memory page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOpcodes {
    /// Opcode used to read blocks
    pub read: u8,
    /// Opcode used to write blocks
    pub write: u8,
}

/// Code memory opcodes
pub const CODE_OPCODES: BlockOpcodes = BlockOpcodes {
    read: CMD_READ_CODE,
    write: CMD_WRITE_CODE,
};

/// Data memory opcodes
pub const DATA_OPCODES: BlockOpcodes = BlockOpcodes {
    read: CMD_READ_DATA,
    write: CMD_WRITE_DATA,
};

/// Value of header byte 2 in fuse read/confirm frames
///
/// Config word reads (opcode 0x12) of 4 bytes cover two words.
pub fn fuse_read_selector(opcode: u8, len: usize) -> u8 {
    if opcode == 0x12 && len == 4 {
        2
    } else {
        1
    }
}

/// Framing of a fuse write command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuseWriteFrame {
    /// Opcodes 0x10..=0x1F: sent as opcode + 1 in a 64-byte frame
    Config {
        /// Opcode put on the wire
        opcode: u8,
    },
    /// Opcodes 0x40..=0x4F: sent as opcode - 1 in a 10-byte frame
    Lock {
        /// Opcode put on the wire
        opcode: u8,
    },
}

impl FuseWriteFrame {
    /// Framing for the fuse group read with `opcode`
    ///
    /// No other opcode range has a known write command.
    pub fn for_opcode(opcode: u8) -> Result<Self> {
        match opcode & 0xF0 {
            0x10 => Ok(FuseWriteFrame::Config { opcode: opcode + 1 }),
            0x40 => Ok(FuseWriteFrame::Lock { opcode: opcode - 1 }),
            _ => Err(Error::UnsupportedFuseOpcode(opcode)),
        }
    }

    /// Opcode put on the wire
    pub fn opcode(&self) -> u8 {
        match *self {
            FuseWriteFrame::Config { opcode } | FuseWriteFrame::Lock { opcode } => opcode,
        }
    }

    /// Total frame length sent
    pub fn frame_len(&self) -> usize {
        match self {
            FuseWriteFrame::Config { .. } => 64,
            FuseWriteFrame::Lock { .. } => 10,
        }
    }

    /// Largest payload the frame can hold
    pub fn capacity(&self) -> usize {
        self.frame_len() - PAYLOAD_OFFSET
    }
}
