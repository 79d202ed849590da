//! Error types for minipro-core

use thiserror::Error;

/// Core error type
///
/// Transport-level failures (`DeviceNotFound`, `Transport`, `ShortTransfer`)
/// abort the current command. `OutOfRange` and `InvalidArgument` are raised
/// before any I/O is issued.
#[derive(Debug, Error)]
pub enum Error {
    /// Programmer not present on the bus
    #[error("programmer not found (VID:{vendor_id:04x} PID:{product_id:04x})")]
    DeviceNotFound {
        /// USB vendor ID searched for
        vendor_id: u16,
        /// USB product ID searched for
        product_id: u16,
    },

    /// USB transfer failed
    #[error("USB transfer failed: {0}")]
    Transport(String),

    /// Transfer moved a different number of bytes than the command requires
    #[error("I/O error: expected {expected} bytes but {actual} bytes transferred")]
    ShortTransfer {
        /// Bytes the command requires
        expected: usize,
        /// Bytes actually moved
        actual: usize,
    },

    /// Requested range does not fit the selected page
    #[error(
        "{page} page size is 0x{size:X} bytes, range 0x{address:X} + 0x{length:X} is out of range"
    )]
    OutOfRange {
        /// Page name
        page: &'static str,
        /// Start address of the request
        address: u32,
        /// Length of the request
        length: usize,
        /// Page size in bytes
        size: usize,
    },

    /// Invalid request parameters
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Config write-back confirmation returned different bytes
    #[error(
        "failed while writing config bytes (opcode 0x{opcode:02X}): wrote {expected:02X?}, read back {actual:02X?}"
    )]
    VerifyMismatch {
        /// Fuse opcode of the failing group
        opcode: u8,
        /// Payload that was written
        expected: Vec<u8>,
        /// Payload echoed by the programmer
        actual: Vec<u8>,
    },

    /// Chip ID read from the device differs from the descriptor
    #[error("invalid chip ID: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChipIdMismatch {
        /// ID declared by the chip descriptor
        expected: u32,
        /// ID reported by the device
        actual: u32,
    },

    /// Programmer reported an overcurrent fault
    #[error("overcurrent protection triggered")]
    OverCurrent,

    /// Fuse table of a chip descriptor is malformed
    #[error("fuse table invariant violated: {0}")]
    DatabaseInvariantViolation(String),

    /// Config file has no value for a fuse field
    #[error("config value '{0}' not found")]
    FuseNotFound(String),

    /// Fuse opcode has no known write framing
    #[error("no write framing for fuse opcode 0x{0:02X}")]
    UnsupportedFuseOpcode(u8),

    /// Reply from the programmer could not be interpreted
    #[error("invalid response from programmer: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Whether this error was raised by the USB transport
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound { .. } | Self::Transport(_) | Self::ShortTransfer { .. }
        )
    }
}

/// Result type alias using the core Error type
pub type Result<T> = std::result::Result<T, Error>;
