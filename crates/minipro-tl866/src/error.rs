//! Error types for the TL866 programmer

use std::fmt;

use minipro_core::Error as CoreError;

use crate::protocol::{TL866_USB_PRODUCT, TL866_USB_VENDOR};

/// Result type for TL866 operations
pub type Result<T> = std::result::Result<T, Tl866Error>;

/// Errors that can occur when using the TL866 programmer
#[derive(Debug)]
pub enum Tl866Error {
    /// Device not found
    DeviceNotFound {
        /// Vendor ID searched for
        vendor_id: u16,
        /// Product ID searched for
        product_id: u16,
    },
    /// Failed to open device
    OpenFailed(String),
    /// Failed to claim interface
    ClaimFailed(String),
    /// USB transfer failed
    TransferFailed(String),
    /// Core library error
    Core(CoreError),
}

impl Tl866Error {
    /// Device-not-found error for the default TL866 IDs
    pub fn not_found() -> Self {
        Tl866Error::DeviceNotFound {
            vendor_id: TL866_USB_VENDOR,
            product_id: TL866_USB_PRODUCT,
        }
    }
}

impl fmt::Display for Tl866Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tl866Error::DeviceNotFound {
                vendor_id,
                product_id,
            } => write!(
                f,
                "TL866 device not found (VID:{:04x} PID:{:04x})",
                vendor_id, product_id
            ),
            Tl866Error::OpenFailed(msg) => write!(f, "Failed to open TL866: {}", msg),
            Tl866Error::ClaimFailed(msg) => write!(f, "Failed to claim interface: {}", msg),
            Tl866Error::TransferFailed(msg) => write!(f, "USB transfer failed: {}", msg),
            Tl866Error::Core(e) => write!(f, "Core error: {}", e),
        }
    }
}

impl std::error::Error for Tl866Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Tl866Error::Core(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CoreError> for Tl866Error {
    fn from(e: CoreError) -> Self {
        Tl866Error::Core(e)
    }
}

impl From<nusb::Error> for Tl866Error {
    fn from(e: nusb::Error) -> Self {
        Tl866Error::TransferFailed(e.to_string())
    }
}

impl From<Tl866Error> for CoreError {
    fn from(e: Tl866Error) -> Self {
        match e {
            Tl866Error::DeviceNotFound {
                vendor_id,
                product_id,
            } => CoreError::DeviceNotFound {
                vendor_id,
                product_id,
            },
            Tl866Error::TransferFailed(msg) => CoreError::Transport(msg),
            Tl866Error::Core(e) => e,
            other => CoreError::Transport(other.to_string()),
        }
    }
}
