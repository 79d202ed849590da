//! TL866 USB constants

use std::time::Duration;

/// USB vendor ID of the TL866
pub const TL866_USB_VENDOR: u16 = 0x04D8;
/// USB product ID of the TL866
pub const TL866_USB_PRODUCT: u16 = 0xE11C;

/// Interface carrying the bulk endpoints
pub(crate) const INTERFACE: u8 = 0;

// Bulk endpoints
pub(crate) const WRITE_EP: u8 = 0x01;
pub(crate) const READ_EP: u8 = 0x81;

/// Timeout applied to every bulk transfer
pub(crate) const TRANSFER_TIMEOUT: Duration = Duration::from_secs(5);
