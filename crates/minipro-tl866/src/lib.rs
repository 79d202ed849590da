//! minipro-tl866 - TL866 USB programmer support
//!
//! This crate connects the `minipro-core` protocol engine to a TL866A or
//! TL866CS programmer over USB.
//!
//! # Protocol Overview
//!
//! The TL866 exposes one vendor interface with a bulk OUT endpoint for
//! commands and a bulk IN endpoint for replies. Each command is a single
//! OUT transfer; commands that return data are answered by a single IN
//! transfer of fixed length.
//!
//! # Example
//!
//! ```no_run
//! use minipro_core::protocol::query_system_info;
//! use minipro_tl866::Tl866;
//!
//! let mut tl866 = Tl866::open()?;
//! let info = query_system_info(&mut tl866)?;
//! println!("{} firmware {}", info.model, info.firmware_str);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod device;
mod error;
mod protocol;

pub use device::{Tl866, Tl866DeviceInfo};
pub use error::{Result, Tl866Error};
pub use protocol::{TL866_USB_PRODUCT, TL866_USB_VENDOR};
