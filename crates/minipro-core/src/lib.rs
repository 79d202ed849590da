//! minipro-core - Protocol engine for TL866 device programmers
//!
//! This crate contains everything needed to talk to a TL866-family
//! programmer except the USB plumbing itself: command framing, block
//! transfers with alignment handling, chip-ID checks and fuse
//! (configuration byte) packing.
//!
//! The USB side is abstracted by the [`programmer::Transport`] trait, which
//! is implemented by `minipro-tl866` for real hardware and by in-memory
//! mocks in tests.
//!
//! # Example
//!
//! ```ignore
//! use minipro_core::chip::ChipDatabase;
//! use minipro_core::page::PageKind;
//! use minipro_core::programmer::IcspFlags;
//! use minipro_core::protocol::Session;
//!
//! let db = ChipDatabase::builtin();
//! let chip = db.find_by_name("ATMEGA8@DIP28").unwrap().clone();
//! let mut session = Session::new(transport, chip, IcspFlags::empty());
//! let flash = session.page_read(PageKind::Code, None, None, &mut |_: usize, _: usize| {})?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod block;
pub mod chip;
pub mod codec;
pub mod config;
pub mod error;
pub mod fuse;
pub mod page;
pub mod programmer;
pub mod protocol;

pub use error::{Error, Result};
