//! Programmer traits and abstractions
//!
//! This module defines the byte transport every programmer backend must
//! provide to the protocol session.

mod traits;

pub use traits::*;
