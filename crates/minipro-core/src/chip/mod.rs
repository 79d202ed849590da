//! Chip types and database
//!
//! This module provides the [`ChipDescriptor`] record describing a
//! programmable part and the [`ChipDatabase`] used to look one up.

mod database;
mod types;

pub use database::*;
pub use types::*;
