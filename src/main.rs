//! minipro - A free and open TL866XX programmer
//!
//! Reads, writes and verifies the code, data and config pages of chips
//! seated in a TL866A/TL866CS programmer.
//!
//! # Architecture
//!
//! - `minipro-core` holds the protocol engine: chip database, transport
//!   session, block engine and fuse codec. It talks to the device through the
//!   `Transport` trait only.
//! - `minipro-tl866` implements `Transport` over USB bulk endpoints.
//! - This binary parses options, moves data between files and pages, and
//!   reports progress.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use minipro_core::chip::ChipDatabase;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logger, -v and -vv raise the default level
    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    match cli.verbose {
        0 => {} // default (info)
        1 => {
            logger.filter_level(log::LevelFilter::Debug);
        }
        _ => {
            logger.filter_level(log::LevelFilter::Trace);
        }
    }
    logger.init();

    // Load chip database
    let db = match load_chip_database(cli.chip_db.as_deref()) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to load chip database: {}", e);
            std::process::exit(1);
        }
    };

    log::debug!("Loaded {} chip definitions", db.len());

    match cli.command {
        Commands::Read { chip, page, output } => commands::run_read(&db, &chip, &page, &output),
        Commands::Write {
            chip,
            page,
            size_check,
            input,
            no_erase,
            no_pre_unprotect,
            no_post_protect,
            no_verify,
        } => {
            let options = commands::WriteOptions {
                no_erase,
                no_pre_unprotect,
                no_post_protect,
                verify: !no_verify,
            };
            commands::run_write(&db, &chip, &page, size_check, &input, &options)
        }
        Commands::Verify {
            chip,
            page,
            size_check,
            input,
        } => commands::run_verify(&db, &chip, &page, size_check, &input),
        Commands::Info => commands::run_info(),
        Commands::ChipInfo { chip } => commands::run_chip_info(&db, &chip),
        Commands::ListChips { filter } => {
            commands::list_chips(&db, filter.as_deref());
            Ok(())
        }
    }
}

/// Load the built-in chips plus any user definitions from `path`
fn load_chip_database(path: Option<&Path>) -> Result<ChipDatabase, Box<dyn std::error::Error>> {
    let mut db = ChipDatabase::builtin();

    if let Some(path) = path {
        let count = if path.is_dir() {
            db.load_dir(path)?
        } else if path.is_file() {
            db.load_file(path)?
        } else {
            return Err(format!("Chip database path not found: {}", path.display()).into());
        };
        log::debug!("Loaded {} chips from {}", count, path.display());
    }

    Ok(db)
}
