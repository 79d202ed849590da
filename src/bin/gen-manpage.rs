//! Writes `minipro.1` from the CLI definition
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use std::fs;
use std::path::PathBuf;

#[path = "../cli.rs"]
mod cli;

fn main() -> std::io::Result<()> {
    let output_dir = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("man"), PathBuf::from);
    fs::create_dir_all(&output_dir)?;

    let mut page = Vec::new();
    clap_mangen::Man::new(cli::Cli::command()).render(&mut page)?;

    let output_path = output_dir.join("minipro.1");
    fs::write(&output_path, page)?;
    println!("{}", output_path.display());

    Ok(())
}
