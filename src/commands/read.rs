//! Read command implementation

use super::session::{open_session, plan_transfer, select_chip};
use super::{page_progress_bar, track};
use crate::cli::{ChipArgs, PageArgs};
use minipro_core::chip::ChipDatabase;
use minipro_core::page::PageKind;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

/// Run the read command
///
/// Code and data are written into `output` at `--file-offset`, leaving the
/// rest of an existing file alone. The config page replaces the file.
pub fn run_read(
    db: &ChipDatabase,
    chip_args: &ChipArgs,
    page_args: &PageArgs,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let chip = select_chip(db, chip_args)?;
    let plan = plan_transfer(chip, page_args)?;
    if let Some(plan) = &plan {
        println!(
            "Will transfer: {} bytes, starting from: 0x{:08x}.",
            plan.size, plan.addr
        );
    }

    let mut session = open_session(db, chip, chip_args)?;

    let pb = page_progress_bar(page_args.page, plan.map_or(0, |p| p.size), "Reading")?;
    let data = session.page_read(
        page_args.page,
        plan.map(|p| p.addr),
        plan.map(|p| p.size),
        &mut track(&pb),
    );
    let data = match data {
        Ok(data) => {
            pb.finish_with_message("Read complete");
            data
        }
        Err(e) => {
            pb.abandon_with_message("Read failed");
            return Err(e.into());
        }
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(page_args.page == PageKind::Config)
        .open(output)?;
    file.seek(SeekFrom::Start(page_args.file_offset))?;
    file.write_all(&data)?;

    println!("Wrote {} bytes to {:?}", data.len(), output);

    Ok(())
}
