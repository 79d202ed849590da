//! Write command implementation

use super::session::{open_session, plan_transfer, select_chip, slice_input};
use super::verify::verify_page;
use super::{page_progress_bar, track};
use crate::cli::{ChipArgs, PageArgs, SizeCheckArgs};
use minipro_core::chip::ChipDatabase;
use minipro_core::page::WriteFlags;
use std::path::Path;

/// Write behaviour selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub no_erase: bool,
    pub no_pre_unprotect: bool,
    pub no_post_protect: bool,
    /// Verify the page after writing
    pub verify: bool,
}

impl WriteOptions {
    fn flags(&self) -> WriteFlags {
        let mut flags = WriteFlags::empty();
        flags.set(WriteFlags::NO_ERASE, self.no_erase);
        flags.set(WriteFlags::NO_PRE_UNPROTECT, self.no_pre_unprotect);
        flags.set(WriteFlags::NO_POST_PROTECT, self.no_post_protect);
        flags
    }
}

/// Run the write command
pub fn run_write(
    db: &ChipDatabase,
    chip_args: &ChipArgs,
    page_args: &PageArgs,
    size_check: SizeCheckArgs,
    input: &Path,
    options: &WriteOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let chip = select_chip(db, chip_args)?;
    let plan = plan_transfer(chip, page_args)?;
    if let Some(plan) = &plan {
        println!(
            "Will transfer: {} bytes, starting from: 0x{:08x}.",
            plan.size, plan.addr
        );
    }

    let file = std::fs::read(input)?;
    let data = slice_input(&file, page_args.file_offset, plan.map(|p| p.size), size_check)?;
    println!("Read {} bytes from {:?}", data.len(), input);

    let mut session = open_session(db, chip, chip_args)?;

    let pb = page_progress_bar(page_args.page, data.len(), "Writing")?;
    let result = session.page_write(
        page_args.page,
        plan.map(|p| p.addr),
        &data,
        options.flags(),
        &mut track(&pb),
    );
    match result {
        Ok(()) => pb.finish_with_message("Write complete"),
        Err(e) => {
            pb.abandon_with_message("Write failed");
            return Err(e.into());
        }
    }

    if !options.verify {
        log::info!("Skipping verification");
        return Ok(());
    }

    verify_page(&mut session, page_args.page, plan, &data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_flags() {
        let mut options = WriteOptions {
            no_erase: false,
            no_pre_unprotect: false,
            no_post_protect: false,
            verify: true,
        };
        assert_eq!(options.flags(), WriteFlags::empty());

        options.no_erase = true;
        options.no_post_protect = true;
        assert_eq!(
            options.flags(),
            WriteFlags::NO_ERASE | WriteFlags::NO_POST_PROTECT
        );
    }
}
