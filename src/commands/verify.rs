//! Verify command implementation

use super::session::{open_session, plan_transfer, select_chip, slice_input, TransferPlan};
use super::{page_progress_bar, track};
use crate::cli::{ChipArgs, PageArgs, SizeCheckArgs};
use minipro_core::block::VerifyOutcome;
use minipro_core::chip::{ChipDatabase, ChipDescriptor};
use minipro_core::page::PageKind;
use minipro_core::programmer::Transport;
use minipro_core::protocol::Session;
use std::path::Path;

/// Run the verify command
pub fn run_verify(
    db: &ChipDatabase,
    chip_args: &ChipArgs,
    page_args: &PageArgs,
    size_check: SizeCheckArgs,
    input: &Path,
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
    let expected = slice_input(&file, page_args.file_offset, plan.map(|p| p.size), size_check)?;
    println!("Read {} bytes from {:?}", expected.len(), input);

    let mut session = open_session(db, chip, chip_args)?;
    verify_page(&mut session, page_args.page, plan, &expected)
}

/// Compare a page with `expected` and report the first difference
pub(super) fn verify_page<T: Transport>(
    session: &mut Session<T>,
    page: PageKind,
    plan: Option<TransferPlan>,
    expected: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    let pb = page_progress_bar(page, expected.len(), "Verifying")?;
    let result = session.page_verify(page, plan.map(|p| p.addr), expected, &mut track(&pb));
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            pb.abandon_with_message("Verification failed!");
            return Err(e.into());
        }
    };

    if outcome.is_match() {
        pb.finish_with_message("Verification passed");
        return Ok(());
    }

    pb.abandon_with_message("Verification failed!");
    Err(mismatch_message(session.chip(), page, &outcome).into())
}

fn mismatch_message(chip: &ChipDescriptor, page: PageKind, outcome: &VerifyOutcome) -> String {
    let VerifyOutcome::Mismatch {
        offset,
        expected,
        actual,
    } = *outcome
    else {
        return "Verification passed".to_string();
    };

    match page {
        PageKind::Config => format!(
            "Verification failed fuse 0x{:02x} - {}: 0x{:02x} (file) != 0x{:02x} (chip)",
            offset,
            chip.fuses.get(offset).map_or("?", |f| f.name.as_str()),
            expected,
            actual
        ),
        PageKind::Code | PageKind::Data => format!(
            "Verification failed at 0x{:02x}: 0x{:02x} (file) != 0x{:02x} (chip)",
            offset, expected, actual
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_message() {
        let db = ChipDatabase::builtin();
        let chip = db.find_by_name("ATMEGA48@DIP28").unwrap();

        let block = VerifyOutcome::Mismatch {
            offset: 0x42,
            expected: 0xAA,
            actual: 0xFF,
        };
        assert_eq!(
            mismatch_message(chip, PageKind::Code, &block),
            "Verification failed at 0x42: 0xaa (file) != 0xff (chip)"
        );

        let fuse = VerifyOutcome::Mismatch {
            offset: 1,
            expected: 0xDF,
            actual: 0xDD,
        };
        assert_eq!(
            mismatch_message(chip, PageKind::Config, &fuse),
            format!(
                "Verification failed fuse 0x01 - {}: 0xdf (file) != 0xdd (chip)",
                chip.fuses[1].name
            )
        );
    }
}
