//! Chip selection, session setup and transfer planning shared by the page
//! commands

use crate::cli::{ChipArgs, PageArgs, SizeCheckArgs};
use minipro_core::chip::{ChipDatabase, ChipDescriptor};
use minipro_core::page::{ChipIdPolicy, PageKind};
use minipro_core::programmer::IcspFlags;
use minipro_core::protocol::Session;
use minipro_core::Error as CoreError;
use minipro_tl866::Tl866;

/// Look up the chip selected on the command line
pub fn select_chip<'a>(
    db: &'a ChipDatabase,
    args: &ChipArgs,
) -> Result<&'a ChipDescriptor, Box<dyn std::error::Error>> {
    if let Some(name) = &args.chip {
        return db.find_by_name(name).ok_or_else(|| {
            let similar = db.filter(name);
            if !similar.is_empty() {
                eprintln!("Chips with similar names:");
                for chip in similar {
                    eprintln!("  {}", chip.name);
                }
            }
            format!("Chip \"{}\" not found, try: minipro list-chips {}", name, name).into()
        });
    }

    if let Some(chip_id) = args.chip_id {
        return db.find_by_id(chip_id.id, chip_id.size).ok_or_else(|| {
            format!(
                "No chip with ID 0x{:x} ({} bytes) in database",
                chip_id.id, chip_id.size
            )
            .into()
        });
    }

    Err("Chip not specified, use --chip or --chip-id".into())
}

/// ICSP flags selected on the command line
pub fn icsp_flags(args: &ChipArgs) -> IcspFlags {
    if args.icsp_vcc {
        IcspFlags::ENABLE | IcspFlags::VCC
    } else if args.icsp {
        IcspFlags::ENABLE
    } else {
        IcspFlags::empty()
    }
}

/// Open the programmer, print its identity and check the chip ID
pub fn open_session(
    db: &ChipDatabase,
    chip: &ChipDescriptor,
    args: &ChipArgs,
) -> Result<Session<Tl866>, Box<dyn std::error::Error>> {
    let tl866 = Tl866::open()?;
    let mut session = Session::new(tl866, chip.clone(), icsp_flags(args));

    let info = session.system_info()?;
    println!("Found {} {}", info.model, info.firmware_str);
    log::debug!("ICSP flags: {:?}", session.icsp());

    check_chip_id(&mut session, db, args)?;

    Ok(session)
}

fn check_chip_id(
    session: &mut Session<Tl866>,
    db: &ChipDatabase,
    args: &ChipArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let policy = if args.chip_id_check_no_fail {
        ChipIdPolicy::Warn
    } else {
        ChipIdPolicy::Fail
    };

    match session.check_chip_id(policy) {
        Ok(Some(check)) if check.matched => {
            println!(
                "Chip ID OK: expected 0x{:02x}, got 0x{:02x}.",
                check.expected, check.actual
            );
            Ok(())
        }
        Ok(Some(check)) => {
            println!(
                "WARNING: Chip ID mismatch: expected 0x{:02x}, got 0x{:02x}.",
                check.expected, check.actual
            );
            if let Some(other) = db.find_by_id(check.actual, check.actual_size) {
                println!("The ID belongs to {}", other.name);
            }
            Ok(())
        }
        Ok(None) => {
            log::debug!("{} has no chip ID, skipping check", session.chip().name);
            Ok(())
        }
        Err(CoreError::ChipIdMismatch { expected, actual }) => Err(format!(
            "Invalid Chip ID: expected 0x{:02x}, got 0x{:02x}\n\
             (use '-y' to continue anyway at your own risk)",
            expected, actual
        )
        .into()),
        Err(e) => Err(e.into()),
    }
}

/// Address range of a code or data transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    /// Start address inside the page
    pub addr: u32,
    /// Number of bytes to transfer
    pub size: usize,
}

/// Resolve `--addr`/`--size` against the page
///
/// Returns `None` for the config page, whose size comes from the chip's
/// fuse list.
pub fn plan_transfer(
    chip: &ChipDescriptor,
    args: &PageArgs,
) -> Result<Option<TransferPlan>, Box<dyn std::error::Error>> {
    let page_size = match args.page {
        PageKind::Code => chip.code_memory_size as usize,
        PageKind::Data => chip.data_memory_size as usize,
        PageKind::Config => {
            if args.file_offset != 0 || args.addr.is_some() || args.size.is_some() {
                return Err(format!(
                    "chip page \"{}\" does not allow to set options: file-offset, addr, size",
                    args.page
                )
                .into());
            }
            return Ok(None);
        }
    };

    if page_size == 0 {
        return Err(format!("chip page \"{}\" size = 0 - does not exist", args.page).into());
    }

    let addr = args.addr.unwrap_or(0);
    if addr as usize > page_size {
        return Err(format!(
            "chip page \"{}\" size = {}, addr = {} is out of range",
            args.page, page_size, addr
        )
        .into());
    }

    let size = match args.size {
        Some(size) => size as usize,
        None => page_size - addr as usize,
    };
    if addr as usize + size > page_size {
        return Err(format!(
            "chip page \"{}\" size = {}, (addr + size) = {} + {} = {}",
            args.page,
            page_size,
            addr,
            size,
            addr as usize + size
        )
        .into());
    }
    if size == 0 {
        return Err("Data to transfer size set to 0, nothing to do".into());
    }

    Ok(Some(TransferPlan { addr, size }))
}

/// Cut the part of a file that will be transferred
///
/// A file shorter than the transfer is an error unless `-s`/`-S` were
/// given, in which case the available bytes are used.
pub fn slice_input(
    file: &[u8],
    file_offset: u64,
    needed: Option<usize>,
    size_check: SizeCheckArgs,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let offset = usize::try_from(file_offset)
        .map_err(|_| format!("File offset 0x{:x} is too large", file_offset))?;
    let available = file.len().saturating_sub(offset);
    let needed_len = needed.unwrap_or(0);

    if file.len() <= offset || available < needed_len {
        let message = format!(
            "Incorrect file size and offset: {} - {} = {}, needed at least {}",
            file.len(),
            offset,
            available,
            needed_len
        );
        if !size_check.no_size_error && !size_check.no_size_error_warn {
            return Err(message.into());
        }
        if !size_check.no_size_error_warn {
            log::warn!("{}", message);
        }
    }

    if available == 0 {
        return Err("No data to transfer after file offset".into());
    }

    let len = needed.map_or(available, |n| n.min(available));
    Ok(file[offset..offset + len].to_vec())
}
