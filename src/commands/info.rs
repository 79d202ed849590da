//! Programmer and chip information

use minipro_core::chip::{ChipDatabase, ChipDescriptor};
use minipro_core::protocol::query_system_info;
use minipro_tl866::{Tl866, Tl866Error};

/// Show connected programmers and query the first one
pub fn run_info() -> Result<(), Box<dyn std::error::Error>> {
    let devices = Tl866::list_devices()?;
    if devices.is_empty() {
        return Err(Tl866Error::not_found().into());
    }
    for device in &devices {
        println!("{}", device);
    }

    let mut tl866 = Tl866::open()?;
    let info = query_system_info(&mut tl866)?;

    println!();
    println!("Programmer Information");
    println!("======================");
    println!("Model:           {}", info.model);
    println!("Protocol:        {}", info.protocol);
    println!(
        "Firmware:        {} (0x{:04x})",
        info.firmware_str, info.firmware
    );
    if info.firmware_too_old() {
        println!("Warning: firmware is too old, please update it with the vendor software");
    }

    Ok(())
}

/// Show database details for one chip
pub fn run_chip_info(db: &ChipDatabase, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let chip = db
        .find_by_name(name)
        .ok_or_else(|| format!("Unknown chip \"{}\"", name))?;

    print!("{}", describe_chip(chip));
    Ok(())
}

fn describe_chip(chip: &ChipDescriptor) -> String {
    let mut out = String::new();

    out.push_str(&format!("Name:            {}\n", chip.name));

    let mut memory = format!("{} {}", chip.code_memory_size, chip.memory_shape());
    if chip.data_memory_size != 0 {
        memory.push_str(&format!(" + {} Bytes", chip.data_memory_size));
    }
    if chip.data_memory2_size != 0 {
        memory.push_str(&format!(" + {} Bytes", chip.data_memory2_size));
    }
    out.push_str(&format!("Memory:          {}\n", memory));

    out.push_str(&format!("Package:         {}\n", chip.package()));
    match chip.icsp_image() {
        Some(id) => out.push_str(&format!("ISP:             ICP{:03}.JPG\n", id)),
        None => out.push_str("ISP:             -\n"),
    }
    out.push_str(&format!("Protocol:        0x{:02x}\n", chip.protocol_id));
    out.push_str(&format!("Read buffer:     {} Bytes\n", chip.read_block_size));
    out.push_str(&format!("Write buffer:    {} Bytes\n", chip.write_block_size));

    if chip.has_chip_id() {
        out.push_str(&format!(
            "Chip ID:         0x{:x} ({} bytes)\n",
            chip.chip_id, chip.chip_id_size
        ));
    }

    if chip.has_fuses() {
        out.push_str("Config fields:\n");
        for fuse in &chip.fuses {
            out.push_str(&format!(
                "  {:<12} opcode 0x{:02x}, {} byte(s) at offset {}\n",
                fuse.name, fuse.opcode, fuse.size, fuse.offset
            ));
        }
    }

    out
}
