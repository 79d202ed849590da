//! List commands implementation

use minipro_core::chip::ChipDatabase;

/// List all supported chips
pub fn list_chips(db: &ChipDatabase, filter: Option<&str>) {
    let chips = match filter {
        Some(filter) => db.filter(filter),
        None => db.iter().collect(),
    };

    println!("Supported chips:");
    println!();
    println!("{:<20} {:>10} {:>10} {:>10}", "Name", "Code", "Data", "Chip ID");
    println!("{}", "-".repeat(53));

    for chip in &chips {
        let id_str = if chip.has_chip_id() {
            format!("{:0width$X}", chip.chip_id, width = chip.chip_id_size as usize * 2)
        } else {
            "-".to_string()
        };

        println!(
            "{:<20} {:>10} {:>10} {:>10}",
            chip.name,
            format_size(chip.code_memory_size),
            format_size(chip.data_memory_size),
            id_str
        );
    }

    println!();
    println!("{} chip(s)", chips.len());
}

fn format_size(bytes: u32) -> String {
    if bytes == 0 {
        "-".to_string()
    } else if bytes >= 1024 && bytes % 1024 == 0 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "-");
        assert_eq!(format_size(0x100), "256 B");
        assert_eq!(format_size(0x8000), "32 KiB");
        assert_eq!(format_size(1500), "1500 B");
    }
}
