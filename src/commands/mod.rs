//! CLI command implementations
//!
//! The page commands (read, write, verify) share the same setup: select the
//! chip, resolve the transfer range, open the programmer and check the chip
//! ID. That lives in `session`; progress bars live here.

mod info;
mod list;
mod read;
mod session;
mod verify;
mod write;

use indicatif::{ProgressBar, ProgressStyle};
use minipro_core::page::PageKind;
use std::time::Duration;

pub use info::{run_chip_info, run_info};
pub use list::list_chips;
pub use read::run_read;
pub use verify::run_verify;
pub use write::{run_write, WriteOptions};

/// Create a progress bar for a page transfer
///
/// Code and data show a byte counter; the config page is a handful of
/// fuse commands and gets a spinner instead.
fn page_progress_bar(
    page: PageKind,
    total: usize,
    phase: &str,
) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    if page == PageKind::Config {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        pb.set_message(format!("{} {}...", phase, page));
        pb.enable_steady_tick(Duration::from_millis(100));
        return Ok(pb);
    }

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {} {}",
                phase, page
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Progress callback that drives `pb`
fn track(pb: &ProgressBar) -> impl FnMut(usize, usize) + '_ {
    move |done: usize, total: usize| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    }
}
