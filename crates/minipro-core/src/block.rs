//! Block transfer engine
//!
//! The programmer moves memory in fixed-size blocks. This module maps an
//! arbitrary `(address, length)` range of a memory page onto those blocks:
//!
//! - blocks fully covered by the range are transferred directly to or from
//!   the caller's buffer
//! - a partially covered first or last block goes through a scratch buffer;
//!   for writes the block is read first so bytes outside the range survive
//!
//! Addresses are byte addresses within the page. Word-addressed chips get
//! the block address halved on the wire.

use crate::error::{Error, Result};
use crate::protocol::{BlockOpcodes, MAX_BLOCK_PAYLOAD};

/// Highest block address the command header can carry
const MAX_WIRE_ADDRESS: u32 = 0x00FF_FFFF;

/// Raw block access provided by the protocol session
pub trait BlockIo {
    /// Read `buf.len()` bytes starting at wire address `addr`
    fn read_block(&mut self, opcode: u8, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// Write `data` starting at wire address `addr`
    fn write_block(&mut self, opcode: u8, addr: u32, data: &[u8]) -> Result<()>;
}

/// Progress sink, called with `(bytes_done, bytes_total)` after each block
pub trait TransferProgress {
    /// Report progress
    fn update(&mut self, done: usize, total: usize);
}

impl<F: FnMut(usize, usize)> TransferProgress for F {
    fn update(&mut self, done: usize, total: usize) {
        self(done, total)
    }
}

/// Result of a verify operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Everything compared equal
    Match,
    /// First difference found
    Mismatch {
        /// Offset of the difference, relative to the start of the request
        /// (for the config page: index of the fuse field)
        offset: usize,
        /// Value expected by the caller
        expected: u32,
        /// Value read from the chip
        actual: u32,
    },
}

impl VerifyOutcome {
    /// Whether verification succeeded
    pub fn is_match(&self) -> bool {
        matches!(self, VerifyOutcome::Match)
    }
}

/// Block geometry of one memory page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Page name used in error messages
    pub name: &'static str,
    /// Page size in bytes
    pub size: usize,
    /// Bytes per read block
    pub read_block_size: usize,
    /// Bytes per write block
    pub write_block_size: usize,
    /// Block opcodes of the page
    pub opcodes: BlockOpcodes,
    /// Halve block addresses before transmission
    pub halve_address: bool,
}

impl Region {
    fn wire_address(&self, block_addr: usize) -> u32 {
        if self.halve_address {
            (block_addr >> 1) as u32
        } else {
            block_addr as u32
        }
    }

    /// Validate a request and return the effective block size
    pub(crate) fn check(&self, addr: u32, len: usize, block_size: usize) -> Result<usize> {
        if len == 0 {
            return Err(Error::InvalidArgument(format!(
                "zero-length transfer on {} page",
                self.name
            )));
        }
        if block_size == 0 {
            return Err(Error::InvalidArgument(format!(
                "{} page has a zero block size",
                self.name
            )));
        }
        let fits = (addr as usize)
            .checked_add(len)
            .is_some_and(|end| end <= self.size);
        if !fits {
            return Err(Error::OutOfRange {
                page: self.name,
                address: addr,
                length: len,
                size: self.size,
            });
        }
        let block_size = block_size.min(self.size);
        if block_size > u16::MAX as usize {
            return Err(Error::InvalidArgument(format!(
                "{} page block of {} bytes does not fit in 16 bits",
                self.name, block_size
            )));
        }

        let last = addr as usize + len - 1;
        let last_wire = self.wire_address(last - last % block_size);
        if last_wire > MAX_WIRE_ADDRESS {
            return Err(Error::InvalidArgument(format!(
                "{} page block address 0x{:X} does not fit in 24 bits",
                self.name, last_wire
            )));
        }

        Ok(block_size)
    }

    /// Validate a write request and return the effective write block size
    pub(crate) fn check_write(&self, addr: u32, len: usize) -> Result<usize> {
        let block_size = self.check(addr, len, self.write_block_size)?;
        if block_size > MAX_BLOCK_PAYLOAD {
            return Err(Error::InvalidArgument(format!(
                "{} page write block of {} bytes exceeds the {} byte message buffer",
                self.name, block_size, MAX_BLOCK_PAYLOAD
            )));
        }
        Ok(block_size)
    }
}

/// One block touched by a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Chunk {
    /// Byte address of the block start
    block_addr: usize,
    /// Length of the block transfer
    block_len: usize,
    /// Offset of the requested bytes within the block
    offset: usize,
    /// Number of requested bytes within the block
    len: usize,
    /// Position of those bytes in the caller's buffer
    buf_offset: usize,
}

impl Chunk {
    fn is_full(&self) -> bool {
        self.offset == 0 && self.len == self.block_len
    }
}

/// Iterator over the blocks covering `[start, end)`
struct Chunks {
    start: usize,
    next: usize,
    end: usize,
    block_size: usize,
    limit: usize,
}

impl Chunks {
    fn new(addr: u32, len: usize, block_size: usize, limit: usize) -> Self {
        let start = addr as usize;
        Self {
            start,
            next: start,
            end: start + len,
            block_size,
            limit,
        }
    }
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.next >= self.end {
            return None;
        }

        let block_addr = self.next - self.next % self.block_size;
        let block_len = self.block_size.min(self.limit - block_addr);
        let offset = self.next - block_addr;
        let len = (block_len - offset).min(self.end - self.next);
        let chunk = Chunk {
            block_addr,
            block_len,
            offset,
            len,
            buf_offset: self.next - self.start,
        };

        self.next += len;
        Some(chunk)
    }
}

/// Read `buf.len()` bytes starting at `addr`
pub fn read<B, P>(
    io: &mut B,
    region: &Region,
    addr: u32,
    buf: &mut [u8],
    progress: &mut P,
) -> Result<()>
where
    B: BlockIo + ?Sized,
    P: TransferProgress + ?Sized,
{
    let total = buf.len();
    let block_size = region.check(addr, total, region.read_block_size)?;
    let mut scratch = vec![0u8; block_size];
    let mut done = 0;

    log::debug!(
        "Reading {} bytes of {} page from 0x{:X} in {} byte blocks",
        total,
        region.name,
        addr,
        block_size
    );

    for chunk in Chunks::new(addr, total, block_size, region.size) {
        let wire = region.wire_address(chunk.block_addr);
        let dest = &mut buf[chunk.buf_offset..chunk.buf_offset + chunk.len];

        if chunk.is_full() {
            io.read_block(region.opcodes.read, wire, dest)?;
        } else {
            let block = &mut scratch[..chunk.block_len];
            io.read_block(region.opcodes.read, wire, block)?;
            dest.copy_from_slice(&block[chunk.offset..chunk.offset + chunk.len]);
        }

        done += chunk.len;
        progress.update(done, total);
    }

    Ok(())
}

/// Write `data` starting at `addr`
///
/// Partially covered blocks are read back first and written whole.
pub fn write<B, P>(
    io: &mut B,
    region: &Region,
    addr: u32,
    data: &[u8],
    progress: &mut P,
) -> Result<()>
where
    B: BlockIo + ?Sized,
    P: TransferProgress + ?Sized,
{
    let total = data.len();
    let block_size = region.check_write(addr, total)?;
    let mut scratch = vec![0u8; block_size];
    let mut done = 0;

    log::debug!(
        "Writing {} bytes of {} page at 0x{:X} in {} byte blocks",
        total,
        region.name,
        addr,
        block_size
    );

    for chunk in Chunks::new(addr, total, block_size, region.size) {
        let wire = region.wire_address(chunk.block_addr);
        let src = &data[chunk.buf_offset..chunk.buf_offset + chunk.len];

        if chunk.is_full() {
            io.write_block(region.opcodes.write, wire, src)?;
        } else {
            log::trace!(
                "Read-modify-write of block 0x{:X} ({} of {} bytes)",
                chunk.block_addr,
                chunk.len,
                chunk.block_len
            );
            let block = &mut scratch[..chunk.block_len];
            io.read_block(region.opcodes.read, wire, block)?;
            block[chunk.offset..chunk.offset + chunk.len].copy_from_slice(src);
            io.write_block(region.opcodes.write, wire, block)?;
        }

        done += chunk.len;
        progress.update(done, total);
    }

    Ok(())
}

/// Compare chip memory starting at `addr` against `expected`
///
/// Stops at the first differing byte.
pub fn verify<B, P>(
    io: &mut B,
    region: &Region,
    addr: u32,
    expected: &[u8],
    progress: &mut P,
) -> Result<VerifyOutcome>
where
    B: BlockIo + ?Sized,
    P: TransferProgress + ?Sized,
{
    let total = expected.len();
    let block_size = region.check(addr, total, region.read_block_size)?;
    let mut scratch = vec![0u8; block_size];
    let mut done = 0;

    for chunk in Chunks::new(addr, total, block_size, region.size) {
        let wire = region.wire_address(chunk.block_addr);
        let block = &mut scratch[..chunk.block_len];
        io.read_block(region.opcodes.read, wire, block)?;

        let actual = &block[chunk.offset..chunk.offset + chunk.len];
        let wanted = &expected[chunk.buf_offset..chunk.buf_offset + chunk.len];
        if let Some(i) = actual.iter().zip(wanted).position(|(a, b)| a != b) {
            return Ok(VerifyOutcome::Mismatch {
                offset: chunk.buf_offset + i,
                expected: wanted[i] as u32,
                actual: actual[i] as u32,
            });
        }

        done += chunk.len;
        progress.update(done, total);
    }

    Ok(VerifyOutcome::Match)
}
