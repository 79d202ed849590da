//! Page operations
//!
//! Chip memory is exposed as three pages: code, data and config. Code and
//! data go through the block engine; config goes through the fuse codec and
//! is exchanged as fuse file text.
//!
//! Every operation runs inside its own transaction and checks the
//! programmer status before moving any data.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::block::{self, Region, TransferProgress, VerifyOutcome};
use crate::chip::{ChipDescriptor, FuseField};
use crate::config::FuseFile;
use crate::error::{Error, Result};
use crate::fuse;
use crate::programmer::Transport;
use crate::protocol::{Session, CODE_OPCODES, DATA_OPCODES};

/// Memory page of a chip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    /// Program memory
    Code,
    /// Data memory (EEPROM)
    Data,
    /// Configuration fields
    Config,
}

impl PageKind {
    /// Page name as used on the command line
    pub fn name(&self) -> &'static str {
        match self {
            PageKind::Code => "code",
            PageKind::Data => "data",
            PageKind::Config => "config",
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for PageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "code" => Ok(PageKind::Code),
            "data" => Ok(PageKind::Data),
            "config" => Ok(PageKind::Config),
            _ => Err(Error::InvalidArgument(format!("unknown page '{}'", s))),
        }
    }
}

bitflags! {
    /// Steps of a page write that can be skipped
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WriteFlags: u8 {
        /// Do not erase the chip before writing
        const NO_ERASE         = 1 << 0;
        /// Do not clear write protection before writing
        const NO_PRE_UNPROTECT = 1 << 1;
        /// Do not set write protection after writing
        const NO_POST_PROTECT  = 1 << 2;
    }
}

/// What to do when the chip ID does not match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipIdPolicy {
    /// Fail with [`Error::ChipIdMismatch`]
    Fail,
    /// Log a warning and continue
    Warn,
}

/// Result of a chip ID check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipIdCheck {
    /// Whether the IDs are probably equal
    pub matched: bool,
    /// ID declared by the chip descriptor
    pub expected: u32,
    /// ID read from the chip
    pub actual: u32,
    /// Size of the ID read from the chip, in bytes
    pub actual_size: u8,
}

/// Compare a reported chip ID with the descriptor's
///
/// A reported ID wider than the declared one is shifted right by the extra
/// bytes before comparing; a narrower one never matches.
pub fn is_chip_id_probably_equal(chip: &ChipDescriptor, id: u32, id_size: u8) -> bool {
    if id_size < chip.chip_id_size {
        return false;
    }
    let extra_bits = (id_size - chip.chip_id_size) as u32 * 8;
    let shifted = id.checked_shr(extra_bits).unwrap_or(0);
    shifted == chip.chip_id
}

impl<T: Transport> Session<T> {
    /// Block geometry of a code or data page
    fn region(&self, kind: PageKind) -> Result<Region> {
        let chip = self.chip();
        let (size, opcodes) = match kind {
            PageKind::Code => (chip.code_memory_size, CODE_OPCODES),
            PageKind::Data => (chip.data_memory_size, DATA_OPCODES),
            PageKind::Config => {
                return Err(Error::InvalidArgument(
                    "config page has no block layout".to_string(),
                ))
            }
        };
        if size == 0 {
            return Err(Error::InvalidArgument(format!(
                "chip page \"{}\" size = 0, page does not exist",
                kind
            )));
        }

        Ok(Region {
            name: kind.name(),
            size: size as usize,
            read_block_size: chip.read_block_size as usize,
            write_block_size: chip.write_block_size as usize,
            opcodes,
            halve_address: chip.halves_address(),
        })
    }

    /// Resolve the default address and length of a request
    fn resolve(region: &Region, addr: Option<u32>, len: Option<usize>) -> Result<(u32, usize)> {
        let addr = addr.unwrap_or(0);
        let len = match len {
            Some(len) => len,
            None => region.size.checked_sub(addr as usize).ok_or(Error::OutOfRange {
                page: region.name,
                address: addr,
                length: 0,
                size: region.size,
            })?,
        };
        Ok((addr, len))
    }

    fn config_fields(&self, addr: Option<u32>, len: Option<usize>) -> Result<Vec<FuseField>> {
        if addr.is_some() || len.is_some() {
            return Err(Error::InvalidArgument(
                "chip page \"config\" does not accept an address or size".to_string(),
            ));
        }
        if !self.chip().has_fuses() {
            return Err(Error::InvalidArgument(format!(
                "{} has no configuration fields",
                self.chip().name
            )));
        }
        Ok(self.chip().fuses.clone())
    }

    /// Read a page
    ///
    /// Code and data default to the whole page starting at `addr` (or 0).
    /// The config page returns fuse file text and accepts neither address
    /// nor length.
    pub fn page_read<P>(
        &mut self,
        kind: PageKind,
        addr: Option<u32>,
        len: Option<usize>,
        progress: &mut P,
    ) -> Result<Vec<u8>>
    where
        P: TransferProgress + ?Sized,
    {
        if kind == PageKind::Config {
            let fields = self.config_fields(addr, len)?;
            let mut file = FuseFile::new();

            let mut tx = self.begin()?;
            tx.get_status()?;
            fuse::read(&mut *tx, &fields, &mut file)?;
            tx.finish()?;

            progress.update(1, 1);
            return Ok(file.to_string().into_bytes());
        }

        let region = self.region(kind)?;
        let (addr, len) = Self::resolve(&region, addr, len)?;
        region.check(addr, len, region.read_block_size)?;

        let mut buf = vec![0u8; len];
        let mut tx = self.begin()?;
        tx.get_status()?;
        block::read(&mut *tx, &region, addr, &mut buf, progress)?;
        tx.finish()?;

        Ok(buf)
    }

    /// Write a page
    ///
    /// For code and data the chip is erased first and write protection is
    /// lifted around the write when the chip has it, unless `flags` say
    /// otherwise. The config page takes fuse file text; erase and
    /// protection steps do not apply to it.
    pub fn page_write<P>(
        &mut self,
        kind: PageKind,
        addr: Option<u32>,
        data: &[u8],
        flags: WriteFlags,
        progress: &mut P,
    ) -> Result<()>
    where
        P: TransferProgress + ?Sized,
    {
        if kind == PageKind::Config {
            let fields = self.config_fields(addr, None)?;
            let file = FuseFile::from_bytes(data)?;
            let packed = fuse::pack_all(&fields, &file)?;

            let mut tx = self.begin()?;
            tx.get_status()?;
            fuse::write_packed(&mut *tx, packed)?;
            tx.finish()?;

            progress.update(1, 1);
            return Ok(());
        }

        let region = self.region(kind)?;
        let addr = addr.unwrap_or(0);
        region.check_write(addr, data.len())?;
        let protect = self.chip().has_protection();

        let mut tx = self.begin()?;
        tx.get_status()?;
        if !flags.contains(WriteFlags::NO_ERASE) {
            tx.prepare_writing()?;
        }
        if protect && !flags.contains(WriteFlags::NO_PRE_UNPROTECT) {
            tx.protect_off()?;
        }
        block::write(&mut *tx, &region, addr, data, progress)?;
        if protect && !flags.contains(WriteFlags::NO_POST_PROTECT) {
            tx.protect_on()?;
        }
        tx.finish()
    }

    /// Compare a page with `data`
    ///
    /// For the config page, `data` is fuse file text and the mismatch
    /// offset is the index of the differing fuse field.
    pub fn page_verify<P>(
        &mut self,
        kind: PageKind,
        addr: Option<u32>,
        data: &[u8],
        progress: &mut P,
    ) -> Result<VerifyOutcome>
    where
        P: TransferProgress + ?Sized,
    {
        if kind == PageKind::Config {
            let fields = self.config_fields(addr, None)?;
            let file = FuseFile::from_bytes(data)?;

            let mut tx = self.begin()?;
            tx.get_status()?;
            let outcome = fuse::verify(&mut *tx, &fields, &file)?;
            tx.finish()?;

            progress.update(1, 1);
            return Ok(outcome);
        }

        let region = self.region(kind)?;
        let addr = addr.unwrap_or(0);
        region.check(addr, data.len(), region.read_block_size)?;

        let mut tx = self.begin()?;
        tx.get_status()?;
        let outcome = block::verify(&mut *tx, &region, addr, data, progress)?;
        tx.finish()?;

        Ok(outcome)
    }

    /// Read the chip ID and compare it with the descriptor
    ///
    /// Returns `None` when the chip declares no ID.
    pub fn check_chip_id(&mut self, policy: ChipIdPolicy) -> Result<Option<ChipIdCheck>> {
        if !self.chip().has_chip_id() {
            return Ok(None);
        }

        let mut tx = self.begin()?;
        let (actual, actual_size) = tx.get_chip_id()?;
        tx.finish()?;

        let expected = self.chip().chip_id;
        let check = ChipIdCheck {
            matched: is_chip_id_probably_equal(self.chip(), actual, actual_size),
            expected,
            actual,
            actual_size,
        };

        if check.matched {
            log::info!("Chip ID OK: 0x{:02X}", actual);
        } else {
            match policy {
                ChipIdPolicy::Fail => return Err(Error::ChipIdMismatch { expected, actual }),
                ChipIdPolicy::Warn => log::warn!(
                    "Chip ID mismatch: expected 0x{:02X}, got 0x{:02X}",
                    expected,
                    actual
                ),
            }
        }

        Ok(Some(check))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::ChipDatabase;
    use crate::codec::{decode, Endian};
    use crate::programmer::IcspFlags;
    use std::collections::{BTreeMap, VecDeque};

    /// Software model of a TL866 with a chip in the socket
    #[derive(Default)]
    struct EmulatedTl866 {
        code: Vec<u8>,
        data: Vec<u8>,
        fuses: BTreeMap<u8, Vec<u8>>,
        chip_id: Vec<u8>,
        halve: bool,
        overcurrent: bool,
        frames: Vec<Vec<u8>>,
        reply: VecDeque<Vec<u8>>,
    }

    impl EmulatedTl866 {
        fn for_chip(chip: &ChipDescriptor) -> Self {
            let mut fuses = BTreeMap::new();
            for field in &chip.fuses {
                let payload = fuses.entry(field.opcode).or_insert_with(Vec::new);
                payload.extend(std::iter::repeat(0xFF).take(field.size as usize));
            }
            let id = crate::codec::encode(chip.chip_id, chip.chip_id_size as usize, Endian::Big);
            Self {
                code: (0..chip.code_memory_size).map(|i| i as u8).collect(),
                data: vec![0xFF; chip.data_memory_size as usize],
                fuses,
                chip_id: id,
                halve: chip.halves_address(),
                ..Default::default()
            }
        }

        fn opcodes(&self) -> Vec<u8> {
            self.frames.iter().map(|f| f[0]).collect()
        }

        fn block_reads(&self) -> Vec<u32> {
            self.frames
                .iter()
                .filter(|f| f[0] == 0x21 || f[0] == 0x30)
                .map(|f| decode(&f[4..7], Endian::Little))
                .collect()
        }

        fn memory(&mut self, opcode: u8) -> &mut Vec<u8> {
            match opcode {
                0x20 | 0x21 => &mut self.code,
                _ => &mut self.data,
            }
        }
    }

    impl Transport for EmulatedTl866 {
        fn send(&mut self, frame: &[u8]) -> Result<usize> {
            self.frames.push(frame.to_vec());
            let opcode = frame[0];

            match opcode {
                0x03 | 0x04 | 0x44 | 0x45 => {}
                0xFE => {
                    let mut status = vec![0u8; 32];
                    status[9] = self.overcurrent as u8;
                    self.reply.push_back(status);
                }
                0x05 => {
                    let mut reply = vec![0u8; 5 + self.chip_id.len()];
                    reply[2..2 + self.chip_id.len()].copy_from_slice(&self.chip_id);
                    self.reply.push_back(reply);
                }
                0x22 => {
                    self.code.fill(0xFF);
                    self.data.fill(0xFF);
                    self.reply.push_back(vec![0u8; 10]);
                }
                0x20 | 0x21 | 0x30 | 0x31 => {
                    let len = decode(&frame[2..4], Endian::Little) as usize;
                    let mut addr = decode(&frame[4..7], Endian::Little) as usize;
                    if self.halve {
                        addr <<= 1;
                    }
                    let mem = self.memory(opcode);
                    if opcode == 0x21 || opcode == 0x30 {
                        let block = mem[addr..addr + len].to_vec();
                        self.reply.push_back(block);
                    } else {
                        mem[addr..addr + len].copy_from_slice(&frame[7..7 + len]);
                    }
                }
                _ => {
                    // fuse write frames carry the read opcode +1 / -1
                    let read_opcode = match frame.len() {
                        64 => Some(opcode - 1),
                        10 => Some(opcode + 1),
                        _ => None,
                    };
                    match read_opcode {
                        Some(read_opcode) => {
                            let stored = self
                                .fuses
                                .get_mut(&read_opcode)
                                .ok_or_else(|| Error::Transport("bad fuse opcode".into()))?;
                            let len = stored.len();
                            stored.copy_from_slice(&frame[7..7 + len]);
                        }
                        None => {
                            let stored = self
                                .fuses
                                .get(&opcode)
                                .ok_or_else(|| Error::Transport("bad fuse opcode".into()))?;
                            let mut reply = vec![0u8; 7];
                            reply.extend_from_slice(stored);
                            self.reply.push_back(reply);
                        }
                    }
                }
            }
            Ok(frame.len())
        }

        fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
            let reply = self
                .reply
                .pop_front()
                .ok_or_else(|| Error::Transport("nothing to receive".into()))?;
            let n = reply.len().min(buf.len());
            buf[..n].copy_from_slice(&reply[..n]);
            Ok(n)
        }
    }

    fn session_for(chip: ChipDescriptor) -> Session<EmulatedTl866> {
        let device = EmulatedTl866::for_chip(&chip);
        Session::new(device, chip, IcspFlags::empty())
    }

    fn builtin(name: &str) -> ChipDescriptor {
        ChipDatabase::builtin().find_by_name(name).unwrap().clone()
    }

    fn no_progress(_: usize, _: usize) {}

    #[test]
    fn test_full_code_read_block_sequence() {
        let mut chip = builtin("ATMEGA48@DIP28");
        chip.code_memory_size = 2048;
        chip.read_block_size = 128;
        let mut session = session_for(chip);

        let data = session
            .page_read(PageKind::Code, Some(0), Some(2048), &mut no_progress)
            .unwrap();

        let device = session.transport_mut();
        assert_eq!(data, device.code);
        let expected: Vec<u32> = (0..16).map(|i| i * 128).collect();
        assert_eq!(device.block_reads(), expected);

        let opcodes = device.opcodes();
        assert_eq!(&opcodes[..2], &[0x03, 0xFE]);
        assert_eq!(opcodes.last(), Some(&0x04));
    }

    #[test]
    fn test_read_defaults_to_rest_of_page() {
        let mut session = session_for(builtin("ATMEGA48@DIP28"));
        let data = session
            .page_read(PageKind::Code, Some(0xF00), None, &mut no_progress)
            .unwrap();
        assert_eq!(data.len(), 0x100);
        assert_eq!(data[..], session.transport_mut().code[0xF00..]);
    }

    #[test]
    fn test_unaligned_write_reads_first_block() {
        let mut chip = builtin("ATMEGA48@DIP28");
        chip.write_block_size = 128;
        let mut session = session_for(chip);
        let before = session.transport_mut().code.clone();

        session
            .page_write(
                PageKind::Code,
                Some(100),
                &[0xA5; 50],
                WriteFlags::NO_ERASE,
                &mut no_progress,
            )
            .unwrap();

        let device = session.transport_mut();
        assert_eq!(device.block_reads(), vec![0]);
        assert_eq!(device.code[..100], before[..100]);
        assert_eq!(device.code[100..150], [0xA5; 50]);
        assert_eq!(device.code[150..], before[150..]);
    }

    #[test]
    fn test_write_sequence_and_flags() {
        let mut session = session_for(builtin("ATMEGA48@DIP28"));
        let image = vec![0x11u8; 0x80];

        session
            .page_write(PageKind::Code, None, &image, WriteFlags::empty(), &mut no_progress)
            .unwrap();
        assert_eq!(
            session.transport_mut().opcodes(),
            vec![0x03, 0xFE, 0x22, 0x44, 0x20, 0x20, 0x45, 0x04]
        );

        session.transport_mut().frames.clear();
        session
            .page_write(
                PageKind::Code,
                None,
                &image,
                WriteFlags::NO_ERASE | WriteFlags::NO_POST_PROTECT,
                &mut no_progress,
            )
            .unwrap();
        assert_eq!(
            session.transport_mut().opcodes(),
            vec![0x03, 0xFE, 0x44, 0x20, 0x20, 0x04]
        );
    }

    #[test]
    fn test_overcurrent_aborts_and_ends_transaction() {
        let mut session = session_for(builtin("ATMEGA48@DIP28"));
        session.transport_mut().overcurrent = true;

        let result = session.page_read(PageKind::Code, None, None, &mut no_progress);

        assert!(matches!(result, Err(Error::OverCurrent)));
        assert_eq!(session.transport_mut().opcodes(), vec![0x03, 0xFE, 0x04]);
    }

    #[test]
    fn test_validation_before_io() {
        let mut session = session_for(builtin("24C02@DIP8"));

        assert!(matches!(
            session.page_read(PageKind::Data, None, None, &mut no_progress),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            session.page_read(PageKind::Code, Some(0xF0), Some(0x20), &mut no_progress),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            session.page_write(PageKind::Code, None, &[], WriteFlags::empty(), &mut no_progress),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            session.page_read(PageKind::Config, None, None, &mut no_progress),
            Err(Error::InvalidArgument(_))
        ));
        assert!(session.transport_mut().frames.is_empty());
    }

    #[test]
    fn test_oversized_write_block_sends_nothing() {
        let mut chip = builtin("AT28C256@DIP28");
        chip.write_block_size = 0x400;
        let mut session = session_for(chip);

        let result = session.page_write(
            PageKind::Code,
            None,
            &[0x11; 0x400],
            WriteFlags::empty(),
            &mut no_progress,
        );
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(session.transport_mut().frames.is_empty());
    }

    #[test]
    fn test_verify_data_page() {
        let mut session = session_for(builtin("ATMEGA48@DIP28"));
        let mut expected = vec![0xFF; 0x100];

        assert!(session
            .page_verify(PageKind::Data, None, &expected, &mut no_progress)
            .unwrap()
            .is_match());

        expected[0x42] = 0x00;
        assert_eq!(
            session
                .page_verify(PageKind::Data, None, &expected, &mut no_progress)
                .unwrap(),
            VerifyOutcome::Mismatch {
                offset: 0x42,
                expected: 0x00,
                actual: 0xFF,
            }
        );
    }

    #[test]
    fn test_word_addressed_chip_halves_addresses() {
        let mut session = session_for(builtin("PIC16F84A@DIP18"));
        let data = session
            .page_read(PageKind::Code, Some(0x80), Some(0x80), &mut no_progress)
            .unwrap();

        let device = session.transport_mut();
        assert_eq!(device.block_reads(), vec![0x40, 0x60]);
        assert_eq!(data[..], device.code[0x80..0x100]);
    }

    #[test]
    fn test_config_round_trip() {
        let mut session = session_for(builtin("ATMEGA48@DIP28"));
        let text = b"fuses_lo = 0x0062\nfuses_hi = 0x00df\nfuses_ext = 0x00ff\nlock_byte = 0x003f\n";

        session
            .page_write(PageKind::Config, None, text, WriteFlags::empty(), &mut no_progress)
            .unwrap();
        assert!(!session.transport_mut().opcodes().contains(&0x22));

        let read = session
            .page_read(PageKind::Config, None, None, &mut no_progress)
            .unwrap();
        assert_eq!(read, text.to_vec());

        let mut changed = FuseFile::from_bytes(text).unwrap();
        changed.set("fuses_hi", "0x00d9");
        assert_eq!(
            session
                .page_verify(
                    PageKind::Config,
                    None,
                    changed.to_string().as_bytes(),
                    &mut no_progress
                )
                .unwrap(),
            VerifyOutcome::Mismatch {
                offset: 1,
                expected: 0xD9,
                actual: 0xDF,
            }
        );
    }

    #[test]
    fn test_config_rejects_address() {
        let mut session = session_for(builtin("ATMEGA48@DIP28"));
        assert!(matches!(
            session.page_read(PageKind::Config, Some(0), None, &mut no_progress),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            session.page_write(
                PageKind::Config,
                Some(4),
                b"fuses_lo = 0x62\n",
                WriteFlags::empty(),
                &mut no_progress
            ),
            Err(Error::InvalidArgument(_))
        ));
        assert!(session.transport_mut().frames.is_empty());
    }

    #[test]
    fn test_config_missing_value_writes_nothing() {
        let mut session = session_for(builtin("ATMEGA48@DIP28"));
        let result = session.page_write(
            PageKind::Config,
            None,
            b"fuses_lo = 0x62\n",
            WriteFlags::empty(),
            &mut no_progress,
        );
        assert!(matches!(result, Err(Error::FuseNotFound(_))));
        assert!(session.transport_mut().frames.is_empty());
    }

    #[test]
    fn test_config_malformed_value_writes_nothing() {
        let mut session = session_for(builtin("ATMEGA48@DIP28"));
        let result = session.page_write(
            PageKind::Config,
            None,
            b"fuses_lo = banana\nfuses_hi = 0xdf\nfuses_ext = 0xff\nlock_byte = 0x3f\n",
            WriteFlags::empty(),
            &mut no_progress,
        );
        assert!(matches!(
            result,
            Err(Error::InvalidArgument(msg)) if msg.contains("fuses_lo") && msg.contains("banana")
        ));
        assert!(session.transport_mut().frames.is_empty());
    }

    #[test]
    fn test_chip_id_policies() {
        let mut session = session_for(builtin("ATMEGA48@DIP28"));
        let check = session.check_chip_id(ChipIdPolicy::Fail).unwrap().unwrap();
        assert!(check.matched);
        assert_eq!(check.actual, 0x1E9205);

        session.transport_mut().chip_id = vec![0x1E, 0x93, 0x07];
        assert!(matches!(
            session.check_chip_id(ChipIdPolicy::Fail),
            Err(Error::ChipIdMismatch {
                expected: 0x1E9205,
                actual: 0x1E9307
            })
        ));
        let check = session.check_chip_id(ChipIdPolicy::Warn).unwrap().unwrap();
        assert!(!check.matched);

        let mut eeprom = session_for(builtin("24C02@DIP8"));
        assert_eq!(eeprom.check_chip_id(ChipIdPolicy::Fail).unwrap(), None);
        assert!(eeprom.transport_mut().frames.is_empty());
    }

    #[test]
    fn test_probable_chip_id_equality() {
        let mut chip = builtin("PIC16F84A@DIP18");
        chip.chip_id = 0x0560;
        chip.chip_id_size = 2;

        assert!(is_chip_id_probably_equal(&chip, 0x0560, 2));
        assert!(!is_chip_id_probably_equal(&chip, 0x0561, 2));
        assert!(is_chip_id_probably_equal(&chip, 0x0560_4F, 3));
        assert!(!is_chip_id_probably_equal(&chip, 0x0660_4F, 3));

        chip.chip_id_size = 3;
        assert!(!is_chip_id_probably_equal(&chip, 0x0560, 2));
    }

    #[test]
    fn test_page_kind_parse() {
        assert_eq!("CODE".parse::<PageKind>().unwrap(), PageKind::Code);
        assert_eq!("config".parse::<PageKind>().unwrap(), PageKind::Config);
        assert!("eeprom".parse::<PageKind>().is_err());
    }
}
