//! Protocol session
//!
//! A [`Session`] owns the transport, the chip being programmed and one
//! scratch message buffer. Every command is built in that buffer, sent in
//! a single bulk transfer and, where the command has one, followed by a
//! reply of fixed length. A transfer that moves a different number of bytes
//! than the command needs is an error.

use std::ops::{Deref, DerefMut};

use super::frame::write_header;
use super::*;
use crate::block::BlockIo;
use crate::chip::ChipDescriptor;
use crate::codec::{decode, Endian};
use crate::error::{Error, Result};
use crate::fuse::FuseIo;
use crate::programmer::{IcspFlags, Transport};

/// Programmer identification returned by the system info command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    /// Protocol version (1 or 2)
    pub protocol: u8,
    /// Programmer model
    pub model: Model,
    /// Firmware version word
    pub firmware: u16,
    /// Firmware version as printed by the vendor software
    pub firmware_str: String,
}

impl SystemInfo {
    /// Whether the firmware predates the oldest supported version
    pub fn firmware_too_old(&self) -> bool {
        self.firmware < MIN_FIRMWARE_VERSION
    }
}

/// Query the programmer model and firmware
///
/// This command does not depend on a chip, so it is usable before a
/// session exists.
pub fn query_system_info<T: Transport + ?Sized>(transport: &mut T) -> Result<SystemInfo> {
    let mut msg = [0u8; SYSTEM_INFO_LEN];
    msg[0] = CMD_GET_SYSTEM_INFO;
    check_len(SYSTEM_INFO_LEN, transport.send(&msg)?)?;

    let mut buf = [0u8; SYSTEM_INFO_REPLY_LEN];
    check_len(SYSTEM_INFO_REPLY_LEN, transport.recv(&mut buf)?)?;

    let protocol = buf[1];
    if !matches!(protocol, 1 | 2) {
        return Err(Error::InvalidResponse(format!(
            "unsupported protocol version {}",
            protocol
        )));
    }

    let model = Model::from_byte(buf[6])
        .ok_or_else(|| Error::InvalidResponse(format!("unknown device model {}", buf[6])))?;

    let info = SystemInfo {
        protocol,
        model,
        firmware: decode(&buf[4..6], Endian::Little) as u16,
        firmware_str: format!("{:02}.{}.{}", buf[39], buf[5], buf[4]),
    };

    if info.firmware_too_old() {
        log::warn!("Firmware {} is too old", info.firmware_str);
    }

    Ok(info)
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::ShortTransfer { expected, actual });
    }
    Ok(())
}

/// Protocol session bound to one chip
pub struct Session<T: Transport> {
    transport: T,
    chip: ChipDescriptor,
    icsp: IcspFlags,
    msg: Vec<u8>,
}

impl<T: Transport> Session<T> {
    /// Create a session driving `chip` over `transport`
    pub fn new(transport: T, chip: ChipDescriptor, icsp: IcspFlags) -> Self {
        Self {
            transport,
            chip,
            icsp,
            msg: vec![0u8; MSG_BUF_SIZE],
        }
    }

    /// Chip this session programs
    pub fn chip(&self) -> &ChipDescriptor {
        &self.chip
    }

    /// ICSP flags sent with every command
    pub fn icsp(&self) -> IcspFlags {
        self.icsp
    }

    /// Access the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the session and return the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Start a command in the scratch buffer
    fn init_msg(&mut self, opcode: u8) {
        write_header(&mut self.msg, opcode, &self.chip, self.icsp);
    }

    /// Send the first `len` bytes of the scratch buffer
    fn send_msg(&mut self, len: usize) -> Result<()> {
        log::trace!("TL866 OUT: {:02X?}", &self.msg[..len.min(32)]);
        let sent = self.transport.send(&self.msg[..len])?;
        check_len(len, sent)
    }

    /// Receive a `len`-byte reply into the scratch buffer
    fn recv_msg(&mut self, len: usize) -> Result<()> {
        let received = self.transport.recv(&mut self.msg[..len])?;
        check_len(len, received)?;
        log::trace!("TL866 IN: {:02X?}", &self.msg[..len.min(32)]);
        Ok(())
    }

    /// Receive a reply directly into `buf`
    fn recv_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let received = self.transport.recv(buf)?;
        check_len(buf.len(), received)
    }

    /// Power up the chip and start a transaction
    ///
    /// The returned guard ends the transaction when dropped.
    pub fn begin(&mut self) -> Result<Transaction<'_, T>> {
        log::debug!("Begin transaction for {}", self.chip.name);
        self.init_msg(CMD_BEGIN_TRANSACTION);
        self.send_msg(BEGIN_TRANSACTION_LEN)?;
        Ok(Transaction {
            session: self,
            ended: false,
        })
    }

    /// Power down the chip
    pub fn end_transaction(&mut self) -> Result<()> {
        log::debug!("End transaction");
        self.init_msg(CMD_END_TRANSACTION);
        self.send_msg(END_TRANSACTION_LEN)
    }

    /// Read the programmer status word
    ///
    /// Fails with [`Error::OverCurrent`] when the programmer flags an
    /// overcurrent condition.
    pub fn get_status(&mut self) -> Result<u16> {
        self.init_msg(CMD_GET_STATUS);
        self.send_msg(STATUS_LEN)?;
        self.recv_msg(STATUS_REPLY_LEN)?;

        if self.msg[STATUS_OVERCURRENT_BYTE] != 0 {
            log::error!("Overcurrent protection triggered");
            return Err(Error::OverCurrent);
        }

        Ok(decode(&self.msg[0..2], Endian::Little) as u16)
    }

    /// Read the chip ID
    ///
    /// Returns the ID and its size in bytes. The size is the descriptor's
    /// declared ID size, capped at 4.
    pub fn get_chip_id(&mut self) -> Result<(u32, u8)> {
        let size = self.chip.chip_id_size.min(4);
        self.init_msg(CMD_GET_CHIP_ID);
        self.send_msg(CHIP_ID_LEN)?;
        self.recv_msg(CHIP_ID_REPLY_HEADER + size as usize)?;

        let id = decode(&self.msg[2..2 + size as usize], Endian::Big);
        log::debug!("Chip ID: 0x{:X} ({} bytes)", id, size);
        Ok((id, size))
    }

    /// Erase the chip and prepare it for writing
    pub fn prepare_writing(&mut self) -> Result<()> {
        log::debug!("Erasing {}", self.chip.name);
        self.init_msg(CMD_PREPARE_WRITING);
        self.msg[2] = self.chip.write_unlock;
        self.msg[3] = 0x00;
        self.send_msg(PREPARE_WRITING_LEN)?;
        self.recv_msg(PREPARE_WRITING_REPLY_LEN)
    }

    /// Clear the chip's write-protection bit
    pub fn protect_off(&mut self) -> Result<()> {
        log::debug!("Protect off");
        self.init_msg(CMD_PROTECT_OFF);
        self.send_msg(PROTECT_LEN)
    }

    /// Set the chip's write-protection bit
    pub fn protect_on(&mut self) -> Result<()> {
        log::debug!("Protect on");
        self.init_msg(CMD_PROTECT_ON);
        self.send_msg(PROTECT_LEN)
    }

    /// Query the programmer model and firmware
    pub fn system_info(&mut self) -> Result<SystemInfo> {
        query_system_info(&mut self.transport)
    }

    fn write_block_header(&mut self, opcode: u8, addr: u32, len: usize) -> Result<()> {
        if addr > 0x00FF_FFFF {
            return Err(Error::InvalidArgument(format!(
                "block address 0x{:X} does not fit in 24 bits",
                addr
            )));
        }
        if len > u16::MAX as usize {
            return Err(Error::InvalidArgument(format!(
                "block length 0x{:X} does not fit in 16 bits",
                len
            )));
        }

        self.init_msg(opcode);
        crate::codec::encode_into(&mut self.msg[2..4], len as u32, Endian::Little);
        crate::codec::encode_into(&mut self.msg[4..7], addr, Endian::Little);
        Ok(())
    }
}

impl<T: Transport> BlockIo for Session<T> {
    fn read_block(&mut self, opcode: u8, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.write_block_header(opcode, addr, buf.len())?;
        self.send_msg(READ_BLOCK_LEN)?;
        self.recv_into(buf)
    }

    fn write_block(&mut self, opcode: u8, addr: u32, data: &[u8]) -> Result<()> {
        if data.len() > MAX_BLOCK_PAYLOAD {
            return Err(Error::InvalidArgument(format!(
                "block of {} bytes exceeds the {} byte message buffer",
                data.len(),
                MAX_BLOCK_PAYLOAD
            )));
        }
        self.write_block_header(opcode, addr, data.len())?;
        self.msg[PAYLOAD_OFFSET..PAYLOAD_OFFSET + data.len()].copy_from_slice(data);
        self.send_msg(PAYLOAD_OFFSET + data.len())
    }
}

impl<T: Transport> FuseIo for Session<T> {
    fn read_fuses(&mut self, opcode: u8, buf: &mut [u8]) -> Result<()> {
        let len = buf.len();
        self.init_msg(opcode);
        self.msg[2] = fuse_read_selector(opcode, len);
        self.msg[5] = 0x10;
        self.send_msg(FUSE_READ_LEN)?;
        self.recv_msg(PAYLOAD_OFFSET + len)?;
        buf.copy_from_slice(&self.msg[PAYLOAD_OFFSET..PAYLOAD_OFFSET + len]);
        Ok(())
    }

    fn write_fuses(&mut self, opcode: u8, payload: &[u8]) -> Result<()> {
        let frame = FuseWriteFrame::for_opcode(opcode)?;
        if payload.len() > frame.capacity() {
            return Err(Error::InvalidArgument(format!(
                "{} byte fuse payload does not fit opcode 0x{:02X}",
                payload.len(),
                opcode
            )));
        }

        self.init_msg(frame.opcode());
        if let FuseWriteFrame::Config { .. } = frame {
            self.msg[2] = if payload.len() == 4 { 0x02 } else { 0x01 };
            self.msg[4] = 0xC8;
            self.msg[5] = 0x0F;
            self.msg[6] = 0x00;
        }
        self.msg[PAYLOAD_OFFSET..PAYLOAD_OFFSET + payload.len()].copy_from_slice(payload);
        self.send_msg(frame.frame_len())
    }

    fn confirm_fuses(&mut self, opcode: u8, payload: &[u8], echo: &mut [u8]) -> Result<()> {
        let len = payload.len();
        self.init_msg(opcode);
        self.msg[2] = fuse_read_selector(opcode, len);
        self.msg[PAYLOAD_OFFSET..PAYLOAD_OFFSET + len].copy_from_slice(payload);
        self.send_msg(FUSE_READ_LEN)?;
        self.recv_msg(PAYLOAD_OFFSET + len)?;
        echo.copy_from_slice(&self.msg[PAYLOAD_OFFSET..PAYLOAD_OFFSET + len]);
        Ok(())
    }
}

/// Scoped transaction
///
/// Dereferences to the [`Session`]. Dropping the guard sends the
/// end-transaction command; use [`Transaction::finish`] to observe its
/// result.
pub struct Transaction<'a, T: Transport> {
    session: &'a mut Session<T>,
    ended: bool,
}

impl<T: Transport> Transaction<'_, T> {
    /// End the transaction, returning any transport error
    pub fn finish(mut self) -> Result<()> {
        self.ended = true;
        self.session.end_transaction()
    }
}

impl<T: Transport> Deref for Transaction<'_, T> {
    type Target = Session<T>;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl<T: Transport> DerefMut for Transaction<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl<T: Transport> Drop for Transaction<'_, T> {
    fn drop(&mut self) {
        if !self.ended {
            if let Err(e) = self.session.end_transaction() {
                log::warn!("Failed to end transaction: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::ChipDatabase;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Scripted transport recording every frame sent
    #[derive(Default, Clone)]
    struct ScriptedTransport {
        pub sent: Rc<RefCell<Vec<Vec<u8>>>>,
        pub replies: Rc<RefCell<VecDeque<Vec<u8>>>>,
        pub short_send: bool,
    }

    impl ScriptedTransport {
        pub fn reply(&self, data: Vec<u8>) {
            self.replies.borrow_mut().push_back(data);
        }

        pub fn opcodes(&self) -> Vec<u8> {
            self.sent.borrow().iter().map(|f| f[0]).collect()
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&mut self, data: &[u8]) -> Result<usize> {
            self.sent.borrow_mut().push(data.to_vec());
            if self.short_send {
                Ok(data.len() - 1)
            } else {
                Ok(data.len())
            }
        }

        fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
            let reply = self
                .replies
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| Error::Transport("no reply queued".into()))?;
            let n = reply.len().min(buf.len());
            buf[..n].copy_from_slice(&reply[..n]);
            Ok(n)
        }
    }

    fn new_session(name: &str) -> (Session<ScriptedTransport>, ScriptedTransport) {
        let chip = ChipDatabase::builtin().find_by_name(name).unwrap().clone();
        let transport = ScriptedTransport::default();
        (
            Session::new(transport.clone(), chip, IcspFlags::empty()),
            transport,
        )
    }

    #[test]
    fn test_frame_lengths() {
        let (mut session, transport) = new_session("ATMEGA48@DIP28");
        {
            let _tx = session.begin().unwrap();
        }
        session.protect_off().unwrap();
        session.protect_on().unwrap();

        let lens: Vec<usize> = transport.sent.borrow().iter().map(|f| f.len()).collect();
        assert_eq!(lens, vec![48, 4, 10, 10]);
        assert_eq!(transport.opcodes(), vec![0x03, 0x04, 0x44, 0x45]);
    }

    #[test]
    fn test_status_overcurrent() {
        let (mut session, transport) = new_session("ATMEGA48@DIP28");

        let mut ok = vec![0u8; 32];
        ok[0] = 0x34;
        ok[1] = 0x12;
        transport.reply(ok);
        assert_eq!(session.get_status().unwrap(), 0x1234);

        let mut fault = vec![0u8; 32];
        fault[9] = 1;
        transport.reply(fault);
        assert!(matches!(session.get_status(), Err(Error::OverCurrent)));
    }

    #[test]
    fn test_chip_id_is_big_endian() {
        let (mut session, transport) = new_session("ATMEGA48@DIP28");
        transport.reply(vec![0, 0, 0x1E, 0x92, 0x05, 0, 0, 0]);

        assert_eq!(session.get_chip_id().unwrap(), (0x1E9205, 3));
        assert_eq!(transport.sent.borrow()[0].len(), 8);
    }

    #[test]
    fn test_short_reply_is_io_error() {
        let (mut session, transport) = new_session("ATMEGA48@DIP28");
        transport.reply(vec![0, 0, 0x1E]);

        let err = session.get_chip_id().unwrap_err();
        assert!(matches!(
            err,
            Error::ShortTransfer {
                expected: 8,
                actual: 3
            }
        ));
        assert!(err.is_io());
    }

    #[test]
    fn test_short_send_is_io_error() {
        let (mut session, mut transport) = new_session("ATMEGA48@DIP28");
        transport.short_send = true;
        *session.transport_mut() = transport;

        assert!(matches!(
            session.protect_on(),
            Err(Error::ShortTransfer {
                expected: 10,
                actual: 9
            })
        ));
    }

    #[test]
    fn test_block_frames() {
        let (mut session, transport) = new_session("ATMEGA48@DIP28");
        transport.reply(vec![0xAA; 0x80]);

        let mut buf = vec![0u8; 0x80];
        session.read_block(CMD_READ_CODE, 0x012345, &mut buf).unwrap();
        session.write_block(CMD_WRITE_CODE, 0x40, &[1, 2, 3]).unwrap();

        let sent = transport.sent.borrow();
        assert_eq!(sent[0].len(), 18);
        assert_eq!(&sent[0][2..7], &[0x80, 0x00, 0x45, 0x23, 0x01]);
        assert_eq!(sent[1].len(), 10);
        assert_eq!(&sent[1][2..10], &[0x03, 0x00, 0x40, 0x00, 0x00, 1, 2, 3]);
        assert_eq!(buf, vec![0xAA; 0x80]);
    }

    #[test]
    fn test_block_address_limit() {
        let (mut session, transport) = new_session("ATMEGA48@DIP28");
        let mut buf = [0u8; 4];
        assert!(matches!(
            session.read_block(CMD_READ_CODE, 0x0100_0000, &mut buf),
            Err(Error::InvalidArgument(_))
        ));
        assert!(transport.sent.borrow().is_empty());
    }

    #[test]
    fn test_prepare_writing_sends_unlock() {
        let (mut session, transport) = new_session("ATMEGA48@DIP28");
        transport.reply(vec![0u8; 10]);
        session.prepare_writing().unwrap();

        let sent = transport.sent.borrow();
        assert_eq!(sent[0].len(), 15);
        assert_eq!(sent[0][0], CMD_PREPARE_WRITING);
        assert_eq!(sent[0][2], session.chip().write_unlock);
    }

    #[test]
    fn test_fuse_write_framing() {
        let (mut session, transport) = new_session("ATMEGA48@DIP28");
        session.write_fuses(0x12, &[0x62, 0xDF, 0xFF]).unwrap();
        session.write_fuses(0x41, &[0x3F]).unwrap();

        let sent = transport.sent.borrow();
        assert_eq!(sent[0].len(), 64);
        assert_eq!(sent[0][0], 0x13);
        assert_eq!(&sent[0][2..10], &[0x01, 0x00, 0xC8, 0x0F, 0x00, 0x62, 0xDF, 0xFF]);
        assert_eq!(sent[1].len(), 10);
        assert_eq!(sent[1][0], 0x40);
        assert_eq!(sent[1][7], 0x3F);
        drop(sent);

        assert!(matches!(
            session.write_fuses(0x22, &[0]),
            Err(Error::UnsupportedFuseOpcode(0x22))
        ));
        assert_eq!(transport.sent.borrow().len(), 2);
    }

    #[test]
    fn test_fuse_read_frame() {
        let (mut session, transport) = new_session("PIC16F84A@DIP18");
        transport.reply(vec![0, 0, 0, 0, 0, 0, 0, 0xAB, 0xCD, 0xEF, 0x01]);

        let mut buf = [0u8; 4];
        session.read_fuses(0x12, &mut buf).unwrap();
        assert_eq!(buf, [0xAB, 0xCD, 0xEF, 0x01]);

        let sent = transport.sent.borrow();
        assert_eq!(sent[0].len(), 18);
        assert_eq!(sent[0][2], 2);
        assert_eq!(sent[0][5], 0x10);
    }

    #[test]
    fn test_transaction_finish_and_drop() {
        let (mut session, transport) = new_session("ATMEGA48@DIP28");

        let tx = session.begin().unwrap();
        tx.finish().unwrap();
        assert_eq!(transport.opcodes(), vec![0x03, 0x04]);

        let result: Result<()> = (|| {
            let mut tx = session.begin()?;
            tx.get_status()?;
            tx.finish()
        })();
        assert!(result.is_err());
        assert_eq!(transport.opcodes(), vec![0x03, 0x04, 0x03, 0xFE, 0x04]);
    }

    #[test]
    fn test_system_info() {
        let transport = ScriptedTransport::default();
        let mut reply = vec![0u8; 40];
        reply[1] = 1;
        reply[4] = 61;
        reply[5] = 2;
        reply[6] = 2;
        reply[39] = 3;
        transport.reply(reply);

        let info = query_system_info(&mut transport.clone()).unwrap();
        assert_eq!(info.model, Model::Tl866Cs);
        assert_eq!(info.firmware, 0x023D);
        assert_eq!(info.firmware_str, "03.2.61");
        assert!(!info.firmware_too_old());
        assert_eq!(transport.sent.borrow()[0], vec![0u8; 5]);

        let mut bad = vec![0u8; 40];
        bad[1] = 7;
        transport.reply(bad);
        assert!(matches!(
            query_system_info(&mut transport.clone()),
            Err(Error::InvalidResponse(_))
        ));
    }
}
