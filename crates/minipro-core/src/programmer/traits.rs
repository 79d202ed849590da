//! Programmer trait definitions

use crate::error::Result;
use bitflags::bitflags;

bitflags! {
    /// In-circuit programming flags
    ///
    /// Sent as header byte 11 of every chip-level command.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IcspFlags: u8 {
        /// Program the chip through the ICSP header instead of the socket
        const ENABLE = 0x80;
        /// Supply VCC to the target over the ICSP header
        const VCC    = 0x01;
    }
}

impl Default for IcspFlags {
    fn default() -> Self {
        IcspFlags::empty()
    }
}

/// Byte transport to the programmer
///
/// One call moves one bulk transfer. Implementations report the number of
/// bytes actually moved; checking that count against what the command needs
/// is the session's job.
///
/// ## Example
///
/// ```ignore
/// impl Transport for Tl866 {
///     fn send(&mut self, data: &[u8]) -> Result<usize> {
///         self.bulk_out(data).map_err(Into::into)
///     }
///
///     fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
///         self.bulk_in(buf).map_err(Into::into)
///     }
/// }
/// ```
pub trait Transport {
    /// Send `data` in one bulk OUT transfer, returning the bytes transferred
    fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// Receive one bulk IN transfer into `buf`, returning the bytes received
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, data: &[u8]) -> Result<usize> {
        (**self).send(data)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).recv(buf)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, data: &[u8]) -> Result<usize> {
        (**self).send(data)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).recv(buf)
    }
}
