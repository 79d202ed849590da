//! TL866 device implementation
//!
//! This module provides the `Tl866` struct, which owns the bulk endpoints of
//! an opened programmer and implements the core `Transport` trait on top of
//! blocking `nusb` transfers.

use minipro_core::error::Result as CoreResult;
use minipro_core::programmer::Transport;
use nusb::transfer::{Buffer, Bulk, In, Out};
use nusb::{Endpoint, MaybeFuture};

use crate::error::{Result, Tl866Error};
use crate::protocol::*;

/// TL866 USB programmer
///
/// The device is released when the value is dropped.
pub struct Tl866 {
    /// Bulk OUT endpoint for commands
    out_ep: Endpoint<Bulk, Out>,
    /// Bulk IN endpoint for replies
    in_ep: Endpoint<Bulk, In>,
}

impl Tl866 {
    /// Open the first TL866 (VID:04d8 PID:e11c)
    pub fn open() -> Result<Self> {
        Self::open_with_ids(TL866_USB_VENDOR, TL866_USB_PRODUCT)
    }

    /// Open the first device with the given USB IDs
    pub fn open_with_ids(vendor_id: u16, product_id: u16) -> Result<Self> {
        let device_info = nusb::list_devices()
            .wait()
            .map_err(|e| Tl866Error::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vendor_id && d.product_id() == product_id)
            .ok_or(Tl866Error::DeviceNotFound {
                vendor_id,
                product_id,
            })?;

        log::info!(
            "Opening TL866 device at bus {} address {}",
            device_info.busnum(),
            device_info.device_address()
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| Tl866Error::OpenFailed(e.to_string()))?;

        let interface = device
            .claim_interface(INTERFACE)
            .wait()
            .map_err(|e| Tl866Error::ClaimFailed(e.to_string()))?;

        let out_ep = interface
            .endpoint::<Bulk, Out>(WRITE_EP)
            .map_err(|e| Tl866Error::ClaimFailed(e.to_string()))?;
        let in_ep = interface
            .endpoint::<Bulk, In>(READ_EP)
            .map_err(|e| Tl866Error::ClaimFailed(e.to_string()))?;

        Ok(Self { out_ep, in_ep })
    }

    /// List all connected TL866 devices
    pub fn list_devices() -> Result<Vec<Tl866DeviceInfo>> {
        let devices = nusb::list_devices()
            .wait()
            .map_err(|e| Tl866Error::OpenFailed(e.to_string()))?
            .filter(|d| d.vendor_id() == TL866_USB_VENDOR && d.product_id() == TL866_USB_PRODUCT)
            .map(|d| Tl866DeviceInfo {
                bus: d.busnum(),
                address: d.device_address(),
            })
            .collect();

        Ok(devices)
    }

    /// Send one bulk OUT transfer
    fn bulk_write(&mut self, data: &[u8]) -> Result<usize> {
        let mut buf = Buffer::new(data.len());
        buf.extend_from_slice(data);

        let completion = self.out_ep.transfer_blocking(buf, TRANSFER_TIMEOUT);
        let written = completion.actual_len;
        completion
            .status
            .map_err(|e| Tl866Error::TransferFailed(e.to_string()))?;

        log::trace!("USB write {} of {} bytes", written, data.len());
        Ok(written)
    }

    /// Receive one bulk IN transfer
    fn bulk_read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let max_packet_size = self.in_ep.max_packet_size();
        // Request length must be multiple of max packet size
        let request_len = buffer.len().div_ceil(max_packet_size) * max_packet_size;
        let mut in_buf = Buffer::new(request_len);
        in_buf.set_requested_len(request_len);

        let completion = self.in_ep.transfer_blocking(in_buf, TRANSFER_TIMEOUT);
        let data = completion
            .into_result()
            .map_err(|e| Tl866Error::TransferFailed(e.to_string()))?;

        let received = std::cmp::min(data.len(), buffer.len());
        buffer[..received].copy_from_slice(&data[..received]);

        log::trace!("USB read {} bytes", received);
        Ok(received)
    }
}

impl Transport for Tl866 {
    fn send(&mut self, data: &[u8]) -> CoreResult<usize> {
        self.bulk_write(data).map_err(Into::into)
    }

    fn recv(&mut self, buf: &mut [u8]) -> CoreResult<usize> {
        self.bulk_read(buf).map_err(Into::into)
    }
}

/// Information about a connected TL866 device
#[derive(Debug, Clone)]
pub struct Tl866DeviceInfo {
    /// USB bus number
    pub bus: u8,
    /// USB device address
    pub address: u8,
}

impl std::fmt::Display for Tl866DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TL866 at bus {} address {}", self.bus, self.address)
    }
}
