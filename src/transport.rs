use async_trait::async_trait;
use log::*;

use crate::{
    consts::PACKET_SIZE,
    error::{CamError, CamResult},
};

/// The raw byte-pump contract the handshake filter and RPC/JPEG codecs
/// are built against. [`Transport`] is the real USB implementation;
/// tests substitute a canned in-memory port so the framing and
/// reassembly logic can be exercised without hardware.
#[async_trait]
pub trait Port: Send + Sync {
    async fn send(&self, bytes: Vec<u8>) -> CamResult<()>;

    /// Receives a single transfer of at most `max_len` bytes.
    async fn recv(&self, max_len: usize) -> CamResult<Vec<u8>>;
}

/// Thin wrapper over the camera's USB bulk-in/bulk-out endpoint pair.
///
/// Performs no buffering and no reassembly: `recv` returns exactly what
/// the bulk endpoint delivered in a single transfer, up to
/// [`PACKET_SIZE`]. Both operations fail with [`CamError::NotConnected`]
/// if the interface has not been claimed (or has been closed).
pub struct Transport {
    interface: Option<nusb::Interface>,
    /// Interface 1, reserved by the device and never read from or
    /// written to. Claimed alongside interface 0 and held for the
    /// device's whole lifetime — dropping it early would release it
    /// back to the host.
    _reserved_interface: Option<nusb::Interface>,
    in_addr: u8,
    out_addr: u8,
}

impl Transport {
    pub fn new(
        interface: nusb::Interface,
        reserved_interface: nusb::Interface,
        in_addr: u8,
        out_addr: u8,
    ) -> Self {
        Self {
            interface: Some(interface),
            _reserved_interface: Some(reserved_interface),
            in_addr,
            out_addr,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.interface.is_some()
    }

    /// Drops the underlying interfaces, closing the USB handle. Errors
    /// during close are the caller's to log; this never fails.
    pub fn disconnect(&mut self) {
        self.interface = None;
        self._reserved_interface = None;
    }
}

#[async_trait]
impl Port for Transport {
    async fn send(&self, bytes: Vec<u8>) -> CamResult<()> {
        let interface = self.interface.as_ref().ok_or(CamError::NotConnected)?;

        interface
            .bulk_out(self.out_addr, bytes)
            .await
            .into_result()?;

        Ok(())
    }

    async fn recv(&self, max_len: usize) -> CamResult<Vec<u8>> {
        let interface = self.interface.as_ref().ok_or(CamError::NotConnected)?;

        let req_buf = nusb::transfer::RequestBuffer::new(max_len.min(PACKET_SIZE));

        let buf = interface
            .bulk_in(self.in_addr, req_buf)
            .await
            .into_result()?;

        trace!("transport recv: {} bytes", buf.len());

        Ok(buf)
    }
}
