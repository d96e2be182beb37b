use log::*;

use crate::{
    consts::{DRAIN_READ_TIMEOUT, INIT_RESPONSE, INIT_SIGNATURE, PACKET_SIZE, SIGNATURE_LEN},
    error::CamResult,
    transport::Port,
};

/// Returns `true` if `packet`'s first [`SIGNATURE_LEN`] bytes equal the
/// camera's init-handshake signature.
pub(crate) fn is_init_signature(packet: &[u8]) -> bool {
    packet.len() >= SIGNATURE_LEN && packet[..SIGNATURE_LEN] == INIT_SIGNATURE
}

/// Pure wrapper around [`Port::recv`] that intercepts and acknowledges
/// the camera's out-of-band init signature, which can be injected
/// between packets at any time on either the RPC or the live-view read
/// path.
pub struct HandshakeFilter<'a, P: Port> {
    port: &'a P,
}

impl<'a, P: Port> HandshakeFilter<'a, P> {
    pub fn new(port: &'a P) -> Self {
        Self { port }
    }

    /// Returns the next inbound packet that is not the init signature.
    /// If the signature is observed, the response is emitted
    /// out-of-band and the read is retried transparently.
    pub async fn read(&self) -> CamResult<Vec<u8>> {
        loop {
            let packet = self.port.recv(PACKET_SIZE).await?;

            if is_init_signature(&packet) {
                debug!("handshake filter: observed init signature, acking");
                self.port.send(INIT_RESPONSE.to_vec()).await?;
                continue;
            }

            return Ok(packet);
        }
    }

    /// Drains the init handshake immediately after claiming the
    /// interfaces: emit the response signature unprompted, then read
    /// until either the init signature arrives (ack once, done) or an
    /// empty/short packet indicates the queue is drained.
    ///
    /// Each read is bounded by [`DRAIN_READ_TIMEOUT`]; an elapsed
    /// timeout surfaces as an ordinary [`crate::error::CamError::Timeout`]
    /// rather than being swallowed.
    pub async fn drain(&self) -> CamResult<()> {
        debug!("handshake drain: sending unprompted init response");
        self.port.send(INIT_RESPONSE.to_vec()).await?;

        loop {
            let packet = tokio::time::timeout(DRAIN_READ_TIMEOUT, self.port.recv(PACKET_SIZE)).await??;

            if is_init_signature(&packet) {
                debug!("handshake drain: observed init signature, acking and exiting");
                self.port.send(INIT_RESPONSE.to_vec()).await?;
                return Ok(());
            }

            if packet.len() < SIGNATURE_LEN {
                debug!("handshake drain: short packet ({} bytes), queue drained", packet.len());
                return Ok(());
            }
        }
    }
}
