//! In-memory [`Port`] used by unit tests to exercise the handshake
//! filter, RPC codec, and JPEG reassembler without real USB hardware.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    error::{CamError, CamResult},
    transport::Port,
};

/// A scripted port: `recv` yields the next packet from a fixed queue
/// (erroring once exhausted), `send` appends to an outbound log the
/// test can inspect afterward.
pub struct MockPort {
    inbound: Mutex<std::collections::VecDeque<Vec<u8>>>,
    outbound: Mutex<Vec<Vec<u8>>>,
}

impl MockPort {
    pub fn new(inbound: Vec<Vec<u8>>) -> Self {
        Self {
            inbound: Mutex::new(inbound.into()),
            outbound: Mutex::new(Vec::new()),
        }
    }

    pub async fn sent(&self) -> Vec<Vec<u8>> {
        self.outbound.lock().await.clone()
    }
}

#[async_trait]
impl Port for MockPort {
    async fn send(&self, bytes: Vec<u8>) -> CamResult<()> {
        self.outbound.lock().await.push(bytes);
        Ok(())
    }

    async fn recv(&self, _max_len: usize) -> CamResult<Vec<u8>> {
        self.inbound
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| CamError::ProtocolViolation("mock port exhausted".into()))
    }
}
