use bytes::{BufMut, BytesMut};
use log::*;
use serde_json::Value;

use crate::{
    consts::{
        FLUSH_FORCED_METHOD, INIT_RESPONSE, PACKET_SIZE, RPC_HEADER_MAGIC, RPC_HEADER_TRAILER,
        SIGNATURE_LEN,
    },
    error::{CamError, CamResult},
    handshake::{is_init_signature, HandshakeFilter},
    transport::Port,
};

/// An outbound JSON-RPC 2.0 request, framed with the camera's custom
/// wire header.
pub struct RpcRequest {
    pub method: String,
    pub params: Option<Value>,
    pub seq: u32,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>, seq: u32) -> Self {
        Self {
            method: method.into(),
            params,
            seq,
        }
    }

    /// Serializes the JSON-RPC body (field order fixed to match the
    /// wire format exactly: `jsonrpc`, `id`, `method`, optional
    /// `params`).
    fn json_body(&self) -> CamResult<String> {
        let method_json = serde_json::to_string(&self.method).map_err(CamError::ParseFailure)?;

        let mut body = format!(r#"{{"jsonrpc":"2.0","id":{},"method":{}"#, self.seq, method_json);

        if let Some(params) = &self.params {
            let params_json = serde_json::to_string(params).map_err(CamError::ParseFailure)?;
            body.push_str(r#","params":"#);
            body.push_str(&params_json);
        }

        body.push('}');

        Ok(body)
    }

    /// Frames the request onto the wire: fixed header, little-endian
    /// length of the NUL-terminated payload, fixed trailer, then the
    /// UTF-8 JSON payload with a trailing NUL.
    pub fn encode(&self) -> CamResult<Vec<u8>> {
        let mut payload = self.json_body()?.into_bytes();
        payload.push(0);

        let len = payload.len() as u16;

        let mut frame = Vec::with_capacity(
            RPC_HEADER_MAGIC.len() + 2 + RPC_HEADER_TRAILER.len() + payload.len(),
        );
        frame.extend_from_slice(&RPC_HEADER_MAGIC);
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&RPC_HEADER_TRAILER);
        frame.extend_from_slice(&payload);

        Ok(frame)
    }
}

/// Sends a single framed RPC request. An ack of the init-response
/// signature is emitted immediately before the request itself — the
/// camera uses this as a start-of-command marker.
pub async fn transfer_out_rpc<P: Port>(port: &P, request: &RpcRequest) -> CamResult<()> {
    port.send(INIT_RESPONSE.to_vec()).await?;
    port.send(request.encode()?).await
}

/// Reads and decodes one RPC response, transparently discarding any
/// number of `dxo_usb_flush_forced` camera-initiated interrupts first.
pub async fn transfer_in_rpc<P: Port>(port: &P) -> CamResult<Option<Value>> {
    loop {
        let Some(value) = read_one_response(port).await? else {
            return Ok(None);
        };

        if value.get("method").and_then(Value::as_str) == Some(FLUSH_FORCED_METHOD) {
            debug!("transfer_in_rpc: discarding flush-forced message, reading next response");
            continue;
        }

        return Ok(Some(value));
    }
}

/// Reads one length-prefixed RPC response. Bytes 8–9 of the first
/// packet give the declared payload length in little-endian; `0` means
/// no response. Subsequent packets needed to fill the buffer are read
/// directly, bypassing the handshake filter's normal transparent-retry
/// behavior: if one of them is the init signature, it is acked and
/// reassembly terminates early, leaving a truncated buffer whose JSON
/// decode is expected to fail.
async fn read_one_response<P: Port>(port: &P) -> CamResult<Option<Value>> {
    let filter = HandshakeFilter::new(port);
    let first = filter.read().await?;

    if first.len() < 10 {
        return Err(CamError::ProtocolViolation(
            "RPC response packet too short for length prefix".into(),
        ));
    }

    let len = u16::from_le_bytes([first[8], first[9]]) as usize;

    if len == 0 {
        return Ok(None);
    }

    let mut buf = BytesMut::with_capacity(len);

    if first.len() > SIGNATURE_LEN {
        let take = (first.len() - SIGNATURE_LEN).min(len);
        buf.put_slice(&first[SIGNATURE_LEN..SIGNATURE_LEN + take]);
    }

    while buf.len() < len {
        let packet = port.recv(PACKET_SIZE).await?;

        if is_init_signature(&packet) {
            debug!("read_one_response: init signature mid-reassembly, acking and terminating");
            port.send(INIT_RESPONSE.to_vec()).await?;
            break;
        }

        let remaining = len - buf.len();
        if packet.len() > remaining {
            return Ok(None);
        }

        buf.put_slice(&packet);
    }

    decode_payload(&buf.freeze())
}

/// Strips NUL bytes, trims whitespace, and decodes as JSON. Parse
/// failure (including a truncated buffer from early termination above)
/// is not an error — flush/noise on this channel is common — so it
/// becomes `Ok(None)`.
fn decode_payload(buf: &[u8]) -> CamResult<Option<Value>> {
    let cleaned: Vec<u8> = buf.iter().copied().filter(|&b| b != 0).collect();
    let text = String::from_utf8_lossy(&cleaned);
    let trimmed = text.trim();

    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            debug!("read_one_response: JSON parse failure, treating as no response: {e}");
            Ok(None)
        }
    }
}

/// Frames a complete response packet for test fixtures: 32-byte
/// header/length prefix (bytes 8–9 carry the little-endian length)
/// followed by the raw payload, padded/truncated to fit one packet.
#[cfg(test)]
fn frame_response_packet(payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0u8; SIGNATURE_LEN];
    let len = payload.len() as u16;
    packet[8] = (len & 0xFF) as u8;
    packet[9] = (len >> 8) as u8;
    packet.extend_from_slice(payload);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPort;
    use serde_json::json;

    #[test]
    fn encodes_request_header_and_length() {
        let req = RpcRequest::new(crate::consts::method::PHOTO_TAKE, None, 7);
        let frame = req.encode().unwrap();

        assert_eq!(&frame[0..8], &RPC_HEADER_MAGIC);

        let expected_body = r#"{"jsonrpc":"2.0","id":7,"method":"dxo_photo_take"}"#;
        let expected_len = expected_body.len() + 1; // trailing NUL

        assert_eq!(frame[8] as usize | ((frame[9] as usize) << 8), expected_len);
        assert_eq!(&frame[10..32], &RPC_HEADER_TRAILER);
        assert_eq!(&frame[32..32 + expected_body.len()], expected_body.as_bytes());
        assert_eq!(frame[32 + expected_body.len()], 0);
    }

    #[test]
    fn encodes_request_with_params() {
        let req = RpcRequest::new("dxo_camera_mode_switch", Some(json!({"param": "view"})), 3);
        let frame = req.encode().unwrap();
        let len = frame[8] as usize | ((frame[9] as usize) << 8);
        let payload = &frame[32..32 + len - 1];

        let value: Value = serde_json::from_slice(payload).unwrap();
        assert_eq!(value["method"], "dxo_camera_mode_switch");
        assert_eq!(value["params"]["param"], "view");
        assert_eq!(value["id"], 3);
    }

    #[test]
    fn decode_payload_strips_nul_and_whitespace() {
        let mut buf = br#"  {"id":3,"result":{"ok":true}}  "#.to_vec();
        buf.push(0);

        let value = decode_payload(&buf).unwrap().unwrap();
        assert_eq!(value["result"]["ok"], true);
    }

    #[test]
    fn decode_payload_malformed_json_returns_none_not_error() {
        let buf = b"not json at all".to_vec();
        assert!(decode_payload(&buf).unwrap().is_none());
    }

    /// Flush re-entry: the first response parses as a
    /// `dxo_usb_flush_forced` interrupt, the second as the real answer.
    /// `transfer_in_rpc` must return the second object.
    #[tokio::test]
    async fn transfer_in_rpc_discards_flush_forced_and_returns_next() {
        let flush = br#"{"method":"dxo_usb_flush_forced"}"#.to_vec();
        let real = br#"{"id":3,"result":{"ok":true}}"#.to_vec();

        let port = MockPort::new(vec![frame_response_packet(&flush), frame_response_packet(&real)]);

        let value = transfer_in_rpc(&port).await.unwrap().unwrap();
        assert_eq!(value["result"]["ok"], true);
    }

    #[tokio::test]
    async fn transfer_in_rpc_zero_length_is_none() {
        let packet = vec![0u8; SIGNATURE_LEN]; // bytes 8-9 already zero
        let port = MockPort::new(vec![packet]);

        assert!(transfer_in_rpc(&port).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transfer_in_rpc_spanning_two_packets_decodes_correctly() {
        let payload = br#"{"id":1,"result":{"battery":42}}"#.to_vec();

        let mut first = vec![0u8; SIGNATURE_LEN];
        let len = payload.len() as u16;
        first[8] = (len & 0xFF) as u8;
        first[9] = (len >> 8) as u8;

        let split = payload.len() / 2;
        first.extend_from_slice(&payload[..split]);
        let second = payload[split..].to_vec();

        let port = MockPort::new(vec![first, second]);

        let value = transfer_in_rpc(&port).await.unwrap().unwrap();
        assert_eq!(value["result"]["battery"], 42);
    }

    /// An init signature arriving mid-reassembly acks and terminates
    /// early, leaving a truncated buffer whose decode fails — the whole
    /// response becomes `None`, not an error.
    #[tokio::test]
    async fn init_signature_mid_reassembly_truncates_to_none() {
        use crate::consts::INIT_SIGNATURE;

        let payload = br#"{"id":1,"result":{"battery":42}}"#.to_vec();

        let mut first = vec![0u8; SIGNATURE_LEN];
        let len = payload.len() as u16;
        first[8] = (len & 0xFF) as u8;
        first[9] = (len >> 8) as u8;
        first.extend_from_slice(&payload[..5]);

        let port = MockPort::new(vec![first, INIT_SIGNATURE.to_vec()]);

        let value = transfer_in_rpc(&port).await.unwrap();
        assert!(value.is_none());

        let sent = port.sent().await;
        assert!(sent.contains(&INIT_RESPONSE.to_vec()));
    }
}
