use std::time::Duration;

/// USB packet size for this device's bulk endpoints. `Transport::recv`
/// never requests more than this in a single transfer.
pub const PACKET_SIZE: usize = 512;

/// Length in bytes of every fixed handshake/RPC-header signature.
pub const SIGNATURE_LEN: usize = 32;

/// Initial accumulator capacity for the live-view reassembler. Far
/// larger than a naive per-declared-length allocation so the common
/// case needs no reallocation.
pub const JPEG_ACCUMULATOR_INITIAL_CAPACITY: usize = 64 * 1024;

/// Timeout applied to reads during `initialize`'s handshake drain.
pub const DRAIN_READ_TIMEOUT: Duration = Duration::from_millis(1000);

pub const DEFAULT_VID: u16 = 0x2ec1;
pub const DEFAULT_PID: u16 = 0x0002;

/// Camera-injected init signature: marks the out-of-band handshake the
/// camera can send at any point between packets on the IN endpoint.
pub const INIT_SIGNATURE: [u8; SIGNATURE_LEN] = [
    0xA3, 0xBA, 0xD1, 0x10, 0xAB, 0xCD, 0xAB, 0xCD, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// The driver's reply to `INIT_SIGNATURE`.
pub const INIT_RESPONSE: [u8; SIGNATURE_LEN] = [
    0xA3, 0xBA, 0xD1, 0x10, 0xDC, 0xBA, 0xDC, 0xBA, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Fixed 8-byte header every outbound RPC frame begins with.
pub const RPC_HEADER_MAGIC: [u8; 8] = [0xA3, 0xBA, 0xD1, 0x10, 0x17, 0x08, 0x00, 0x0C];

/// 22-byte trailer that follows the header and the little-endian length
/// prefix, before the JSON payload.
pub const RPC_HEADER_TRAILER: [u8; 22] = [
    0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Byte marker identifying a JPEG live-view metadata header at the
/// start of a packet.
pub const JPEG_METADATA_MARKER: [u8; 4] = [0xA3, 0xBA, 0xD1, 0x10];

/// JPEG Start-of-Image boundary the reassembler searches for.
pub const JPEG_SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// JPEG End-of-Image marker.
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Camera-initiated RPC method that must be transparently discarded by
/// the response reader (see `rpc::transfer_in_rpc`).
pub const FLUSH_FORCED_METHOD: &str = "dxo_usb_flush_forced";

/// RPC method name constants.
pub mod method {
    pub const PHOTO_TAKE: &str = "dxo_photo_take";
    pub const ALL_SETTINGS_GET: &str = "dxo_all_settings_get";
    pub const CAMERA_STATUS_GET: &str = "dxo_camera_status_get";
    pub const CAMERA_MODE_SWITCH: &str = "dxo_camera_mode_switch";
}
