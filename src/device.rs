//! The camera device state machine: the public surface this crate
//! exposes to an orchestrator (out of scope here — see crate docs).
//!
//! `CameraDevice<P>` is generic over its [`Port`] so tests can drive the
//! whole state machine against [`crate::testing::MockPort`] instead of
//! real hardware; production code uses [`Transport`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;

use log::*;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::{
    consts::{self, method, DEFAULT_PID, DEFAULT_VID},
    error::{CamError, CamResult},
    handshake::HandshakeFilter,
    jpeg::JpegReassembler,
    rpc::{self, RpcRequest},
    transport::{Port, Transport},
};

/// Connection/initialization state. `Errored` may only transition back
/// to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Fresh,
    Opening,
    Draining,
    Ready,
    LiveView,
    Closed,
    Errored,
}

/// Read-only view of a device's current state, returned by
/// [`CameraDevice::get_state`]. Constructed on demand; never cached.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub id: String,
    pub nickname: Option<String>,
    pub serial: Option<String>,
    pub is_connected: bool,
    pub is_live_view_active: bool,
    pub battery_level: Option<u8>,
    pub last_error: Option<String>,
}

impl StateSnapshot {
    /// Pure function of (nickname, serial, id). Prefers
    /// the nickname; falls back to `"Camera (<last 4 of serial>)"`; falls
    /// back to the bare id.
    pub fn display_name(&self) -> String {
        if let Some(nickname) = &self.nickname {
            return nickname.clone();
        }

        if let Some(serial) = &self.serial {
            let tail_len = serial.len().min(4);
            let tail = &serial[serial.len() - tail_len..];
            return format!("Camera ({tail})");
        }

        self.id.clone()
    }
}

/// Fields touched from outside the command-serializing lock, so that
/// [`CameraDevice::stop_live_view`] and [`CameraDevice::get_state`]
/// never block behind a long-running `start_live_view` call.
struct Shared {
    nickname: Option<String>,
    serial: Option<String>,
    last_error: Option<String>,
    battery: Option<u8>,
}

/// Everything touched only while holding the command lock — this is
/// the command-serialization boundary: one `Inner` access at a time, for the
/// full duration of the public call that acquired it.
struct Inner<P: Port> {
    port: Option<P>,
    state: ConnState,
    seq: u32,
    cached_settings: Option<Value>,
    cached_status: Option<Value>,
}

/// A single camera bound one-to-one to a USB handle (or, in tests, a
/// scripted [`Port`]). See crate docs for the full protocol this drives.
pub struct CameraDevice<P: Port> {
    inner: Mutex<Inner<P>>,
    shared: StdMutex<Shared>,
    connected: AtomicBool,
    live_view_active: AtomicBool,
    should_stop: AtomicBool,
    id: String,
}

impl<P: Port> CameraDevice<P> {
    /// Wraps an already-claimed port. Claiming the USB interfaces is the
    /// "Opening" half of the connection state machine; it happens here
    /// in the constructor, so the device starts out connected but not
    /// yet drained.
    pub fn from_port(port: P, id: String, serial: Option<String>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                port: Some(port),
                state: ConnState::Fresh,
                seq: 0,
                cached_settings: None,
                cached_status: None,
            }),
            shared: StdMutex::new(Shared {
                nickname: None,
                serial,
                last_error: None,
                battery: None,
            }),
            connected: AtomicBool::new(true),
            live_view_active: AtomicBool::new(false),
            should_stop: AtomicBool::new(false),
            id,
        }
    }

    /// Runs the handshake drain and refreshes status, taking the device
    /// from `Fresh`/`Opening` to `Ready`. Any failure is wrapped in
    /// [`CamError::InitFailure`], recorded in the error latch, and
    /// leaves the device disconnected.
    pub async fn initialize(&self) -> CamResult<()> {
        let result = self.initialize_inner().await;

        if let Err(e) = &result {
            self.connected.store(false, Ordering::SeqCst);
            self.shared.lock().unwrap().last_error = Some(e.to_string());
        }

        result
    }

    async fn initialize_inner(&self) -> CamResult<()> {
        let mut inner = self.inner.lock().await;
        inner.state = ConnState::Opening;

        let drain_result = {
            let port = inner.port.as_ref().ok_or(CamError::NotConnected)?;
            inner.state = ConnState::Draining;
            HandshakeFilter::new(port).drain().await
        };

        if let Err(e) = drain_result {
            inner.state = ConnState::Errored;
            return Err(CamError::InitFailure {
                device: self.id.clone(),
                source: Box::new(e),
            });
        }

        inner.state = ConnState::Ready;
        drop(inner);

        // Status-refresh failures during bring-up are logged and
        // swallowed: the device is still considered initialized.
        if let Err(e) = self.get_status().await {
            warn!("initialize: status refresh failed, continuing anyway: {e}");
        }

        info!("camera {} initialized", self.id);
        Ok(())
    }

    /// Sends one RPC request and awaits its response. Requires `Ready`
    /// or `LiveView`; advances the sequence counter exactly once
    /// regardless of outcome.
    pub async fn transfer_out_rpc(&self, method: &str, params: Option<Value>) -> CamResult<Option<Value>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(CamError::NotConnected);
        }

        let mut inner = self.inner.lock().await;

        if !matches!(inner.state, ConnState::Ready | ConnState::LiveView) {
            return Err(CamError::NotConnected);
        }

        let seq = inner.seq;
        inner.seq += 1;

        let port = inner.port.as_ref().ok_or(CamError::NotConnected)?;
        let request = RpcRequest::new(method, params, seq);

        let result = async {
            rpc::transfer_out_rpc(port, &request).await?;
            rpc::transfer_in_rpc(port).await
        }
        .await;

        if let Err(e) = &result {
            inner.state = ConnState::Errored;
            self.shared.lock().unwrap().last_error = Some(e.to_string());
        }

        result
    }

    pub async fn take_photo(&self) -> CamResult<Option<Value>> {
        self.transfer_out_rpc(method::PHOTO_TAKE, None).await
    }

    pub async fn get_all_settings(&self) -> CamResult<Option<Value>> {
        let response = self.transfer_out_rpc(method::ALL_SETTINGS_GET, None).await?;

        if let Some(value) = &response {
            self.inner.lock().await.cached_settings = Some(value.clone());
        }

        Ok(response)
    }

    pub async fn get_status(&self) -> CamResult<Option<Value>> {
        let response = self.transfer_out_rpc(method::CAMERA_STATUS_GET, None).await?;

        if let Some(value) = &response {
            self.inner.lock().await.cached_status = Some(value.clone());

            if let Some(battery) = value.get("result").and_then(|r| r.get("battery")).and_then(Value::as_u64) {
                self.shared.lock().unwrap().battery = Some(battery as u8);
            }
        }

        Ok(response)
    }

    /// Switches the camera to view mode and runs the reassembler loop
    /// until [`CameraDevice::stop_live_view`] is called or `tx` is
    /// dropped. Requires `Ready`; returns to `Ready` on exit.
    pub async fn start_live_view(&self, tx: mpsc::Sender<Vec<u8>>) -> CamResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(CamError::NotConnected);
        }

        let mut inner = self.inner.lock().await;

        if inner.state != ConnState::Ready {
            return Err(CamError::NotConnected);
        }

        let seq = inner.seq;
        inner.seq += 1;
        let params = serde_json::json!({ "param": "view" });
        let request = RpcRequest::new(method::CAMERA_MODE_SWITCH, Some(params), seq);

        let port = inner.port.as_ref().ok_or(CamError::NotConnected)?;
        rpc::transfer_out_rpc(port, &request).await?;
        let _ = rpc::transfer_in_rpc(port).await?;

        inner.state = ConnState::LiveView;
        self.should_stop.store(false, Ordering::Relaxed);
        self.live_view_active.store(true, Ordering::SeqCst);

        let mut reassembler = JpegReassembler::new();
        let port = inner.port.as_ref().ok_or(CamError::NotConnected)?;
        let result = reassembler.run(port, &self.should_stop, tx).await;

        self.live_view_active.store(false, Ordering::SeqCst);
        inner.state = if result.is_ok() { ConnState::Ready } else { ConnState::Errored };

        if let Err(e) = &result {
            self.shared.lock().unwrap().last_error = Some(e.to_string());
        }

        result
    }

    /// Signals the live-view loop to exit at its next iteration.
    /// Never blocks on the command lock, so it is callable while
    /// `start_live_view` is in flight.
    pub fn stop_live_view(&self) {
        self.should_stop.store(true, Ordering::Relaxed);
    }

    /// Stops any live-view loop, drops the underlying port, and marks
    /// the device disconnected. USB close errors are logged, not
    /// raised — there is nothing a caller could usefully do with them.
    pub async fn close(&self) {
        self.should_stop.store(true, Ordering::Relaxed);

        let mut inner = self.inner.lock().await;
        inner.port = None;
        inner.state = ConnState::Closed;

        self.connected.store(false, Ordering::SeqCst);
        self.live_view_active.store(false, Ordering::SeqCst);

        debug!("camera {} closed", self.id);
    }

    /// Builds a read-only snapshot. Reads only the lightweight shared
    /// fields and atomics — never waits on the command lock, so this
    /// stays responsive during an in-flight `start_live_view` call.
    pub fn get_state(&self) -> StateSnapshot {
        let shared = self.shared.lock().unwrap();

        StateSnapshot {
            id: self.id.clone(),
            nickname: shared.nickname.clone(),
            serial: shared.serial.clone(),
            is_connected: self.connected.load(Ordering::SeqCst),
            is_live_view_active: self.live_view_active.load(Ordering::SeqCst),
            battery_level: shared.battery,
            last_error: shared.last_error.clone(),
        }
    }

    /// Sets the display nickname. Persistence across process restarts is
    /// the surrounding orchestrator's responsibility, not this crate's.
    pub fn set_nickname(&self, nickname: Option<String>) {
        self.shared.lock().unwrap().nickname = nickname;
    }

    /// Stable key usable before a nickname is assigned: the serial
    /// number if known, otherwise the device id.
    pub fn serial_or_id(&self) -> String {
        self.shared
            .lock()
            .unwrap()
            .serial
            .clone()
            .unwrap_or_else(|| self.id.clone())
    }
}

impl CameraDevice<Transport> {
    /// Opens the first device matching [`DEFAULT_VID`]/[`DEFAULT_PID`].
    pub fn open() -> CamResult<Self> {
        Self::open_custom(DEFAULT_VID, DEFAULT_PID)
    }

    /// Opens the first device matching `vid`/`pid`: selects config 1,
    /// claims interfaces 0 and 1 (interface 1 is reserved by the device
    /// and otherwise untouched), selects alternate setting 1 on
    /// interface 0, and reads its OUT/IN bulk endpoint addresses from
    /// the descriptor.
    pub fn open_custom(vid: u16, pid: u16) -> CamResult<Self> {
        let dev_info = nusb::list_devices()?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(CamError::NoDeviceFound { vid, pid })?;

        let serial = dev_info.serial_number().map(str::to_string);
        let device = dev_info.open()?;
        device.set_configuration(1)?;

        let interface = device.claim_interface(0)?;
        let reserved_interface = device.claim_interface(1)?;

        interface.set_alt_setting(1)?;

        let alt_descriptor = interface
            .descriptors()
            .find(|d| d.alternate_setting() == 1)
            .ok_or_else(|| CamError::ProtocolViolation("interface 0 has no alternate setting 1".into()))?;

        let mut endpoints = alt_descriptor.endpoints();
        let out_addr = endpoints
            .next()
            .ok_or_else(|| CamError::ProtocolViolation("alternate setting 1 has no OUT endpoint".into()))?
            .address();
        let in_addr = endpoints
            .next()
            .ok_or_else(|| CamError::ProtocolViolation("alternate setting 1 has no IN endpoint".into()))?
            .address();

        let id = serial.clone().unwrap_or_else(|| format!("{vid:04x}:{pid:04x}"));
        let transport = Transport::new(interface, reserved_interface, in_addr, out_addr);

        Ok(Self::from_port(transport, id, serial))
    }
}

/// Re-exported so callers needn't import `consts` separately for method
/// name constants when building custom `transfer_out_rpc` calls.
pub use consts::method as rpc_method;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{INIT_SIGNATURE, SIGNATURE_LEN};
    use crate::testing::MockPort;

    fn frame_response(payload: &[u8]) -> Vec<u8> {
        let mut packet = vec![0u8; SIGNATURE_LEN];
        let len = payload.len() as u16;
        packet[8] = (len & 0xFF) as u8;
        packet[9] = (len >> 8) as u8;
        packet.extend_from_slice(payload);
        packet
    }

    /// Nickname wins; otherwise the last four characters of the serial;
    /// otherwise the bare id.
    #[test]
    fn display_name_prefers_nickname_then_serial_tail_then_id() {
        let snap = StateSnapshot {
            id: "0002:2ec1".into(),
            nickname: Some("X".into()),
            serial: Some("ABC12345".into()),
            is_connected: true,
            is_live_view_active: false,
            battery_level: None,
            last_error: None,
        };
        assert_eq!(snap.display_name(), "X");

        let snap = StateSnapshot { nickname: None, ..snap };
        assert_eq!(snap.display_name(), "Camera (2345)");

        let snap = StateSnapshot { serial: None, ..snap };
        assert_eq!(snap.display_name(), "0002:2ec1");
    }

    /// S1 plus Ready transition: initializing against a port that
    /// immediately yields the init signature reaches `Ready` and leaves
    /// the device connected.
    #[tokio::test]
    async fn initialize_reaches_ready_after_drain() {
        let status_response = frame_response(br#"{"id":0,"result":{"battery":77}}"#);
        let port = MockPort::new(vec![INIT_SIGNATURE.to_vec(), status_response]);
        let device = CameraDevice::from_port(port, "test-device".into(), Some("SN00001234".into()));

        device.initialize().await.unwrap();

        let state = device.get_state();
        assert!(state.is_connected);
        assert_eq!(state.battery_level, Some(77));
        assert!(state.last_error.is_none());
    }

    /// Sequence counter advances exactly once per `transfer_out_rpc`
    /// call. `initialize`'s own status refresh consumes the first
    /// scripted response, so a single `take_photo` after it consumes the
    /// second and leaves the mock port exhausted.
    #[tokio::test]
    async fn sequence_counter_advances_once_per_call() {
        let drain = vec![0u8; 4]; // short packet: drain ends immediately
        let status = frame_response(br#"{"id":0,"result":{}}"#);
        let photo = frame_response(br#"{"id":1,"result":{}}"#);
        let port = MockPort::new(vec![drain, status, photo]);
        let device = CameraDevice::from_port(port, "dev".into(), None);

        device.initialize().await.unwrap(); // consumes `status`
        device.take_photo().await.unwrap(); // consumes `photo`

        let err = device.take_photo().await.unwrap_err();
        assert!(!matches!(err, CamError::NotConnected)); // mock port exhausted, not a state error
    }

    /// After `close()`, any subsequent operation fails with
    /// `NotConnected`.
    #[tokio::test]
    async fn operations_fail_with_not_connected_after_close() {
        let drain = vec![0u8; 4];
        let port = MockPort::new(vec![drain]);
        let device = CameraDevice::from_port(port, "dev".into(), None);

        device.initialize().await.unwrap();
        device.close().await;

        let err = device.take_photo().await.unwrap_err();
        assert!(matches!(err, CamError::NotConnected));

        let state = device.get_state();
        assert!(!state.is_connected);
    }

    /// `stop_live_view` is callable without waiting on an in-flight
    /// `start_live_view`'s command lock.
    #[tokio::test]
    async fn stop_live_view_sets_flag_independently_of_command_lock() {
        let drain = vec![0u8; 4];
        let port = MockPort::new(vec![drain]);
        let device = CameraDevice::from_port(port, "dev".into(), None);
        device.initialize().await.unwrap();

        // No live view running yet, but the call must not deadlock or
        // require the command lock.
        device.stop_live_view();
        assert!(!device.get_state().is_live_view_active);
    }

    #[tokio::test]
    async fn transfer_out_rpc_requires_ready_state() {
        let port = MockPort::new(vec![]);
        let device = CameraDevice::from_port(port, "dev".into(), None);

        // Never initialized: state is Fresh, not Ready/LiveView.
        let err = device.transfer_out_rpc(method::PHOTO_TAKE, None).await.unwrap_err();
        assert!(matches!(err, CamError::NotConnected));
    }

    #[test]
    fn get_all_settings_and_status_use_distinct_methods() {
        assert_ne!(method::ALL_SETTINGS_GET, method::CAMERA_STATUS_GET);
    }
}
