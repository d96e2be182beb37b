//! A Rust cross-platform userspace driver core for the DXO One USB
//! camera.
//!
//! The crate owns a single camera bound to one USB handle: it performs
//! the bring-up handshake, frames and exchanges JSON-RPC requests and
//! responses, and demultiplexes the live-view byte stream into discrete
//! JPEG frames. It exposes operations and a read-only state snapshot;
//! sequencing calls across multiple cameras, persisting nicknames, and
//! presenting settings to a user interface are left to the caller.
//!
//! This library uses the [nusb] library, which wraps the host's native
//! USB stack, so it works cross-platform without a kernel driver beyond
//! the OS's generic USB support.
//!
//! [nusb]: https://github.com/kevinmehall/nusb
//!
//! ## Example
//!
//! ```no_run
//! use dxo_one_core::device::CameraDevice;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let camera = CameraDevice::open()?;
//!     camera.initialize().await?;
//!
//!     let photo = camera.take_photo().await?;
//!     println!("photo response: {photo:?}");
//!
//!     camera.close().await;
//!     Ok(())
//! }
//! ```

/// Wire constants: handshake signatures, RPC header/trailer, JPEG
/// markers, and JSON-RPC method names.
pub mod consts;

/// Crate-specific error enum.
pub mod error;

/// Thin wrapper over the USB bulk-in/bulk-out endpoint pair.
pub mod transport;

/// Intercepts and acknowledges the out-of-band init-handshake signature
/// on every inbound read.
pub mod handshake;

/// Frames outbound JSON-RPC requests and parses length-prefixed inbound
/// responses, including the camera's re-entrant flush interrupt.
pub mod rpc;

/// Demultiplexes the live-view byte stream into discrete JPEG frames.
pub mod jpeg;

/// The camera device state machine and public API.
pub mod device;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{CamError, CamResult};
