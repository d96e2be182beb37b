/// Crate-specific error enum.
/// Every function interacting with the camera returns a Result enum with this error type.
#[derive(thiserror::Error, Debug)]
pub enum CamError {
    #[error("Error while transfering USB data")]
    UsbTransfer(#[from] nusb::transfer::TransferError),

    #[error("Timeout occured during I/O operation")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Operation attempted on a device that is not connected")]
    NotConnected,

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Unable to decode JSON-RPC payload")]
    ParseFailure(#[source] serde_json::Error),

    #[error("Unable to initialize connection to {device}: {source}")]
    InitFailure {
        device: String,
        #[source]
        source: Box<CamError>,
    },

    #[error("Couldn't find a device with given VID/PID: {vid:#06X}:{pid:#06X}")]
    NoDeviceFound { vid: u16, pid: u16 },
}

pub type CamResult<T> = Result<T, CamError>;
