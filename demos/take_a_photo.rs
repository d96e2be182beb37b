use std::{fs::File, io::Write};

use dxo_one_core::device::CameraDevice;

#[tokio::main]
/// Takes a photo and saves the raw RPC response. The actual JPEG bytes
/// arrive over a separate channel the camera pushes during live view;
/// `takePhoto` only triggers the shutter and returns the RPC result.
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let camera = CameraDevice::open()?;

    camera.initialize().await?;

    let response = camera.take_photo().await?;

    println!("take_photo response: {response:#?}");

    if let Some(value) = response {
        File::create("take_photo_response.json")?.write_all(value.to_string().as_bytes())?;
    }

    camera.close().await;

    Ok(())
}
