use std::{fs::File, io::Write, sync::Arc};

use dxo_one_core::device::CameraDevice;
use tokio::sync::mpsc;

#[tokio::main]
/// Starts live view and saves the first few frames as JPEG files.
/// Unlike the older Huawei protocol, frames off the wire are already
/// complete JPEGs — no H.264 decode step is needed.
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let camera = Arc::new(CameraDevice::open()?);
    camera.initialize().await?;

    let (tx, mut rx) = mpsc::channel(8);

    let live_view = tokio::spawn({
        let camera = camera.clone();
        async move { camera.start_live_view(tx).await }
    });

    let mut frame_count = 0;

    while let Some(frame) = rx.recv().await {
        File::create(format!("frame-{frame_count}.jpg"))?.write_all(&frame)?;
        frame_count += 1;

        if frame_count >= 4 {
            break;
        }
    }

    camera.stop_live_view();
    live_view.await??;

    println!("saved {frame_count} frames");

    camera.close().await;

    Ok(())
}
