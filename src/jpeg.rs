use std::sync::atomic::{AtomicBool, Ordering};

use log::*;
use tokio::sync::mpsc;

use crate::{
    consts::{JPEG_ACCUMULATOR_INITIAL_CAPACITY, JPEG_EOI, JPEG_METADATA_MARKER, JPEG_SOI, PACKET_SIZE, SIGNATURE_LEN},
    error::CamResult,
    handshake::{is_init_signature, HandshakeFilter},
    transport::Port,
};

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Reads one live-view "chunk": one or more packets concatenated until
/// a packet containing the `FF D9` trailer arrives. A packet carrying
/// the [`JPEG_METADATA_MARKER`] has its first [`SIGNATURE_LEN`] bytes
/// (the metadata header) stripped before its payload is used.
///
/// Returns `Ok(None)` if an init signature is observed mid-chunk: the
/// ack is emitted and the current read aborts with no partial data
/// kept — the reassembler resynchronizes on the next iteration.
async fn read_chunk<P: Port>(port: &P) -> CamResult<Option<Vec<u8>>> {
    let filter = HandshakeFilter::new(port);
    let first = filter.read().await?;

    let mut chunk = if first.len() >= JPEG_METADATA_MARKER.len() && first[..JPEG_METADATA_MARKER.len()] == JPEG_METADATA_MARKER {
        if first.len() > SIGNATURE_LEN {
            first[SIGNATURE_LEN..].to_vec()
        } else {
            Vec::new()
        }
    } else {
        first
    };

    if find(&chunk, &JPEG_EOI).is_some() {
        return Ok(Some(chunk));
    }

    loop {
        let packet = port.recv(PACKET_SIZE).await?;

        if is_init_signature(&packet) {
            debug!("read_chunk: init signature mid-read, acking and aborting chunk");
            port.send(crate::consts::INIT_RESPONSE.to_vec()).await?;
            return Ok(None);
        }

        let has_trailer = find(&packet, &JPEG_EOI).is_some();
        chunk.extend_from_slice(&packet);

        if has_trailer {
            break;
        }
    }

    Ok(Some(chunk))
}

/// Demultiplexes the live-view byte stream into discrete JPEG frames.
///
/// Owns the accumulator buffer that persists across loop iterations.
/// One [`JpegReassembler`] drives one `start_live_view` call; it is not
/// reused across calls.
pub struct JpegReassembler {
    accumulator: Vec<u8>,
}

impl Default for JpegReassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl JpegReassembler {
    pub fn new() -> Self {
        Self {
            accumulator: Vec::with_capacity(JPEG_ACCUMULATOR_INITIAL_CAPACITY),
        }
    }

    /// Appends `chunk` and tries to slice one complete frame out of the
    /// accumulator. Once a frame is emitted the accumulator is reset to
    /// empty, dropping any bytes trailing the `FF D9` — including the
    /// start of a following frame, if the camera packed one tightly
    /// against the last. This mirrors the device's own framing behavior
    /// rather than trying to be clever about it; a stricter reassembler
    /// could retain trailing bytes instead.
    fn ingest(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        self.accumulator.extend_from_slice(chunk);

        let Some(h) = find(&self.accumulator, &JPEG_SOI) else {
            // No header anywhere in the accumulator: keep just enough
            // trailing bytes to catch a marker split across chunks.
            let keep = self.accumulator.len().min(JPEG_SOI.len() - 1);
            let tail_start = self.accumulator.len() - keep;
            self.accumulator.drain(0..tail_start);
            return None;
        };

        let Some(eoi_rel) = find(&self.accumulator[h + 1..], &JPEG_EOI) else {
            // Header found but no trailer yet: drop the prefix before it.
            self.accumulator.drain(0..h);
            return None;
        };

        let trailer_end = h + 1 + eoi_rel + JPEG_EOI.len();
        let frame = self.accumulator[h..trailer_end].to_vec();
        self.accumulator.clear();

        Some(frame)
    }

    /// Drives the live-view loop: reads chunks until `should_stop` is
    /// set, emitting each complete frame to `tx`. Returns when stopped
    /// or when the receiver is dropped.
    pub async fn run<P: Port>(
        &mut self,
        port: &P,
        should_stop: &AtomicBool,
        tx: mpsc::Sender<Vec<u8>>,
    ) -> CamResult<()> {
        while !should_stop.load(Ordering::Relaxed) {
            let Some(chunk) = read_chunk(port).await? else {
                continue;
            };

            if let Some(frame) = self.ingest(&chunk) {
                if tx.send(frame).await.is_err() {
                    debug!("jpeg reassembler: frame receiver dropped, stopping");
                    break;
                }
            }
        }

        Ok(())
    }
}
