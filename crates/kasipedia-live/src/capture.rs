//! Capture pipeline — microphone audio to encoded transport chunks.

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::pcm;
use crate::transport::OutboundAudio;

/// Samples per outgoing frame (256 ms at 16 kHz). Device chunks of any size
/// are re-framed to this before encoding.
pub const FRAME_SAMPLES: usize = 4096;

/// Root-mean-square loudness of a frame, for UI feedback.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Pump microphone audio into the transport until cancelled or the device
/// stream ends.
///
/// For each complete frame the loudness is published best-effort and the
/// encoded chunk is sent fire-and-forget; send failures are swallowed here —
/// the session controller's error channel is the authority for failure
/// handling, not this pipeline. A partial frame left at shutdown is
/// discarded.
pub async fn run_capture(
    mut chunks: mpsc::Receiver<Vec<f32>>,
    outbound: OutboundAudio,
    level_tx: watch::Sender<f32>,
    cancel: CancellationToken,
) {
    debug!("Capture pipeline started");
    let mut pending: Vec<f32> = Vec::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = chunks.recv() => {
                let Some(chunk) = chunk else { break };
                pending.extend_from_slice(&chunk);
                while pending.len() >= FRAME_SAMPLES {
                    let frame: Vec<f32> = pending.drain(..FRAME_SAMPLES).collect();
                    let _ = level_tx.send(rms(&frame));
                    if !outbound.send(pcm::encode_frame(&frame)) {
                        trace!("capture chunk dropped, transport not ready");
                    }
                }
            }
        }
    }
    debug!("Capture pipeline stopped");
}
