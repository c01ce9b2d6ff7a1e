//! Browser voice bridge — `/ws/voice`.
//!
//! The browser acts as both microphone and speaker: it streams base64 PCM16
//! capture chunks up this socket and receives scheduled playback buffers
//! (with start offsets against the bridge epoch) back down. The live session
//! to the provider runs entirely server-side.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use kasipedia_core::error::{KasipediaError, Result};
use kasipedia_live::{
    AudioFrame, AudioSink, LiveSession, LiveTransport, MicrophoneSource, PlaybackId, SessionState,
    SinkEvent, pcm,
};

use crate::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_voice_socket(state, socket))
}

async fn handle_voice_socket(state: Arc<AppState>, socket: WebSocket) {
    let conn_id = Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "Voice bridge connected");

    let transport = match LiveTransport::new(&state.config) {
        Ok(t) => t,
        Err(e) => {
            // Missing credential is a hard startup failure; tell the client
            // once and hang up.
            warn!(conn_id = %conn_id, error = %e, "voice bridge rejected");
            let mut socket = socket;
            let closed = json!({ "type": "state", "state": "closed" }).to_string();
            let _ = socket.send(Message::Text(closed.into())).await;
            return;
        }
    };

    let (ws_tx, mut ws_rx) = socket.split();

    // All outbound traffic for this connection funnels through one channel.
    let (out_tx, out_rx) = mpsc::channel::<String>(64);
    let writer = tokio::spawn(write_loop(ws_tx, out_rx));

    let (frame_tx, frame_rx) = mpsc::channel::<Vec<f32>>(16);
    let mic = BrowserMic {
        frames: Some(frame_rx),
    };
    let sink = BrowserSink::new(out_tx.clone());

    let mut handle = LiveSession::start(Box::new(mic), Box::new(sink), Box::new(transport));
    let mut errors_open = true;
    let mut level_open = true;

    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(text.as_str()) {
                            Ok(ClientMessage::Audio { data }) => {
                                if let Ok(samples) = decode_client_audio(&data) {
                                    // Realtime path: drop frames when backed up
                                    let _ = frame_tx.try_send(samples);
                                }
                            }
                            Ok(ClientMessage::Stop) => break,
                            Err(e) => {
                                debug!(conn_id = %conn_id, error = %e, "ignoring client message");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(conn_id = %conn_id, error = %e, "voice socket error");
                        break;
                    }
                }
            }

            changed = handle.state.changed() => {
                if changed.is_err() {
                    break;
                }
                let session_state = *handle.state.borrow();
                let msg = json!({ "type": "state", "state": session_state }).to_string();
                let _ = out_tx.send(msg).await;
                if session_state == SessionState::Closed {
                    break;
                }
            }

            changed = handle.mic_level.changed(), if level_open => {
                if changed.is_err() {
                    level_open = false;
                    continue;
                }
                let level = *handle.mic_level.borrow();
                let _ = out_tx.try_send(json!({ "type": "level", "value": level }).to_string());
            }

            err = handle.errors.recv(), if errors_open => {
                match err {
                    // The browser only sees the state change; details stay in
                    // the server log.
                    Some(e) => warn!(conn_id = %conn_id, error = %e, "live session error"),
                    None => errors_open = false,
                }
            }
        }
    }

    handle.stop();
    handle.closed().await;

    let closed = json!({ "type": "state", "state": "closed" }).to_string();
    let _ = out_tx.send(closed).await;
    drop(out_tx);
    let _ = writer.await;

    info!(conn_id = %conn_id, "Voice bridge disconnected");
}

async fn write_loop(mut ws_tx: SplitSink<WebSocket, Message>, mut out_rx: mpsc::Receiver<String>) {
    while let Some(msg) = out_rx.recv().await {
        if ws_tx.send(Message::Text(msg.into())).await.is_err() {
            break;
        }
    }
    let _ = ws_tx.close().await;
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    /// Base64 PCM16 capture chunk at 16 kHz mono.
    Audio { data: String },
    Stop,
}

fn decode_client_audio(data: &str) -> Result<Vec<f32>> {
    let bytes = pcm::wire_decode(data)?;
    let frame = pcm::decode_chunk(&bytes, pcm::CAPTURE_SAMPLE_RATE, 1)?;
    Ok(frame.into_samples())
}

/// Microphone capability backed by the browser's capture stream.
struct BrowserMic {
    frames: Option<mpsc::Receiver<Vec<f32>>>,
}

#[async_trait]
impl MicrophoneSource for BrowserMic {
    async fn acquire(&mut self) -> Result<mpsc::Receiver<Vec<f32>>> {
        self.frames
            .take()
            .ok_or_else(|| KasipediaError::PermissionDenied("browser stream already taken".into()))
    }

    async fn release(&mut self) {
        // Nothing server-side to release; the browser owns the real device.
    }
}

/// Output capability that forwards scheduled buffers to the browser and
/// synthesizes completion events on the bridge clock.
struct BrowserSink {
    out: mpsc::Sender<String>,
    epoch: Instant,
    event_tx: mpsc::Sender<SinkEvent>,
    event_rx: Option<mpsc::Receiver<SinkEvent>>,
}

impl BrowserSink {
    fn new(out: mpsc::Sender<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(64);
        Self {
            out,
            epoch: Instant::now(),
            event_tx,
            event_rx: Some(event_rx),
        }
    }
}

#[async_trait]
impl AudioSink for BrowserSink {
    async fn acquire(&mut self) -> Result<mpsc::Receiver<SinkEvent>> {
        self.event_rx
            .take()
            .ok_or_else(|| KasipediaError::PermissionDenied("output already acquired".into()))
    }

    fn clock(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn play(&mut self, id: PlaybackId, frame: AudioFrame, at: f64) {
        let msg = json!({
            "type": "audio",
            "id": id.raw(),
            "start": at,
            "rate": frame.sample_rate(),
            "data": pcm::wire_encode(&pcm::encode_frame(frame.samples())),
        })
        .to_string();
        if self.out.try_send(msg).is_err() {
            debug!("dropping playback buffer, client backed up");
        }

        // Completion fires once the buffer has played out on the bridge
        // clock. A late event for a flushed handle is ignored upstream.
        let deadline = self.epoch + Duration::from_secs_f64((at + frame.duration()).max(0.0));
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline.into()).await;
            let _ = event_tx.send(SinkEvent::Ended(id)).await;
        });
    }

    fn stop(&mut self, id: PlaybackId) {
        let _ = self
            .out
            .try_send(json!({ "type": "stop", "id": id.raw() }).to_string());
    }

    async fn release(&mut self) {
        // Browser-side playback dies with the socket.
    }
}
