//! Streaming transport — the bidirectional channel to the live-audio service.
//!
//! [`LiveTransport`] implements the trait over a tokio-tungstenite WebSocket
//! against the Gemini `BidiGenerateContent` endpoint. Auth is via API key in
//! query parameter.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use kasipedia_core::config::Config;
use kasipedia_core::error::{KasipediaError, Result};

use crate::pcm;

const DEFAULT_WS_BASE_URL: &str = "wss://generativelanguage.googleapis.com";
const LIVE_WS_PATH: &str =
    "/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Chunks queued beyond this are dropped — stale realtime audio is worse
/// than lost audio.
const OUTBOUND_QUEUE: usize = 32;

/// Events delivered by a transport to the session controller.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The remote session is set up and ready for audio.
    Opened,
    /// Synthesized 16-bit PCM audio bytes (24 kHz mono).
    Audio(Vec<u8>),
    /// The user started speaking over active playback; flush immediately.
    Interrupted,
    /// The remote closed the channel.
    Closed,
    /// Open/receive failure.
    Error(String),
}

/// Clonable fire-and-forget handle for streaming encoded capture chunks.
///
/// Sends never block and never fail loudly: a chunk produced while the
/// socket is not ready, or while the queue is full, is dropped.
#[derive(Clone)]
pub struct OutboundAudio {
    tx: mpsc::Sender<Vec<u8>>,
}

impl OutboundAudio {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Returns false if the chunk was dropped.
    pub fn send(&self, chunk: Vec<u8>) -> bool {
        self.tx.try_send(chunk).is_ok()
    }
}

/// A bidirectional streaming channel, exclusively owned by one session.
#[async_trait]
pub trait StreamingTransport: Send {
    /// Open the channel. All events, including [`TransportEvent::Opened`],
    /// arrive on the returned receiver.
    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Outbound handle for the capture pipeline.
    fn outbound(&self) -> OutboundAudio;

    /// Close the channel. Idempotent.
    async fn close(&mut self);
}

/// Gemini Live WebSocket transport.
pub struct LiveTransport {
    url: String,
    model: String,
    system_instruction: String,
    outbound: OutboundAudio,
    outbound_rx: Option<mpsc::Receiver<Vec<u8>>>,
    cancel: CancellationToken,
}

impl LiveTransport {
    /// Build a transport from config. Fails with `CredentialMissing` when no
    /// API key can be resolved.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_base_url(config, DEFAULT_WS_BASE_URL)
    }

    pub fn with_base_url(config: &Config, base_url: &str) -> Result<Self> {
        let api_key = config
            .resolve_api_key()
            .ok_or(KasipediaError::CredentialMissing)?;
        let url = format!(
            "{}{}?key={}",
            base_url.trim_end_matches('/'),
            LIVE_WS_PATH,
            api_key
        );
        let (outbound, outbound_rx) = OutboundAudio::channel(OUTBOUND_QUEUE);
        Ok(Self {
            url,
            model: config.live_model().to_string(),
            system_instruction: config.voice_instruction().to_string(),
            outbound,
            outbound_rx: Some(outbound_rx),
            cancel: CancellationToken::new(),
        })
    }
}

#[async_trait]
impl StreamingTransport for LiveTransport {
    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>> {
        let chunk_rx = self
            .outbound_rx
            .take()
            .ok_or_else(|| KasipediaError::Transport("transport already opened".into()))?;

        let (ws, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| KasipediaError::Transport(e.to_string()))?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        debug!(model = %self.model, "Live channel connected, sending setup");

        // Setup must be the first client message on the socket.
        let setup = json!({
            "setup": {
                "model": format!("models/{}", self.model),
                "generationConfig": { "responseModalities": ["AUDIO"] },
                "systemInstruction": { "parts": [{ "text": self.system_instruction }] },
            }
        });
        ws_tx
            .send(Message::text(setup.to_string()))
            .await
            .map_err(|e| KasipediaError::Transport(e.to_string()))?;

        let (event_tx, event_rx) = mpsc::channel(64);

        // Writer: wrap capture chunks as realtime input until cancelled.
        let writer_cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut chunk_rx = chunk_rx;
            loop {
                tokio::select! {
                    _ = writer_cancel.cancelled() => break,
                    chunk = chunk_rx.recv() => {
                        let Some(chunk) = chunk else { break };
                        let msg = json!({
                            "realtimeInput": {
                                "mediaChunks": [{
                                    "mimeType": format!("audio/pcm;rate={}", pcm::CAPTURE_SAMPLE_RATE),
                                    "data": pcm::wire_encode(&chunk),
                                }]
                            }
                        });
                        if ws_tx.send(Message::text(msg.to_string())).await.is_err() {
                            trace!("socket write failed, dropping capture chunk");
                            break;
                        }
                    }
                }
            }
            let _ = ws_tx.send(Message::Close(None)).await;
        });

        // Reader: map server messages to transport events until cancelled.
        let reader_cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = reader_cancel.cancelled() => break,
                    incoming = ws_rx.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                for event in parse_server_message(text.as_bytes()) {
                                    if event_tx.send(event).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            Some(Ok(Message::Binary(bytes))) => {
                                for event in parse_server_message(&bytes) {
                                    if event_tx.send(event).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                let _ = event_tx.send(TransportEvent::Closed).await;
                                break;
                            }
                            Some(Ok(_)) => {} // ping/pong
                            Some(Err(e)) => {
                                let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(event_rx)
    }

    fn outbound(&self) -> OutboundAudio {
        self.outbound.clone()
    }

    async fn close(&mut self) {
        self.cancel.cancel();
    }
}

// --- Server message types ---

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ServerMessage {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<ServerContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    interrupted: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModelTurn {
    parts: Vec<ServerPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ServerPart {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct InlineData {
    data: String,
}

/// Map one server message to zero or more transport events. Unparseable
/// messages and malformed audio parts are dropped here; they are not fatal
/// to the session.
fn parse_server_message(bytes: &[u8]) -> Vec<TransportEvent> {
    let msg: ServerMessage = match serde_json::from_slice(bytes) {
        Ok(m) => m,
        Err(e) => {
            trace!(error = %e, "ignoring unparseable live message");
            return Vec::new();
        }
    };

    let mut events = Vec::new();
    if msg.setup_complete.is_some() {
        events.push(TransportEvent::Opened);
    }
    if let Some(content) = msg.server_content {
        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                if let Some(inline) = part.inline_data {
                    match pcm::wire_decode(&inline.data) {
                        Ok(audio) => events.push(TransportEvent::Audio(audio)),
                        Err(e) => debug!(error = %e, "dropping malformed audio part"),
                    }
                }
            }
        }
        if content.interrupted {
            events.push(TransportEvent::Interrupted);
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_setup_complete() {
        let events = parse_server_message(br#"{"setupComplete":{}}"#);
        assert_eq!(events, vec![TransportEvent::Opened]);
    }

    #[test]
    fn test_parse_audio_parts() {
        let data = pcm::wire_encode(&[1, 0, 2, 0]);
        let json = format!(
            r#"{{"serverContent":{{"modelTurn":{{"parts":[{{"inlineData":{{"mimeType":"audio/pcm;rate=24000","data":"{data}"}}}}]}}}}}}"#
        );
        let events = parse_server_message(json.as_bytes());
        assert_eq!(events, vec![TransportEvent::Audio(vec![1, 0, 2, 0])]);
    }

    #[test]
    fn test_parse_interrupted_after_audio() {
        let data = pcm::wire_encode(&[0, 0]);
        let json = format!(
            r#"{{"serverContent":{{"interrupted":true,"modelTurn":{{"parts":[{{"inlineData":{{"data":"{data}"}}}}]}}}}}}"#
        );
        let events = parse_server_message(json.as_bytes());
        // Audio parts are delivered before the interruption signal
        assert_eq!(
            events,
            vec![
                TransportEvent::Audio(vec![0, 0]),
                TransportEvent::Interrupted
            ]
        );
    }

    #[test]
    fn test_parse_garbage_yields_nothing() {
        assert!(parse_server_message(b"not json").is_empty());
        assert!(parse_server_message(b"{}").is_empty());
        assert!(parse_server_message(br#"{"serverContent":{}}"#).is_empty());
    }

    #[test]
    fn test_parse_malformed_audio_part_is_dropped() {
        let json = r#"{"serverContent":{"modelTurn":{"parts":[{"inlineData":{"data":"!!!"}}]}}}"#;
        assert!(parse_server_message(json.as_bytes()).is_empty());
    }

    #[test]
    fn test_outbound_drops_when_full() {
        let (outbound, _rx) = OutboundAudio::channel(2);
        assert!(outbound.send(vec![0]));
        assert!(outbound.send(vec![1]));
        assert!(!outbound.send(vec![2]));
    }

    #[test]
    fn test_outbound_drops_after_receiver_gone() {
        let (outbound, rx) = OutboundAudio::channel(2);
        drop(rx);
        assert!(!outbound.send(vec![0]));
    }

    #[test]
    fn test_transport_requires_credential() {
        let config = Config {
            provider: Some(kasipedia_core::config::ProviderConfig {
                api_key: None,
                api_key_env: Some("KASIPEDIA_LIVE_TEST_UNSET".into()),
            }),
            ..Default::default()
        };
        assert!(matches!(
            LiveTransport::new(&config),
            Err(KasipediaError::CredentialMissing)
        ));
    }

    #[test]
    fn test_transport_url_shape() {
        let config = Config {
            provider: Some(kasipedia_core::config::ProviderConfig {
                api_key: Some("test-key".into()),
                api_key_env: None,
            }),
            ..Default::default()
        };
        let transport = LiveTransport::new(&config).unwrap();
        assert!(transport.url.starts_with("wss://generativelanguage.googleapis.com/ws/"));
        assert!(transport.url.contains("BidiGenerateContent"));
        assert!(transport.url.ends_with("?key=test-key"));
    }
}
