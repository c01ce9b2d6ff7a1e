//! Session controller — lifecycle state machine and event loop.
//!
//! One background task owns every acquired resource and performs all state
//! mutation, so no locking is needed. Every exit path converges on the same
//! idempotent teardown routine.

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kasipedia_core::error::KasipediaError;

use crate::capture;
use crate::device::{AudioSink, MicrophoneSource, SinkEvent};
use crate::pcm::{self, PLAYBACK_SAMPLE_RATE};
use crate::playback::PlaybackScheduler;
use crate::transport::{StreamingTransport, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Closed,
}

/// Handle for observing and stopping a running session.
///
/// Exactly one terminal error is delivered on `errors`; after that the
/// session is guaranteed to reach `Closed`.
pub struct LiveHandle {
    cancel: CancellationToken,
    pub state: watch::Receiver<SessionState>,
    pub mic_level: watch::Receiver<f32>,
    pub errors: mpsc::Receiver<KasipediaError>,
    task: JoinHandle<()>,
}

impl LiveHandle {
    /// Request teardown. Safe to call repeatedly; resources are released
    /// exactly once.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait until the controller task has fully torn down.
    pub async fn closed(self) {
        let _ = self.task.await;
    }
}

/// A single-use live audio session.
pub struct LiveSession;

impl LiveSession {
    /// Start a session over the given devices and transport.
    ///
    /// Returns immediately; connection progress, microphone loudness, and
    /// the terminal error (if any) are observable on the handle.
    pub fn start(
        mic: Box<dyn MicrophoneSource>,
        sink: Box<dyn AudioSink>,
        transport: Box<dyn StreamingTransport>,
    ) -> LiveHandle {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (level_tx, level_rx) = watch::channel(0.0f32);
        let (error_tx, error_rx) = mpsc::channel(1);

        let controller = Controller {
            mic,
            transport,
            scheduler: PlaybackScheduler::new(sink),
            capture_cancel: CancellationToken::new(),
            state: SessionState::Idle,
            state_tx,
            error_tx: Some(error_tx),
            closed: false,
        };

        let task = tokio::spawn(controller.run(cancel.clone(), level_tx));

        LiveHandle {
            cancel,
            state: state_rx,
            mic_level: level_rx,
            errors: error_rx,
            task,
        }
    }
}

struct Controller {
    mic: Box<dyn MicrophoneSource>,
    transport: Box<dyn StreamingTransport>,
    scheduler: PlaybackScheduler,
    capture_cancel: CancellationToken,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    error_tx: Option<mpsc::Sender<KasipediaError>>,
    closed: bool,
}

impl Controller {
    async fn run(mut self, cancel: CancellationToken, level_tx: watch::Sender<f32>) {
        self.set_state(SessionState::Connecting);
        info!("Live session starting");

        // Each acquisition is asynchronous and may race a stop() request;
        // after every await the cancel token decides whether the freshly
        // acquired resource is kept or released again.
        let mic_frames = match self.mic.acquire().await {
            Ok(frames) => frames,
            Err(e) => return self.fail(e).await,
        };
        if cancel.is_cancelled() {
            return self.teardown().await;
        }

        let mut sink_events = match self.scheduler.acquire().await {
            Ok(events) => events,
            Err(e) => return self.fail(e).await,
        };
        if cancel.is_cancelled() {
            return self.teardown().await;
        }

        let mut transport_events = match self.transport.open().await {
            Ok(events) => events,
            Err(e) => return self.fail(e).await,
        };
        if cancel.is_cancelled() {
            return self.teardown().await;
        }

        // Handed to the capture pipeline once the transport reports open.
        let mut mic_frames = Some(mic_frames);
        let mut level_tx = Some(level_tx);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                event = transport_events.recv() => {
                    match event {
                        Some(TransportEvent::Opened) => {
                            if self.state == SessionState::Connecting {
                                self.set_state(SessionState::Active);
                                info!("Live session active");
                                if let (Some(frames), Some(level)) =
                                    (mic_frames.take(), level_tx.take())
                                {
                                    tokio::spawn(capture::run_capture(
                                        frames,
                                        self.transport.outbound(),
                                        level,
                                        self.capture_cancel.clone(),
                                    ));
                                }
                            }
                        }
                        Some(TransportEvent::Audio(bytes)) => {
                            if self.state == SessionState::Active {
                                match pcm::decode_chunk(&bytes, PLAYBACK_SAMPLE_RATE, 1) {
                                    Ok(frame) => {
                                        self.scheduler.enqueue(frame);
                                    }
                                    Err(e) => {
                                        debug!(error = %e, "dropping undecodable audio chunk");
                                    }
                                }
                            }
                        }
                        Some(TransportEvent::Interrupted) => {
                            if self.state == SessionState::Active {
                                debug!("barge-in, flushing playback");
                                self.scheduler.flush();
                            }
                        }
                        Some(TransportEvent::Closed) => {
                            debug!("transport closed");
                            break;
                        }
                        Some(TransportEvent::Error(message)) => {
                            self.surface(KasipediaError::Transport(message));
                            break;
                        }
                        None => break,
                    }
                }

                event = sink_events.recv() => {
                    match event {
                        Some(SinkEvent::Ended(id)) => self.scheduler.on_ended(id),
                        None => {
                            warn!("output device event stream ended");
                            break;
                        }
                    }
                }
            }
        }

        self.teardown().await;
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        let _ = self.state_tx.send(state);
    }

    /// Deliver the terminal error. Only the first error per session reaches
    /// the caller.
    fn surface(&mut self, err: KasipediaError) {
        match self.error_tx.take() {
            Some(tx) => {
                warn!(error = %err, "live session error");
                let _ = tx.try_send(err);
            }
            None => debug!(error = %err, "suppressing error after the terminal one"),
        }
    }

    async fn fail(&mut self, err: KasipediaError) {
        self.surface(err);
        self.teardown().await;
    }

    /// Unified release path: transport, capture, devices, scheduled
    /// playback, cursor. Every exit converges here; a second call is a
    /// no-op.
    async fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.capture_cancel.cancel();
        self.transport.close().await;
        self.mic.release().await;
        self.scheduler.release().await;

        self.set_state(SessionState::Closed);
        info!("Live session closed");
    }
}
