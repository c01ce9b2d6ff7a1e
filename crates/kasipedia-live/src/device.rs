//! Device capability traits.
//!
//! The session controller never touches platform audio APIs directly; it is
//! handed a microphone and an output sink behind these traits. The web layer
//! provides browser-backed implementations over a WebSocket, tests provide
//! scripted fakes.

use async_trait::async_trait;
use tokio::sync::mpsc;

use kasipedia_core::error::Result;

use crate::pcm::AudioFrame;

/// Opaque handle for a scheduled playback buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackId(pub(crate) u64);

impl PlaybackId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Asynchronous completion events from an output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    /// The buffer scheduled under this handle finished playing naturally.
    Ended(PlaybackId),
}

/// A live capture device delivering chunks of mono samples in [-1, 1] at
/// 16 kHz. Chunk sizes may vary; the capture pipeline re-frames them.
#[async_trait]
pub trait MicrophoneSource: Send {
    /// Acquire the device and start the sample stream. Fails with
    /// `PermissionDenied` when the platform or user refuses access.
    async fn acquire(&mut self) -> Result<mpsc::Receiver<Vec<f32>>>;

    /// Stop capturing and release the device. Idempotent.
    async fn release(&mut self);
}

/// An output device with a monotonic clock that plays buffers at scheduled
/// times.
#[async_trait]
pub trait AudioSink: Send {
    /// Acquire the device; completion events for scheduled buffers arrive on
    /// the returned receiver.
    async fn acquire(&mut self) -> Result<mpsc::Receiver<SinkEvent>>;

    /// Current device clock in seconds. Read-only; only the playback
    /// scheduler consults it.
    fn clock(&self) -> f64;

    /// Schedule `frame` to start playing at device time `at`.
    fn play(&mut self, id: PlaybackId, frame: AudioFrame, at: f64);

    /// Stop the buffer scheduled under `id`, if it is still playing.
    fn stop(&mut self, id: PlaybackId);

    /// Stop everything and release the device. Idempotent.
    async fn release(&mut self);
}
