//! Playback scheduler — gapless, in-order playback against the sink clock.

use std::collections::HashSet;

use kasipedia_core::error::Result;
use tokio::sync::mpsc;

use crate::device::{AudioSink, PlaybackId, SinkEvent};
use crate::pcm::AudioFrame;

/// Queues decoded frames for sequential playback.
///
/// Invariant: the next scheduled start time is `max(cursor, sink clock)`, so
/// buffers never overlap and never start in the past.
pub struct PlaybackScheduler {
    sink: Box<dyn AudioSink>,
    cursor: f64,
    next_id: u64,
    active: HashSet<PlaybackId>,
}

impl PlaybackScheduler {
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        Self {
            sink,
            cursor: 0.0,
            next_id: 0,
            active: HashSet::new(),
        }
    }

    /// Acquire the underlying output device.
    pub async fn acquire(&mut self) -> Result<mpsc::Receiver<SinkEvent>> {
        self.sink.acquire().await
    }

    /// Schedule a frame directly after the previously scheduled one, or at
    /// the current device time if the queue has drained.
    pub fn enqueue(&mut self, frame: AudioFrame) -> PlaybackId {
        let start = self.cursor.max(self.sink.clock());
        let id = PlaybackId(self.next_id);
        self.next_id += 1;
        self.cursor = start + frame.duration();
        self.sink.play(id, frame, start);
        self.active.insert(id);
        id
    }

    /// A buffer finished naturally; forget its handle. A handle that was
    /// already flushed is ignored.
    pub fn on_ended(&mut self, id: PlaybackId) {
        self.active.remove(&id);
    }

    /// Barge-in: stop every scheduled buffer and restart the cursor from the
    /// device clock. Safe on an empty queue.
    pub fn flush(&mut self) {
        let ids: Vec<PlaybackId> = self.active.drain().collect();
        for id in ids {
            self.sink.stop(id);
        }
        self.cursor = self.sink.clock();
    }

    /// Teardown variant of [`flush`](Self::flush) that zeroes the cursor.
    pub fn clear(&mut self) {
        let ids: Vec<PlaybackId> = self.active.drain().collect();
        for id in ids {
            self.sink.stop(id);
        }
        self.cursor = 0.0;
    }

    /// Clear and release the output device. Idempotent.
    pub async fn release(&mut self) {
        self.clear();
        self.sink.release().await;
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }
}
