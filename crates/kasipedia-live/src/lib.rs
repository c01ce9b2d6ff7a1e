//! Live audio session bridge.
//!
//! Streams microphone audio to the Gemini Live API and plays back synthesized
//! speech as it arrives. The session controller owns the lifecycle state
//! machine and wires three injectable capabilities together: a
//! [`MicrophoneSource`], an [`AudioSink`], and a [`StreamingTransport`].

pub mod capture;
pub mod device;
pub mod pcm;
pub mod playback;
pub mod session;
pub mod transport;

pub use device::{AudioSink, MicrophoneSource, PlaybackId, SinkEvent};
pub use pcm::AudioFrame;
pub use session::{LiveHandle, LiveSession, SessionState};
pub use transport::{LiveTransport, OutboundAudio, StreamingTransport, TransportEvent};
