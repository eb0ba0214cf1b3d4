//! A WebRTC transport for `parley-core`.
//!
//! Audio is exchanged as G.711 µ-law (PCMU, 8 kHz mono) and control events
//! travel over a data channel. Local devices are pluggable through
//! [`AudioDevices`]; enable the `device-audio` feature for real microphones
//! and speakers.

pub mod audio_utils;
pub mod devices;
pub mod peer;

#[cfg(feature = "device-audio")]
pub use devices::CpalDevices;
pub use devices::{AudioCapture, AudioDevices, AudioPlayback, SilentDevices};
pub use peer::{WebRtcAudioTrack, WebRtcChannel, WebRtcConfig, WebRtcPeer, WebRtcTransport};
