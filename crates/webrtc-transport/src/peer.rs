//! Peer connection, control channel and audio track on top of webrtc-rs.

use crate::{
    audio_utils::{PCMU_SAMPLE_RATE, PcmuFramer, StreamResampler, decode_ulaw},
    devices::{AudioCapture, AudioDevices, AudioPlayback},
};
use async_trait::async_trait;
use bytes::Bytes;
use parley_core::{
    ControlChannel, MediaAccessError, MediaTrack, PeerConnection, Transport, TransportError,
    TransportEvents,
};
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::{
    api::{
        APIBuilder,
        interceptor_registry::register_default_interceptors,
        media_engine::{MIME_TYPE_PCMU, MediaEngine},
    },
    data_channel::{
        RTCDataChannel, data_channel_message::DataChannelMessage,
        data_channel_state::RTCDataChannelState,
    },
    ice_transport::ice_server::RTCIceServer,
    interceptor::registry::Registry,
    media::Sample,
    peer_connection::{
        RTCPeerConnection, configuration::RTCConfiguration,
        peer_connection_state::RTCPeerConnectionState,
        sdp::session_description::RTCSessionDescription,
    },
    rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType},
    track::{
        track_local::{TrackLocal, track_local_static_sample::TrackLocalStaticSample},
        track_remote::TrackRemote,
    },
};

const PCMU_PAYLOAD_TYPE: u8 = 0;
const FRAME_DURATION: Duration = Duration::from_millis(20);

fn transport_error(e: impl std::fmt::Display) -> TransportError {
    TransportError::new(e)
}

fn pcmu_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_PCMU.to_owned(),
        clock_rate: PCMU_SAMPLE_RATE,
        channels: 1,
        sdp_fmtp_line: String::new(),
        rtcp_feedback: vec![],
    }
}

/// Configuration for peer connections.
#[derive(Debug, Clone)]
pub struct WebRtcConfig {
    /// STUN/TURN urls for NAT traversal.
    pub ice_servers: Vec<String>,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
        }
    }
}

/// A [`Transport`] backed by webrtc-rs and a set of local audio devices.
#[derive(Clone)]
pub struct WebRtcTransport {
    config: WebRtcConfig,
    devices: Arc<dyn AudioDevices>,
}

impl WebRtcTransport {
    pub fn new(config: WebRtcConfig, devices: Arc<dyn AudioDevices>) -> Self {
        Self { config, devices }
    }
}

/// The local microphone track.
pub struct WebRtcAudioTrack {
    id: String,
    local: Arc<TrackLocalStaticSample>,
    pump: JoinHandle<()>,
}

impl WebRtcAudioTrack {
    fn start(id: &str, capture: AudioCapture) -> anyhow::Result<Self> {
        let local = Arc::new(TrackLocalStaticSample::new(
            pcmu_capability(),
            id.to_string(),
            "parley".to_string(),
        ));
        let resampler = StreamResampler::new(capture.sample_rate, PCMU_SAMPLE_RATE)?;
        let pump = tokio::spawn(pump_capture(capture, resampler, local.clone()));
        Ok(Self {
            id: id.to_string(),
            local,
            pump,
        })
    }
}

/// Moves captured audio into the track until capture ends or the task is aborted.
async fn pump_capture(
    mut capture: AudioCapture,
    mut resampler: StreamResampler,
    track: Arc<TrackLocalStaticSample>,
) {
    let mut framer = PcmuFramer::default();
    while let Some(frame) = capture.frames.recv().await {
        for packet in framer.push(&resampler.push(&frame)) {
            let sample = Sample {
                data: Bytes::from(packet),
                duration: FRAME_DURATION,
                ..Default::default()
            };
            if let Err(e) = track.write_sample(&sample).await {
                debug!(error = %e, "Dropping captured frame");
            }
        }
    }
    debug!("Capture ended");
}

impl MediaTrack for WebRtcAudioTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        // Aborting drops the capture, which stops the device stream.
        self.pump.abort();
    }
}

/// The control channel.
pub struct WebRtcChannel {
    inner: Arc<RTCDataChannel>,
}

#[async_trait]
impl ControlChannel for WebRtcChannel {
    fn is_open(&self) -> bool {
        self.inner.ready_state() == RTCDataChannelState::Open
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.inner
            .send_text(text)
            .await
            .map(|_| ())
            .map_err(transport_error)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.inner.close().await.map_err(transport_error)
    }
}

/// Text payload of a control-channel message. Binary and non-UTF-8 frames
/// have no meaning on the control channel.
pub(crate) fn channel_text(msg: &DataChannelMessage) -> Option<String> {
    if !msg.is_string {
        warn!(len = msg.data.len(), "Dropping binary control-channel frame");
        return None;
    }
    match String::from_utf8(msg.data.to_vec()) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(error = %e, "Dropping non-UTF-8 control-channel frame");
            None
        }
    }
}

/// Only an unrecoverable connection state ends the session.
pub(crate) fn is_fatal(state: RTCPeerConnectionState) -> bool {
    state == RTCPeerConnectionState::Failed
}

/// Where remote audio is currently being played.
#[derive(Default)]
struct PlaybackSlot {
    current: Mutex<Option<(JoinHandle<()>, Arc<dyn AudioPlayback>)>>,
}

impl PlaybackSlot {
    fn replace(&self, reader: JoinHandle<()>, playback: Arc<dyn AudioPlayback>) {
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((reader, playback));
        if let Some((reader, playback)) = previous {
            reader.abort();
            playback.stop();
        }
    }

    fn clear(&self) -> bool {
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match current {
            Some((reader, playback)) => {
                reader.abort();
                playback.stop();
                true
            }
            None => false,
        }
    }
}

/// Decodes remote RTP until the track ends.
async fn play_remote(
    track: Arc<TrackRemote>,
    mut resampler: StreamResampler,
    playback: Arc<dyn AudioPlayback>,
) {
    loop {
        match track.read_rtp().await {
            Ok((packet, _)) => {
                if packet.payload.is_empty() {
                    continue;
                }
                let samples = resampler.push(&decode_ulaw(&packet.payload));
                if !samples.is_empty() {
                    playback.play(&samples);
                }
            }
            Err(e) => {
                debug!(error = %e, "Remote track read ended");
                break;
            }
        }
    }
}

pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    events: Arc<dyn TransportEvents>,
    playback: Arc<PlaybackSlot>,
}

impl WebRtcPeer {
    fn watch(&self, devices: Arc<dyn AudioDevices>) {
        let events = self.events.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                info!(?state, "Peer connection state changed");
                let events = events.clone();
                Box::pin(async move {
                    if is_fatal(state) {
                        // The session closes this connection in response, which
                        // must not happen inside its own state callback.
                        tokio::spawn(async move {
                            events.on_transport_failed("peer connection failed").await;
                        });
                    }
                })
            }));

        let events = self.events.clone();
        let slot = self.playback.clone();
        self.pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let events = events.clone();
            let slot = slot.clone();
            let devices = devices.clone();
            Box::pin(async move {
                if track.kind() != RTPCodecType::Audio {
                    return;
                }
                info!(
                    track = %track.id(),
                    codec = %track.codec().capability.mime_type,
                    "Remote audio track received"
                );
                let playback = match devices.open_playback() {
                    Ok(playback) => playback,
                    Err(e) => {
                        warn!(error = %e, "No playback sink for remote audio");
                        return;
                    }
                };
                let resampler = match StreamResampler::new(PCMU_SAMPLE_RATE, playback.sample_rate()) {
                    Ok(resampler) => resampler,
                    Err(e) => {
                        warn!(error = %e, "Cannot resample remote audio");
                        return;
                    }
                };
                let track_id = track.id();
                let reader = tokio::spawn(play_remote(track, resampler, playback.clone()));
                slot.replace(reader, playback);
                events.on_remote_track(&track_id).await;
            })
        }));
    }
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    type Track = WebRtcAudioTrack;
    type Channel = WebRtcChannel;

    async fn add_track(&self, track: &WebRtcAudioTrack) -> Result<(), TransportError> {
        let local: Arc<dyn TrackLocal + Send + Sync> = track.local.clone();
        let sender = self.pc.add_track(local).await.map_err(transport_error)?;

        // RTCP has to be drained for interceptors to work.
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });
        Ok(())
    }

    async fn create_control_channel(&self, label: &str) -> Result<WebRtcChannel, TransportError> {
        let dc = self
            .pc
            .create_data_channel(label, None)
            .await
            .map_err(transport_error)?;

        let events = self.events.clone();
        dc.on_open(Box::new(move || {
            Box::pin(async move {
                events.on_channel_open().await;
            })
        }));

        let events = self.events.clone();
        dc.on_close(Box::new(move || {
            let events = events.clone();
            Box::pin(async move {
                tokio::spawn(async move {
                    events.on_channel_close().await;
                });
            })
        }));

        let events = self.events.clone();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            let events = events.clone();
            Box::pin(async move {
                if let Some(text) = channel_text(&msg) {
                    events.on_channel_message(&text).await;
                }
            })
        }));

        Ok(WebRtcChannel { inner: dc })
    }

    async fn create_offer(&self) -> Result<String, TransportError> {
        let offer = self.pc.create_offer(None).await.map_err(transport_error)?;

        // Non-trickle: the offer sent upstream must already carry every candidate.
        let mut gathered = self.pc.gathering_complete_promise().await;
        self.pc
            .set_local_description(offer)
            .await
            .map_err(transport_error)?;
        let _ = gathered.recv().await;

        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| TransportError::new("no local description after gathering"))?;
        debug!(len = local.sdp.len(), "ICE gathering complete");
        Ok(local.sdp)
    }

    async fn apply_answer(&self, sdp: &str) -> Result<(), TransportError> {
        let answer = RTCSessionDescription::answer(sdp.to_string()).map_err(transport_error)?;
        self.pc
            .set_remote_description(answer)
            .await
            .map_err(transport_error)
    }

    async fn remove_playback(&self) -> Result<(), TransportError> {
        if self.playback.clear() {
            debug!("Playback sink removed");
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.pc.close().await.map_err(transport_error)
    }
}

#[async_trait]
impl Transport for WebRtcTransport {
    type Track = WebRtcAudioTrack;
    type Peer = WebRtcPeer;

    async fn acquire_audio(&self) -> Result<Vec<WebRtcAudioTrack>, MediaAccessError> {
        let capture = self.devices.open_capture()?;
        info!(rate = capture.sample_rate, "Microphone opened");
        let track = WebRtcAudioTrack::start("microphone", capture)
            .map_err(|e| MediaAccessError::Unavailable(e.to_string()))?;
        Ok(vec![track])
    }

    async fn create_peer(
        &self,
        events: Arc<dyn TransportEvents>,
    ) -> Result<WebRtcPeer, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_codec(
                RTCRtpCodecParameters {
                    capability: pcmu_capability(),
                    payload_type: PCMU_PAYLOAD_TYPE,
                    ..Default::default()
                },
                RTPCodecType::Audio,
            )
            .map_err(transport_error)?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(transport_error)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = self
            .config
            .ice_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect();
        let pc = api
            .new_peer_connection(RTCConfiguration {
                ice_servers,
                ..Default::default()
            })
            .await
            .map_err(transport_error)?;

        let peer = WebRtcPeer {
            pc: Arc::new(pc),
            events,
            playback: Arc::new(PlaybackSlot::default()),
        };
        peer.watch(self.devices.clone());
        debug!(ice_servers = self.config.ice_servers.len(), "Peer connection created");
        Ok(peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::SilentDevices;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Ignore;

    #[async_trait]
    impl TransportEvents for Ignore {
        async fn on_channel_open(&self) {}
        async fn on_channel_close(&self) {}
        async fn on_channel_message(&self, _raw: &str) {}
        async fn on_remote_track(&self, _track_id: &str) {}
        async fn on_transport_failed(&self, _reason: &str) {}
    }

    fn offline_transport() -> WebRtcTransport {
        WebRtcTransport::new(WebRtcConfig { ice_servers: vec![] }, Arc::new(SilentDevices))
    }

    #[test]
    fn test_channel_text() {
        let text = DataChannelMessage {
            is_string: true,
            data: Bytes::from_static(br#"{"type":"text.end"}"#),
        };
        assert_eq!(channel_text(&text).as_deref(), Some(r#"{"type":"text.end"}"#));

        let binary = DataChannelMessage {
            is_string: false,
            data: Bytes::from_static(b"abc"),
        };
        assert!(channel_text(&binary).is_none());

        let invalid = DataChannelMessage {
            is_string: true,
            data: Bytes::from_static(&[0xC3, 0x28]),
        };
        assert!(channel_text(&invalid).is_none());
    }

    #[test]
    fn test_only_failed_state_is_fatal() {
        assert!(is_fatal(RTCPeerConnectionState::Failed));
        assert!(!is_fatal(RTCPeerConnectionState::Disconnected));
        assert!(!is_fatal(RTCPeerConnectionState::Connected));
        assert!(!is_fatal(RTCPeerConnectionState::Closed));
    }

    #[tokio::test]
    async fn test_offer_carries_audio_and_data() {
        let transport = offline_transport();
        let tracks = transport.acquire_audio().await.unwrap();
        let peer = transport.create_peer(Arc::new(Ignore)).await.unwrap();
        peer.add_track(&tracks[0]).await.unwrap();
        let channel = peer.create_control_channel("oai-events").await.unwrap();

        let offer = peer.create_offer().await.unwrap();

        assert!(offer.starts_with("v=0"));
        assert!(offer.contains("m=audio"));
        assert!(offer.contains("PCMU/8000"));
        assert!(offer.contains("m=application"));
        assert!(!channel.is_open());

        peer.close().await.unwrap();
        tracks[0].stop();
    }

    #[tokio::test]
    async fn test_invalid_answer_is_rejected() {
        let transport = offline_transport();
        let peer = transport.create_peer(Arc::new(Ignore)).await.unwrap();
        peer.create_control_channel("oai-events").await.unwrap();
        peer.create_offer().await.unwrap();

        assert!(peer.apply_answer("not sdp").await.is_err());
        peer.close().await.unwrap();
    }

    struct FlagPlayback(AtomicBool);

    impl AudioPlayback for FlagPlayback {
        fn sample_rate(&self) -> u32 {
            8000
        }

        fn play(&self, _samples: &[f32]) {}

        fn stop(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_playback_slot_stops_replaced_and_cleared_sinks() {
        let slot = PlaybackSlot::default();
        let first = Arc::new(FlagPlayback(AtomicBool::new(false)));
        let second = Arc::new(FlagPlayback(AtomicBool::new(false)));

        slot.replace(tokio::spawn(async {}), first.clone());
        slot.replace(tokio::spawn(async {}), second.clone());
        assert!(first.0.load(Ordering::SeqCst));
        assert!(!second.0.load(Ordering::SeqCst));

        assert!(slot.clear());
        assert!(second.0.load(Ordering::SeqCst));
        assert!(!slot.clear());
    }
}
