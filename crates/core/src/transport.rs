//! Capabilities a concrete media transport provides to the negotiator.
//!
//! A transport owns the peer connection, the control channel and the media
//! tracks. The session core drives it through these traits only, which keeps
//! negotiation and teardown testable without a network.

use crate::error::{MediaAccessError, TransportError};
use async_trait::async_trait;

/// Callbacks a transport raises towards the session that owns it.
#[async_trait]
pub trait TransportEvents: Send + Sync {
    async fn on_channel_open(&self);

    async fn on_channel_close(&self);

    async fn on_channel_message(&self, raw: &str);

    /// A remote media stream was attached and bound to the playback sink.
    async fn on_remote_track(&self, track_id: &str);

    /// The underlying connection failed irrecoverably.
    async fn on_transport_failed(&self, reason: &str);
}

/// A local media track attached to a peer connection.
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> &str;

    /// Stops capture. Must be idempotent.
    fn stop(&self);
}

/// The structured-message path alongside the media path.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    fn is_open(&self) -> bool;

    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait PeerConnection: Send + Sync {
    type Track: MediaTrack;
    type Channel: ControlChannel;

    async fn add_track(&self, track: &Self::Track) -> Result<(), TransportError>;

    async fn create_control_channel(&self, label: &str) -> Result<Self::Channel, TransportError>;

    /// Creates an offer, applies it as the local description and returns its SDP.
    async fn create_offer(&self) -> Result<String, TransportError>;

    async fn apply_answer(&self, sdp: &str) -> Result<(), TransportError>;

    /// Unbinds and releases the sink remote media is played through.
    async fn remove_playback(&self) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Factory for the resources of one session.
///
/// Inbound remote media must be bound to a playback sink by the peer itself;
/// callers never wire playback manually.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Track: MediaTrack;
    type Peer: PeerConnection<Track = Self::Track>;

    async fn acquire_audio(&self) -> Result<Vec<Self::Track>, MediaAccessError>;

    async fn create_peer(
        &self,
        events: std::sync::Arc<dyn TransportEvents>,
    ) -> Result<Self::Peer, TransportError>;
}

/// The control channel type of a transport.
pub type ChannelOf<T> = <<T as Transport>::Peer as PeerConnection>::Channel;
