//! Session core for realtime voice conversations.
//!
//! A [`RealtimeClient`] negotiates a [`Session`] over some [`Transport`]:
//! it fetches an ephemeral credential, acquires local audio, exchanges SDP
//! with the remote endpoint and then routes control-channel events through
//! an [`EventDispatcher`] to a [`Renderer`].

pub mod client;
pub mod config;
pub mod credential;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod negotiator;
pub mod renderer;
pub mod session;
pub mod signaling;
pub mod state;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::RealtimeClient;
pub use config::{ClientConfig, ConfigError};
pub use credential::{CredentialSource, EphemeralKey, HttpCredentialSource};
pub use dispatcher::EventDispatcher;
pub use error::{
    CleanupError, CredentialError, MediaAccessError, MessageParseError, NegotiationError,
    SessionError, TransportError,
};
pub use event::{ClientEvent, ServerEvent};
pub use negotiator::{Negotiator, Resources};
pub use renderer::{MessageFlags, MessageId, Renderer, Role};
pub use session::Session;
pub use signaling::{HttpSignaler, SdpSignaler};
pub use state::{ConversationState, Lifecycle};
pub use transport::{ControlChannel, MediaTrack, PeerConnection, Transport, TransportEvents};
