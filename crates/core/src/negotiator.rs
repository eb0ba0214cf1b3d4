//! Establishes a media + control session with the remote endpoint.
//!
//! Negotiation is a short sequential pipeline:
//! credential -> local audio -> peer + tracks + control channel -> offer/answer.
//! Whatever was acquired before a failing step is released before the error is
//! returned.

use crate::{
    credential::{CredentialSource, EphemeralKey},
    error::{CleanupError, SessionError},
    signaling::SdpSignaler,
    transport::{ChannelOf, ControlChannel, MediaTrack, PeerConnection, Transport, TransportEvents},
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// The transport resources held by one session.
///
/// Fields stay optional so that a half-built set can be released with the same
/// code path as a complete one.
pub struct Resources<T: Transport> {
    pub(crate) tracks: Vec<T::Track>,
    pub(crate) peer: Option<T::Peer>,
    pub(crate) channel: Option<ChannelOf<T>>,
}

impl<T: Transport> Resources<T> {
    fn new(tracks: Vec<T::Track>) -> Self {
        Self {
            tracks,
            peer: None,
            channel: None,
        }
    }

    pub fn channel(&self) -> Option<&ChannelOf<T>> {
        self.channel.as_ref()
    }

    /// Closes the channel and the connection, removes the playback sink and
    /// stops every local track. Every step is attempted even if an earlier one
    /// fails.
    pub async fn release(self) -> Result<(), CleanupError> {
        let mut failures = Vec::new();

        if let Some(channel) = self.channel {
            if let Err(e) = channel.close().await {
                failures.push(e);
            }
        }
        if let Some(peer) = self.peer {
            if let Err(e) = peer.close().await {
                failures.push(e);
            }
            if let Err(e) = peer.remove_playback().await {
                failures.push(e);
            }
        }
        for track in &self.tracks {
            debug!(track = track.id(), "Stopping local track");
            track.stop();
        }

        CleanupError::from_failures(failures)
    }
}

pub struct Negotiator<T: Transport> {
    transport: T,
    credentials: Arc<dyn CredentialSource>,
    signaler: Arc<dyn SdpSignaler>,
    channel_label: String,
}

impl<T: Transport> Negotiator<T> {
    pub fn new(
        transport: T,
        credentials: Arc<dyn CredentialSource>,
        signaler: Arc<dyn SdpSignaler>,
        channel_label: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            credentials,
            signaler,
            channel_label: channel_label.into(),
        }
    }

    /// Runs the full pipeline. `events` receives the transport's callbacks.
    #[instrument(name = "negotiate", skip_all, fields(channel = %self.channel_label))]
    pub async fn negotiate(
        &self,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Resources<T>, SessionError> {
        let credential = self.credentials.fetch().await?;
        debug!("Credential acquired");

        let tracks = self.transport.acquire_audio().await?;
        debug!(tracks = tracks.len(), "Local audio acquired");

        let mut resources = Resources::new(tracks);
        match self.connect(&mut resources, &credential, events).await {
            Ok(()) => {
                info!("Negotiation complete");
                Ok(resources)
            }
            Err(err) => {
                warn!(error = %err, "Negotiation failed, releasing partial resources");
                if let Err(cleanup) = resources.release().await {
                    warn!(error = %cleanup, "Cleanup after failed negotiation was incomplete");
                }
                Err(err)
            }
        }
    }

    async fn connect(
        &self,
        resources: &mut Resources<T>,
        credential: &EphemeralKey,
        events: Arc<dyn TransportEvents>,
    ) -> Result<(), SessionError> {
        let peer = resources
            .peer
            .insert(self.transport.create_peer(events).await?);
        for track in &resources.tracks {
            peer.add_track(track).await?;
        }
        resources.channel = Some(peer.create_control_channel(&self.channel_label).await?);

        let offer = peer.create_offer().await?;
        let answer = self.signaler.exchange(&offer, credential).await?;
        peer.apply_answer(&answer).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        credential::MockCredentialSource,
        error::{CredentialError, MediaAccessError, NegotiationError},
        signaling::MockSdpSignaler,
        testing::{FakeTransport, NoopEvents, accepting_signaler, valid_credentials},
    };

    fn negotiator(
        transport: &FakeTransport,
        credentials: MockCredentialSource,
        signaler: MockSdpSignaler,
    ) -> Negotiator<FakeTransport> {
        Negotiator::new(
            transport.clone(),
            Arc::new(credentials),
            Arc::new(signaler),
            "oai-events",
        )
    }

    #[tokio::test]
    async fn test_negotiate_runs_pipeline_in_order() {
        let transport = FakeTransport::default();
        let mut signaler = MockSdpSignaler::new();
        signaler
            .expect_exchange()
            .withf(|offer, key| offer.starts_with("v=0") && key.expose() == "ek_test")
            .times(1)
            .returning(|_, _| Ok("v=0\r\nanswer".to_string()));

        let resources = negotiator(&transport, valid_credentials(), signaler)
            .negotiate(Arc::new(NoopEvents))
            .await
            .unwrap();

        assert!(resources.channel().is_some());
        assert_eq!(
            transport.log(),
            vec![
                "1:acquire_audio",
                "1:create_peer",
                "1:add_track",
                "1:create_channel oai-events",
                "1:create_offer",
                "1:apply_answer",
            ]
        );
    }

    #[tokio::test]
    async fn test_credential_failure_acquires_nothing() {
        let transport = FakeTransport::default();
        let mut credentials = MockCredentialSource::new();
        credentials
            .expect_fetch()
            .returning(|| Err(CredentialError::Status(500)));

        let err = negotiator(&transport, credentials, MockSdpSignaler::new())
            .negotiate(Arc::new(NoopEvents))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, SessionError::Credential(CredentialError::Status(500))));
        assert!(transport.log().is_empty());
    }

    #[tokio::test]
    async fn test_media_failure_stops_before_peer() {
        let transport = FakeTransport::default();
        transport.behavior(|b| b.deny_audio = true);

        let err = negotiator(&transport, valid_credentials(), MockSdpSignaler::new())
            .negotiate(Arc::new(NoopEvents))
            .await
            .err()
            .unwrap();

        assert!(matches!(
            err,
            SessionError::MediaAccess(MediaAccessError::PermissionDenied(_))
        ));
        assert_eq!(transport.log(), vec!["1:acquire_audio"]);
    }

    #[tokio::test]
    async fn test_signaling_failure_releases_everything() {
        let transport = FakeTransport::default();
        let mut signaler = MockSdpSignaler::new();
        signaler
            .expect_exchange()
            .returning(|_, _| Err(NegotiationError::Status(400)));

        let err = negotiator(&transport, valid_credentials(), signaler)
            .negotiate(Arc::new(NoopEvents))
            .await
            .err()
            .unwrap();

        assert!(matches!(
            err,
            SessionError::Negotiation(NegotiationError::Status(400))
        ));
        assert_eq!(
            transport.log()[4..],
            [
                "1:create_offer",
                "1:channel.close",
                "1:peer.close",
                "1:playback.remove",
                "1:track.stop",
            ]
        );
    }

    #[tokio::test]
    async fn test_peer_failure_releases_tracks() {
        let transport = FakeTransport::default();
        transport.behavior(|b| b.fail_peer = true);

        let err = negotiator(&transport, valid_credentials(), MockSdpSignaler::new())
            .negotiate(Arc::new(NoopEvents))
            .await
            .err()
            .unwrap();

        assert!(matches!(
            err,
            SessionError::Negotiation(NegotiationError::Transport(_))
        ));
        assert_eq!(
            transport.log(),
            vec!["1:acquire_audio", "1:create_peer", "1:track.stop"]
        );
    }

    #[tokio::test]
    async fn test_channel_failure_closes_peer() {
        let transport = FakeTransport::default();
        transport.behavior(|b| b.fail_channel = true);

        negotiator(&transport, valid_credentials(), MockSdpSignaler::new())
            .negotiate(Arc::new(NoopEvents))
            .await
            .err()
            .unwrap();

        assert_eq!(
            transport.log(),
            vec![
                "1:acquire_audio",
                "1:create_peer",
                "1:add_track",
                "1:create_channel oai-events",
                "1:peer.close",
                "1:playback.remove",
                "1:track.stop",
            ]
        );
    }

    #[tokio::test]
    async fn test_answer_failure_releases_everything() {
        let transport = FakeTransport::default();
        transport.behavior(|b| b.fail_answer = true);

        negotiator(&transport, valid_credentials(), accepting_signaler())
            .negotiate(Arc::new(NoopEvents))
            .await
            .err()
            .unwrap();

        let log = transport.log();
        assert_eq!(log.last().map(String::as_str), Some("1:track.stop"));
        assert!(log.contains(&"1:channel.close".to_string()));
        assert!(log.contains(&"1:peer.close".to_string()));
    }

    #[tokio::test]
    async fn test_release_attempts_every_step() {
        let transport = FakeTransport::default();
        transport.behavior(|b| b.fail_channel_close = true);

        let resources = negotiator(&transport, valid_credentials(), accepting_signaler())
            .negotiate(Arc::new(NoopEvents))
            .await
            .unwrap();

        let err = resources.release().await.unwrap_err();
        assert_eq!(err.failures().len(), 1);
        let log = transport.log();
        assert!(log.ends_with(&[
            "1:channel.close".to_string(),
            "1:peer.close".to_string(),
            "1:playback.remove".to_string(),
            "1:track.stop".to_string(),
        ]));
    }
}
