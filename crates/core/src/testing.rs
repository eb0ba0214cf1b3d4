//! In-memory fakes used by the unit tests of this crate.

use crate::{
    credential::{EphemeralKey, MockCredentialSource},
    error::{MediaAccessError, TransportError},
    renderer::{MessageFlags, MessageId, Renderer, Role},
    signaling::MockSdpSignaler,
    transport::{ControlChannel, MediaTrack, PeerConnection, Transport, TransportEvents},
};
use async_trait::async_trait;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    New {
        id: MessageId,
        role: Role,
        text: String,
        flags: MessageFlags,
    },
    Update {
        id: MessageId,
        text: String,
        flags: MessageFlags,
    },
    Finalize(MessageId),
    Status(String),
    Input(bool),
}

impl Rendered {
    pub fn new(id: u64, role: Role, text: &str, flags: MessageFlags) -> Self {
        Rendered::New {
            id: MessageId(id),
            role,
            text: text.to_string(),
            flags,
        }
    }

    pub fn update(id: u64, text: &str, flags: MessageFlags) -> Self {
        Rendered::Update {
            id: MessageId(id),
            text: text.to_string(),
            flags,
        }
    }
}

#[derive(Default)]
pub struct RecordingRenderer {
    events: Mutex<Vec<Rendered>>,
}

impl RecordingRenderer {
    /// Drains everything recorded so far.
    pub fn take(&self) -> Vec<Rendered> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    pub fn statuses(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Rendered::Status(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Rendered) {
        self.events.lock().unwrap().push(event);
    }
}

impl Renderer for RecordingRenderer {
    fn on_new_message(&self, id: MessageId, role: Role, text: &str, flags: MessageFlags) {
        self.push(Rendered::New {
            id,
            role,
            text: text.to_string(),
            flags,
        });
    }

    fn on_update_message(&self, id: MessageId, text: &str, flags: MessageFlags) {
        self.push(Rendered::Update {
            id,
            text: text.to_string(),
            flags,
        });
    }

    fn on_finalize_message(&self, id: MessageId) {
        self.push(Rendered::Finalize(id));
    }

    fn on_status(&self, text: &str) {
        self.push(Rendered::Status(text.to_string()));
    }

    fn on_input_enabled(&self, enabled: bool) {
        self.push(Rendered::Input(enabled));
    }
}

pub struct NoopEvents;

#[async_trait]
impl TransportEvents for NoopEvents {
    async fn on_channel_open(&self) {}
    async fn on_channel_close(&self) {}
    async fn on_channel_message(&self, _raw: &str) {}
    async fn on_remote_track(&self, _track_id: &str) {}
    async fn on_transport_failed(&self, _reason: &str) {}
}

pub fn valid_credentials() -> MockCredentialSource {
    let mut credentials = MockCredentialSource::new();
    credentials
        .expect_fetch()
        .returning(|| Ok(EphemeralKey::new("ek_test")));
    credentials
}

pub fn accepting_signaler() -> MockSdpSignaler {
    let mut signaler = MockSdpSignaler::new();
    signaler
        .expect_exchange()
        .returning(|_, _| Ok("v=0\r\nfake answer".to_string()));
    signaler
}

/// Failure injection knobs for [`FakeTransport`].
#[derive(Debug, Default, Clone)]
pub struct FakeBehavior {
    pub deny_audio: bool,
    pub fail_peer: bool,
    pub fail_channel: bool,
    pub fail_answer: bool,
    pub fail_channel_close: bool,
    /// Open the control channel as soon as the answer is applied.
    pub open_on_answer: bool,
    /// Report a transport failure while the answer is being applied.
    pub fail_transport_on_answer: bool,
}

/// A transport that records every operation as `"<generation>:<op>"`.
///
/// The generation increments each time audio is acquired, i.e. once per
/// negotiation attempt that gets past the credential step.
#[derive(Clone, Default)]
pub struct FakeTransport {
    log: Arc<Mutex<Vec<String>>>,
    behavior: Arc<Mutex<FakeBehavior>>,
    generation: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<String>>>,
    events: Arc<Mutex<Option<Arc<dyn TransportEvents>>>>,
    channel_open: Arc<Mutex<Option<Arc<AtomicBool>>>>,
}

impl FakeTransport {
    pub fn behavior(&self, f: impl FnOnce(&mut FakeBehavior)) {
        f(&mut self.behavior.lock().unwrap());
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// The events handle of the most recently created peer.
    pub fn events(&self) -> Arc<dyn TransportEvents> {
        self.events
            .lock()
            .unwrap()
            .clone()
            .expect("no peer has been created")
    }

    /// Simulates the remote side opening the latest control channel.
    pub async fn open_channel(&self) {
        let flag = self.channel_open.lock().unwrap().clone();
        if let Some(flag) = flag {
            flag.store(true, Ordering::SeqCst);
        }
        self.events().on_channel_open().await;
    }

    /// Simulates the remote side closing the latest control channel.
    pub async fn remote_close(&self) {
        let flag = self.channel_open.lock().unwrap().clone();
        if let Some(flag) = flag {
            flag.store(false, Ordering::SeqCst);
        }
        self.events().on_channel_close().await;
    }

    fn record(&self, generation: usize, op: impl AsRef<str>) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{generation}:{}", op.as_ref()));
    }

    fn current(&self) -> usize {
        self.generation.load(Ordering::SeqCst)
    }
}

pub struct FakeTrack {
    id: String,
    generation: usize,
    transport: FakeTransport,
    stopped: AtomicBool,
}

impl MediaTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.transport.record(self.generation, "track.stop");
        }
    }
}

pub struct FakeChannel {
    generation: usize,
    transport: FakeTransport,
    open: Arc<AtomicBool>,
}

#[async_trait]
impl ControlChannel for FakeChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.transport.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.transport.record(self.generation, "channel.close");
        self.open.store(false, Ordering::SeqCst);
        if self.transport.behavior.lock().unwrap().fail_channel_close {
            return Err(TransportError::new("channel close failed"));
        }
        Ok(())
    }
}

pub struct FakePeer {
    generation: usize,
    transport: FakeTransport,
    events: Arc<dyn TransportEvents>,
}

#[async_trait]
impl PeerConnection for FakePeer {
    type Track = FakeTrack;
    type Channel = FakeChannel;

    async fn add_track(&self, _track: &FakeTrack) -> Result<(), TransportError> {
        self.transport.record(self.generation, "add_track");
        Ok(())
    }

    async fn create_control_channel(&self, label: &str) -> Result<FakeChannel, TransportError> {
        self.transport
            .record(self.generation, format!("create_channel {label}"));
        if self.transport.behavior.lock().unwrap().fail_channel {
            return Err(TransportError::new("data channel refused"));
        }
        let open = Arc::new(AtomicBool::new(false));
        *self.transport.channel_open.lock().unwrap() = Some(open.clone());
        Ok(FakeChannel {
            generation: self.generation,
            transport: self.transport.clone(),
            open,
        })
    }

    async fn create_offer(&self) -> Result<String, TransportError> {
        self.transport.record(self.generation, "create_offer");
        Ok("v=0\r\nfake offer".to_string())
    }

    async fn apply_answer(&self, _sdp: &str) -> Result<(), TransportError> {
        self.transport.record(self.generation, "apply_answer");
        let behavior = self.transport.behavior.lock().unwrap().clone();
        if behavior.fail_answer {
            return Err(TransportError::new("remote description rejected"));
        }
        if behavior.fail_transport_on_answer {
            self.events.on_transport_failed("ice failed").await;
        }
        if behavior.open_on_answer {
            let flag = self.transport.channel_open.lock().unwrap().clone();
            if let Some(flag) = flag {
                flag.store(true, Ordering::SeqCst);
            }
            self.events.on_channel_open().await;
        }
        Ok(())
    }

    async fn remove_playback(&self) -> Result<(), TransportError> {
        self.transport.record(self.generation, "playback.remove");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.transport.record(self.generation, "peer.close");
        Ok(())
    }
}

#[async_trait]
impl Transport for FakeTransport {
    type Track = FakeTrack;
    type Peer = FakePeer;

    async fn acquire_audio(&self) -> Result<Vec<FakeTrack>, MediaAccessError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(generation, "acquire_audio");
        if self.behavior.lock().unwrap().deny_audio {
            return Err(MediaAccessError::PermissionDenied("user dismissed prompt".into()));
        }
        Ok(vec![FakeTrack {
            id: format!("mic-{generation}"),
            generation,
            transport: self.clone(),
            stopped: AtomicBool::new(false),
        }])
    }

    async fn create_peer(
        &self,
        events: Arc<dyn TransportEvents>,
    ) -> Result<FakePeer, TransportError> {
        let generation = self.current();
        self.record(generation, "create_peer");
        if self.behavior.lock().unwrap().fail_peer {
            return Err(TransportError::new("peer connection refused"));
        }
        *self.events.lock().unwrap() = Some(events.clone());
        Ok(FakePeer {
            generation,
            transport: self.clone(),
            events,
        })
    }
}
