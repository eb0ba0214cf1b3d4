//! A single realtime session: lifecycle, control-channel gating and teardown.

use crate::{
    dispatcher::EventDispatcher,
    error::{CleanupError, SessionError, TransportError},
    event::ClientEvent,
    negotiator::{Negotiator, Resources},
    renderer::Renderer,
    state::Lifecycle,
    transport::{ControlChannel, Transport, TransportEvents},
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{Instrument, debug, info, info_span, trace, warn};

/// State shared between a session handle and its transport callbacks.
struct SessionShared<T: Transport> {
    id: u64,
    renderer: Arc<dyn Renderer>,
    inner: Mutex<SharedInner>,
    /// Held while the session is open. Whoever ends the session takes and
    /// releases them: the owner on `close`, a callback on remote close or
    /// transport failure.
    resources: tokio::sync::Mutex<Option<Resources<T>>>,
}

struct SharedInner {
    lifecycle: Lifecycle,
    channel_open: bool,
    input_enabled: bool,
    dispatcher: EventDispatcher,
}

impl<T: Transport> SessionShared<T> {
    fn new(id: u64, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            id,
            inner: Mutex::new(SharedInner {
                lifecycle: Lifecycle::Idle,
                channel_open: false,
                input_enabled: false,
                dispatcher: EventDispatcher::new(renderer.clone()),
            }),
            renderer,
            resources: tokio::sync::Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SharedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lock().lifecycle
    }

    fn transition(&self, next: Lifecycle) -> bool {
        let mut inner = self.lock();
        self.transition_locked(&mut inner, next)
    }

    fn transition_locked(&self, inner: &mut SharedInner, next: Lifecycle) -> bool {
        let from = inner.lifecycle;
        if !from.can_transition_to(next) {
            debug!(session = self.id, %from, to = %next, "Ignoring illegal lifecycle transition");
            return false;
        }
        inner.lifecycle = next;
        info!(session = self.id, %from, to = %next, "Session lifecycle changed");
        self.refresh_input(inner);
        true
    }

    /// Sending is possible only while open and the channel reports open.
    fn refresh_input(&self, inner: &mut SharedInner) {
        let enabled = inner.lifecycle == Lifecycle::Open && inner.channel_open;
        if enabled != inner.input_enabled {
            inner.input_enabled = enabled;
            self.renderer.on_input_enabled(enabled);
        }
    }

    fn status(&self, text: &str) {
        info!(session = self.id, status = text);
        self.renderer.on_status(text);
    }

    /// Releases whatever transport resources are still held. Cleanup failures
    /// are logged only.
    async fn release_resources(&self) {
        let resources = self.resources.lock().await.take();
        if let Some(resources) = resources {
            if let Err(e) = resources.release().await {
                warn!(session = self.id, error = %e, "Cleanup after the session ended was incomplete");
            }
        }
    }
}

#[async_trait]
impl<T: Transport> TransportEvents for SessionShared<T> {
    async fn on_channel_open(&self) {
        let mut inner = self.lock();
        if inner.lifecycle.is_terminal() {
            return;
        }
        inner.channel_open = true;
        self.status("Data channel opened");
        self.refresh_input(&mut inner);
    }

    async fn on_channel_close(&self) {
        let ended = {
            let mut inner = self.lock();
            if inner.lifecycle.is_terminal() {
                return;
            }
            inner.channel_open = false;
            let ended = inner.lifecycle == Lifecycle::Open
                && self.transition_locked(&mut inner, Lifecycle::Closed);
            if ended {
                inner.dispatcher.release();
            }
            self.status("Data channel closed");
            self.refresh_input(&mut inner);
            ended
        };
        if ended {
            self.release_resources().await;
        }
    }

    async fn on_channel_message(&self, raw: &str) {
        let mut inner = self.lock();
        if inner.lifecycle.is_terminal() {
            trace!(session = self.id, "Dropping message for a finished session");
            return;
        }
        inner.dispatcher.on_message(raw);
    }

    async fn on_remote_track(&self, track_id: &str) {
        if self.lifecycle().is_terminal() {
            return;
        }
        debug!(session = self.id, track = track_id, "Remote track bound to playback");
        self.status("Received audio track");
    }

    async fn on_transport_failed(&self, reason: &str) {
        {
            let mut inner = self.lock();
            if !self.transition_locked(&mut inner, Lifecycle::Failed) {
                return;
            }
            inner.channel_open = false;
            inner.dispatcher.release();
            self.refresh_input(&mut inner);
        }
        warn!(session = self.id, reason, "Transport failed");
        self.status(&format!("Error: {reason}"));
        self.release_resources().await;
    }
}

/// One negotiated connection to the remote endpoint.
///
/// A session is single-use: once it is closed or has failed it stays that way,
/// and reconnecting means starting a new session.
pub struct Session<T: Transport> {
    shared: Arc<SessionShared<T>>,
}

impl<T: Transport> Session<T> {
    pub fn new(id: u64, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            shared: Arc::new(SessionShared::new(id, renderer)),
        }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.lifecycle()
    }

    /// Whether this session currently holds any transport resources. A release
    /// in progress counts as holding.
    pub fn holds_resources(&self) -> bool {
        self.shared
            .resources
            .try_lock()
            .map_or(true, |resources| resources.is_some())
    }

    /// The partially streamed assistant response, if any.
    pub fn assembly(&self) -> String {
        self.shared.lock().dispatcher.assembly().to_string()
    }

    pub fn is_speaking(&self) -> bool {
        self.shared.lock().dispatcher.is_speaking()
    }

    /// Drives this idle session through negotiation.
    pub async fn negotiate(&mut self, negotiator: &Negotiator<T>) -> Result<(), SessionError> {
        if !self.shared.transition(Lifecycle::Negotiating) {
            return Err(TransportError::new("session has already been started").into());
        }

        let span = info_span!("session", id = self.id());
        let events: Arc<dyn TransportEvents> = self.shared.clone();
        match negotiator.negotiate(events).instrument(span).await {
            Ok(resources) => {
                // Stored before opening so a failure callback racing the
                // transition still finds them.
                *self.shared.resources.lock().await = Some(resources);
                if self.shared.transition(Lifecycle::Open) {
                    self.shared.status("Connection established");
                    return Ok(());
                }
                // The transport failed while the answer was being applied.
                self.shared.release_resources().await;
                Err(TransportError::new("connection failed during negotiation").into())
            }
            Err(err) => {
                self.shared.transition(Lifecycle::Failed);
                self.shared.status(&format!("Error: {err}"));
                Err(err)
            }
        }
    }

    /// Whether an outbound control message would currently be sent.
    pub fn can_send(&self) -> bool {
        self.lifecycle() == Lifecycle::Open
            && self.shared.resources.try_lock().is_ok_and(|resources| {
                resources
                    .as_ref()
                    .and_then(Resources::channel)
                    .is_some_and(|c| c.is_open())
            })
    }

    /// Sends a control message. Returns `false`, without side effects, unless
    /// the session and its channel are open.
    pub async fn send(&self, event: &ClientEvent) -> bool {
        if self.lifecycle() != Lifecycle::Open {
            debug!(session = self.id(), "Not sending: session is not open");
            return false;
        }
        let resources = self.shared.resources.lock().await;
        let Some(channel) = resources.as_ref().and_then(Resources::channel) else {
            return false;
        };
        if !channel.is_open() {
            debug!(session = self.id(), "Not sending: control channel is not open");
            return false;
        }

        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize control message");
                return false;
            }
        };
        match channel.send_text(payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!(session = self.id(), error = %e, "Failed to send control message");
                false
            }
        }
    }

    /// Renders `text` as a user message and asks the endpoint to respond to it.
    pub async fn send_text(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() || !self.can_send() {
            return false;
        }
        self.shared.lock().dispatcher.record_user_message(text);
        self.send(&ClientEvent::respond_to(text)).await
    }

    /// Tears the session down and releases every resource it holds.
    pub async fn close(&mut self) -> Result<(), CleanupError> {
        {
            let mut inner = self.shared.lock();
            if inner.lifecycle == Lifecycle::Open {
                self.shared.transition_locked(&mut inner, Lifecycle::Closed);
            }
            inner.channel_open = false;
            inner.dispatcher.release();
            self.shared.refresh_input(&mut inner);
        }

        let resources = self.shared.resources.lock().await.take();
        match resources {
            Some(resources) => {
                let result = resources.release().await;
                self.shared.status("Connection closed");
                result
            }
            None => Ok(()),
        }
    }
}
