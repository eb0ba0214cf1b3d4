use crate::{
    error::{CleanupError, SessionError},
    negotiator::Negotiator,
    renderer::Renderer,
    session::Session,
    transport::Transport,
};
use std::sync::Arc;
use tracing::warn;

/// Owns at most one session at a time.
pub struct RealtimeClient<T: Transport> {
    negotiator: Negotiator<T>,
    renderer: Arc<dyn Renderer>,
    current: Option<Session<T>>,
    next_id: u64,
}

impl<T: Transport> RealtimeClient<T> {
    pub fn new(negotiator: Negotiator<T>, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            negotiator,
            renderer,
            current: None,
            next_id: 0,
        }
    }

    /// Tears down the current session, if any, then negotiates a new one.
    ///
    /// Teardown failures are logged and never prevent the new session from
    /// starting. A failed negotiation leaves a `failed` session in place.
    pub async fn start_session(&mut self) -> Result<&Session<T>, SessionError> {
        if let Some(mut previous) = self.current.take() {
            if let Err(e) = previous.close().await {
                warn!(session = previous.id(), error = %e, "Failed to tear down previous session");
            }
        }

        self.next_id += 1;
        let mut session = Session::new(self.next_id, self.renderer.clone());
        let result = session.negotiate(&self.negotiator).await;
        let session = self.current.insert(session);
        result.map(|()| &*session)
    }

    pub fn session(&self) -> Option<&Session<T>> {
        self.current.as_ref()
    }

    pub async fn send_text(&self, text: &str) -> bool {
        match &self.current {
            Some(session) => session.send_text(text).await,
            None => false,
        }
    }

    pub async fn close(&mut self) -> Result<(), CleanupError> {
        match self.current.as_mut() {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }
}
