//! Routes inbound control-channel events to conversation state and the renderer.

use crate::{
    event::ServerEvent,
    renderer::{MessageFlags, MessageId, Renderer, Role},
    state::ConversationState,
};
use std::sync::Arc;
use tracing::{debug, trace, warn};

const UNKNOWN_ERROR: &str = "Unknown error";

/// Applies control events, in arrival order, to a session's conversation state.
///
/// Every event produces at most one kind of side effect. Streamed responses and
/// transcripts use create-or-update semantics: the first fragment creates a
/// rendered message and later fragments update it until it is finalized.
pub struct EventDispatcher {
    state: ConversationState,
    renderer: Arc<dyn Renderer>,
}

impl EventDispatcher {
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self {
            state: ConversationState::default(),
            renderer,
        }
    }

    /// Parses and dispatches one raw message. Malformed input is logged and dropped.
    pub fn on_message(&mut self, raw: &str) {
        match ServerEvent::parse(raw) {
            Ok(event) => self.dispatch(event),
            Err(e) => warn!(error = %e, "Dropping malformed control message"),
        }
    }

    pub fn dispatch(&mut self, event: ServerEvent) {
        debug!(kind = event.kind(), "Dispatching control event");
        match event {
            ServerEvent::TextDelta { delta } => {
                if let Some(text) = delta.and_then(|d| d.text).filter(|t| !t.is_empty()) {
                    self.append_response(&text);
                }
            }
            ServerEvent::TextEnd => self.finish_response(),
            ServerEvent::SpeechStart => self.state.speaking = true,
            ServerEvent::SpeechEnd => self.state.speaking = false,
            ServerEvent::TranscriptPartial { transcript } => {
                if let Some(text) = transcript.filter(|t| !t.is_empty()) {
                    self.upsert_transcript(&text, true);
                }
            }
            ServerEvent::TranscriptFinal { transcript } => {
                if let Some(text) = transcript.filter(|t| !t.is_empty()) {
                    self.upsert_transcript(&text, false);
                }
            }
            ServerEvent::Error { error } => {
                let message = error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
                self.renderer.on_status(&format!("Error: {message}"));
            }
            ServerEvent::Unknown => trace!("Ignoring unrecognized control event"),
        }
    }

    /// Renders text the local user sent as a completed message.
    pub fn record_user_message(&mut self, text: &str) -> MessageId {
        let id = self.state.allocate_id();
        self.renderer
            .on_new_message(id, Role::User, text, MessageFlags::default());
        self.renderer.on_finalize_message(id);
        id
    }

    /// Finalizes anything still in progress. Used when the session is torn down.
    pub fn release(&mut self) {
        if let Some(id) = self.state.in_flight.take() {
            self.renderer.on_finalize_message(id);
        }
        if let Some(id) = self.state.transcript.take() {
            self.renderer.on_finalize_message(id);
        }
        self.state.assembly.clear();
        self.state.speaking = false;
    }

    /// The partially assembled assistant response.
    pub fn assembly(&self) -> &str {
        &self.state.assembly
    }

    pub fn is_speaking(&self) -> bool {
        self.state.speaking
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    fn append_response(&mut self, text: &str) {
        self.state.assembly.push_str(text);
        let flags = MessageFlags {
            speaking: self.state.speaking,
            in_progress: true,
        };
        match self.state.in_flight {
            Some(id) => self
                .renderer
                .on_update_message(id, &self.state.assembly, flags),
            None => {
                let id = self.state.allocate_id();
                self.state.in_flight = Some(id);
                self.renderer
                    .on_new_message(id, Role::Assistant, &self.state.assembly, flags);
            }
        }
    }

    fn finish_response(&mut self) {
        if let Some(id) = self.state.in_flight.take() {
            self.renderer.on_finalize_message(id);
        }
        self.state.assembly.clear();
    }

    fn upsert_transcript(&mut self, text: &str, partial: bool) {
        let flags = MessageFlags {
            speaking: false,
            in_progress: partial,
        };
        let id = match self.state.transcript {
            Some(id) => {
                self.renderer.on_update_message(id, text, flags);
                id
            }
            None => {
                let id = self.state.allocate_id();
                self.renderer.on_new_message(id, Role::User, text, flags);
                id
            }
        };
        if partial {
            self.state.transcript = Some(id);
        } else {
            self.state.transcript = None;
            self.renderer.on_finalize_message(id);
        }
    }
}
