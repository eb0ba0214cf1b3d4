//! Session lifecycle and conversation bookkeeping.

use crate::renderer::MessageId;
use std::fmt;

/// Lifecycle of a single session.
///
/// ```text
/// idle -> negotiating -> open -> closed
///              |           |
///              +-> failed <+
/// ```
///
/// `closed` and `failed` are terminal for a session; reconnecting always
/// creates a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Idle,
    Negotiating,
    Open,
    Closed,
    Failed,
}

impl Lifecycle {
    pub fn can_transition_to(self, next: Lifecycle) -> bool {
        use Lifecycle::*;
        matches!(
            (self, next),
            (Idle, Negotiating)
                | (Negotiating, Open)
                | (Negotiating, Failed)
                | (Open, Closed)
                | (Open, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Lifecycle::Closed | Lifecycle::Failed)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Idle => "idle",
            Lifecycle::Negotiating => "negotiating",
            Lifecycle::Open => "open",
            Lifecycle::Closed => "closed",
            Lifecycle::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Conversation state mutated by the event dispatcher.
#[derive(Debug, Default)]
pub struct ConversationState {
    /// Text of the assistant response currently being streamed.
    pub assembly: String,
    /// Whether the assistant is currently emitting audio.
    pub speaking: bool,
    /// The rendered message the assembly buffer is being streamed into.
    pub in_flight: Option<MessageId>,
    /// The rendered user transcript that is still being revised.
    pub transcript: Option<MessageId>,
    next_id: u64,
}

impl ConversationState {
    pub fn allocate_id(&mut self) -> MessageId {
        self.next_id += 1;
        MessageId(self.next_id)
    }

    pub fn is_streaming(&self) -> bool {
        self.in_flight.is_some()
    }
}
