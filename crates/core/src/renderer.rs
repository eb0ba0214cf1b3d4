//! The narrow capability through which sessions report to a user interface.

use std::fmt;

/// Identifies one rendered message for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Who authored a rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Annotations attached to a new or updated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageFlags {
    /// The assistant was emitting audio when this text arrived.
    pub speaking: bool,
    /// More content for this message is still expected.
    pub in_progress: bool,
}

/// Consumer of session output.
///
/// Implementations must be cheap and non-blocking: they are invoked while the
/// session holds its dispatch lock.
pub trait Renderer: Send + Sync {
    fn on_new_message(&self, id: MessageId, role: Role, text: &str, flags: MessageFlags);

    /// `text` is the full current content of the message, not a delta.
    fn on_update_message(&self, id: MessageId, text: &str, flags: MessageFlags);

    fn on_finalize_message(&self, id: MessageId);

    fn on_status(&self, text: &str);

    /// Whether outbound messages can currently be sent.
    fn on_input_enabled(&self, _enabled: bool) {}
}
