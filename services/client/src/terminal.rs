//! Renders a session's transcript as plain lines on a terminal.

use parley_core::{MessageFlags, MessageId, Renderer, Role};
use std::{
    collections::HashMap,
    io::Write,
    sync::{Mutex, PoisonError},
};
use tracing::{debug, warn};

struct Printed {
    role: Role,
    text: String,
}

struct Inner<W> {
    out: W,
    messages: HashMap<MessageId, Printed>,
    /// The message whose line is still being extended, if any.
    open_line: Option<MessageId>,
}

/// Streams assistant text as it arrives. Each message gets its own line,
/// prefixed with who wrote it.
pub struct TerminalRenderer<W: Write + Send> {
    inner: Mutex<Inner<W>>,
}

fn label(role: Role, flags: MessageFlags) -> &'static str {
    match (role, flags.speaking) {
        (Role::User, _) => "You",
        (Role::Assistant, true) => "Assistant (speaking)",
        (Role::Assistant, false) => "Assistant",
    }
}

impl<W: Write + Send> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            inner: Mutex::new(Inner {
                out,
                messages: HashMap::new(),
                open_line: None,
            }),
        }
    }

    /// Hands back the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .out
    }

    fn with<F>(&self, f: F)
    where
        F: FnOnce(&mut Inner<W>) -> std::io::Result<()>,
    {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = f(&mut *inner).and_then(|()| inner.out.flush()) {
            warn!(error = %e, "Failed to write to terminal");
        }
    }
}

impl<W> Inner<W>
where
    W: Write,
{
    fn end_open_line(&mut self) -> std::io::Result<()> {
        if self.open_line.take().is_some() {
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn start_line(
        &mut self,
        id: MessageId,
        role: Role,
        text: &str,
        flags: MessageFlags,
    ) -> std::io::Result<()> {
        self.end_open_line()?;
        write!(self.out, "{}: {}", label(role, flags), text)?;
        self.finish(id, flags)
    }

    fn finish(&mut self, id: MessageId, flags: MessageFlags) -> std::io::Result<()> {
        if flags.in_progress {
            self.open_line = Some(id);
        } else {
            writeln!(self.out)?;
            self.open_line = None;
        }
        Ok(())
    }
}

impl<W: Write + Send> Renderer for TerminalRenderer<W> {
    fn on_new_message(&self, id: MessageId, role: Role, text: &str, flags: MessageFlags) {
        self.with(|inner| {
            inner.messages.insert(
                id,
                Printed {
                    role,
                    text: text.to_string(),
                },
            );
            inner.start_line(id, role, text, flags)
        });
    }

    fn on_update_message(&self, id: MessageId, text: &str, flags: MessageFlags) {
        self.with(|inner| {
            let Some(printed) = inner.messages.get_mut(&id) else {
                debug!(%id, "Update for unknown message");
                return Ok(());
            };
            let role = printed.role;
            let previous = std::mem::replace(&mut printed.text, text.to_string());

            match text.strip_prefix(previous.as_str()) {
                Some(suffix) if inner.open_line == Some(id) => {
                    write!(inner.out, "{suffix}")?;
                    inner.finish(id, flags)
                }
                _ => inner.start_line(id, role, text, flags),
            }
        });
    }

    fn on_finalize_message(&self, id: MessageId) {
        self.with(|inner| {
            inner.messages.remove(&id);
            if inner.open_line == Some(id) {
                inner.end_open_line()?;
            }
            Ok(())
        });
    }

    fn on_status(&self, text: &str) {
        self.with(|inner| {
            inner.end_open_line()?;
            writeln!(inner.out, "[{text}]")
        });
    }

    fn on_input_enabled(&self, enabled: bool) {
        debug!(enabled, "Input availability changed");
    }
}
