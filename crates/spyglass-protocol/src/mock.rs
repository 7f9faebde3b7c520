use crate::{Command, DebuggerTransport, Outgoing, ProtocolError};
use spyglass_core::RequestId;

/// Deterministic, in-memory transport test double.
///
/// Every command handed to [`DebuggerTransport::send`] is recorded so tests
/// can assert on exactly what reached the backend and answer it later.
#[derive(Debug, Default)]
pub struct MockTransport {
    disconnected: bool,
    pub sent: Vec<Outgoing>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent sends fail with [`ProtocolError::Disconnected`].
    pub fn set_disconnected(&mut self, disconnected: bool) {
        self.disconnected = disconnected;
    }

    /// Drains the recorded commands.
    pub fn take_sent(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.sent)
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.sent.iter().map(|outgoing| &outgoing.command)
    }

    /// Id of the most recent request matching `predicate`.
    pub fn last_request(&self, predicate: impl Fn(&Command) -> bool) -> Option<RequestId> {
        self.sent
            .iter()
            .rev()
            .find(|outgoing| predicate(&outgoing.command))
            .map(|outgoing| outgoing.id)
    }

    pub fn count(&self, predicate: impl Fn(&Command) -> bool) -> usize {
        self.commands().filter(|command| predicate(command)).count()
    }
}

impl DebuggerTransport for MockTransport {
    fn send(&mut self, request: Outgoing) -> Result<(), ProtocolError> {
        if self.disconnected {
            return Err(ProtocolError::Disconnected);
        }
        self.sent.push(request);
        Ok(())
    }
}
