use tokio::sync::mpsc;

use crate::{DebuggerTransport, Outgoing, ProtocolError};

/// Transport that forwards commands over a tokio channel.
///
/// The receiving half is owned by whatever task encodes commands for the real
/// backend connection.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DebuggerTransport for ChannelTransport {
    fn send(&mut self, request: Outgoing) -> Result<(), ProtocolError> {
        let id = request.id;
        self.tx.send(request).map_err(|_| {
            tracing::debug!(target: "spyglass.protocol", request = %id, "outgoing channel closed");
            ProtocolError::Disconnected
        })
    }
}
