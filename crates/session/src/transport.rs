use async_trait::async_trait;
use ws_tts_core::{ClientMessage, ServerMessage};

use crate::error::SessionError;

/// The read half of a session's transport, owned exclusively by the
/// synthesis task (spec §5). Implemented in `ws-tts-server` over a split
/// WebSocket stream.
#[async_trait]
pub trait InboundTransport: Send {
    /// Returns `Ok(None)` when the transport closed cleanly.
    async fn recv(&mut self) -> Result<Option<ClientMessage>, SessionError>;
}

/// The write half of a session's transport, owned exclusively by the send
/// task (spec §5). The send task is the only code path allowed to write to
/// the transport — the synthesis path must not bypass the queue.
#[async_trait]
pub trait OutboundTransport: Send {
    async fn send(&mut self, msg: ServerMessage) -> Result<(), SessionError>;
    async fn close(&mut self);
}
