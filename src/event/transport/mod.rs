// Broker transports.
//
// The subscriber side of a transport pushes raw messages into a bounded
// channel supplied at construction; decoding and handler dispatch happen on
// the application side, so synthetic messages can be fed in tests without a
// broker.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::shared::AppError;

// Public API - what other modules can use
pub use memory::{InMemoryBroker, InMemoryTransport};
pub use redis::RedisTransport;

mod memory;
mod redis;

/// Capacity of the inbound queue between network receive and event
/// processing.
pub const INBOUND_CAPACITY: usize = 256;

/// A raw message as received from the broker, before decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
}

/// Connection lifecycle. `Disconnected` is terminal and entered only by an
/// explicit disconnect; lost connections cycle back through `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ConnectionLost,
}

/// Seam between the event layer and a concrete broker client.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Fire-and-forget broadcast: resolves once the broker has accepted the
    /// message, never waits for subscribers.
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), AppError>;

    /// Registers interest in a topic. Reasserted automatically after a
    /// reconnect.
    async fn subscribe(&self, topic: &str) -> Result<(), AppError>;

    /// Explicit shutdown; the terminal state.
    async fn disconnect(&self);

    fn state(&self) -> ConnectionState;
}

/// The inbound channel pair a transport is constructed around.
pub fn inbound_channel() -> (mpsc::Sender<InboundMessage>, mpsc::Receiver<InboundMessage>) {
    mpsc::channel(INBOUND_CAPACITY)
}
