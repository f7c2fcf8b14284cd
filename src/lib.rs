// Library crate for the planning poker sync core
// This file exposes the public API for integration tests

pub mod event;
pub mod room;
pub mod shared;
pub mod vote;

// Re-export commonly used types for easier access in tests
pub use event::transport::{
    inbound_channel, ConnectionState, InMemoryBroker, InMemoryTransport, MessageTransport,
    RedisTransport,
};
pub use event::{
    EventPublisher, EventSubscriber, PokerEvent, RepositoryMirror, RoomEventListener,
};
pub use room::{InMemoryRoomRepository, Room, RoomRepository, StoryCard};
pub use shared::AppError;
pub use vote::{Deck, Vote, VotingService, VotingSession};
