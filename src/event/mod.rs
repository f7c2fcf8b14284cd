// Event synchronization layer.
//
// Domain events travel as flat JSON payloads on well-known broker topics.
// The publisher broadcasts local mutations; the subscriber applies inbound
// events to the local repository through registered handlers, so every
// process view converges without coordination beyond the broker.

// Public API - what other modules can use
pub use events::{
    CardsRevealed, ModeChanged, PlayerJoined, PokerEvent, RoomCreated, RoomsUpdated, StoryCreated,
    StoryScored,
};
pub use listener::RoomEventListener;
pub use mirror::RepositoryMirror;
pub use publisher::EventPublisher;
pub use subscriber::EventSubscriber;

pub mod events;
pub mod transport;

mod listener;
mod mirror;
mod publisher;
mod subscriber;
