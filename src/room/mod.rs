// Public API - what other modules can use
pub use models::{Room, StoryCard};
pub use repository::{InMemoryRoomRepository, RoomRepository};

pub mod models;
pub mod repository;
