use async_trait::async_trait;

use super::events::{CardsRevealed, ModeChanged, PlayerJoined, StoryCreated, StoryScored};

/// Trait for components reacting to the events scoped to the active room.
///
/// Every method defaults to a no-op so implementors override only what they
/// care about. Handlers should be idempotent — the broker may deliver a
/// message more than once.
#[async_trait]
pub trait RoomEventListener: Send + Sync {
    async fn on_player_joined(&self, _event: PlayerJoined) {}

    async fn on_story_created(&self, _event: StoryCreated) {}

    async fn on_story_scored(&self, _event: StoryScored) {}

    async fn on_cards_revealed(&self, _event: CardsRevealed) {}

    async fn on_mode_changed(&self, _event: ModeChanged) {}

    /// Get a human-readable name for this listener (for logging/debugging)
    fn listener_name(&self) -> &'static str;
}
