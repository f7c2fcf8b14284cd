use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::models::{Room, StoryCard};
use crate::shared::AppError;
use crate::vote::value::Vote;

pub const DEFAULT_MODE: &str = "Scrum";

/// Trait for the session store: sole authority for room and story existence,
/// membership, votes, and the process's session context.
///
/// Instances are constructed explicitly and injected as `Arc<dyn
/// RoomRepository>`; nothing in the crate reaches for a global.
#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// Creates a room under a generated `room <n>` code, adds the creator as
    /// its first player, and makes it the process's active room.
    async fn create_room(&self, name: &str, creator: &str) -> String;

    /// Inserts a room received from a remote peer, keeping any existing room
    /// under the same code (a process's own echo must not clobber newer
    /// local state).
    async fn insert_room(&self, room: Room);

    async fn get_room(&self, code: &str) -> Option<Room>;

    async fn available_room_codes(&self) -> Vec<String>;

    /// Idempotent membership add. False only when the room does not exist.
    async fn join_room(&self, code: &str, player: &str) -> bool;

    async fn schedule_room(&self, code: &str, slot: &str) -> bool;

    /// Allocates a `story_<n>` id and adds the card to the room.
    /// `None` when the room does not exist.
    async fn create_story(&self, code: &str, title: &str, description: &str) -> Option<String>;

    /// Inserts a story received from a remote peer, create-if-absent.
    async fn insert_story(&self, code: &str, card: StoryCard) -> bool;

    async fn get_story(&self, code: &str, story_id: &str) -> Option<StoryCard>;

    /// Last-write-wins vote set plus average recomputation, atomically.
    /// `Ok(false)` when the room or story is absent; a blank player name is
    /// the caller's error.
    async fn update_story_score(
        &self,
        code: &str,
        story_id: &str,
        player: &str,
        vote: Vote,
    ) -> Result<bool, AppError>;

    async fn remove_story_score(&self, code: &str, story_id: &str, player: &str) -> bool;

    /// Marks the story revealed, forces average recomputation, and returns
    /// the fresh average. `None` when the room or story is absent.
    async fn reveal_cards(&self, code: &str, story_id: &str) -> Option<f64>;

    async fn set_cards_revealed(&self, code: &str, story_id: &str, revealed: bool) -> bool;

    async fn clear_story_votes(&self, code: &str, story_id: &str) -> bool;

    // Session context: which room and player this process acts as, and the
    // estimation mode in effect.

    async fn current_room_code(&self) -> Option<String>;
    async fn set_current_room_code(&self, code: Option<String>);
    async fn logged_in_user(&self) -> Option<String>;
    async fn set_logged_in_user(&self, player: &str);
    async fn current_mode(&self) -> String;
    async fn set_current_mode(&self, mode: &str);
}

#[derive(Debug)]
struct SessionContext {
    current_room: Option<String>,
    logged_in_user: Option<String>,
    mode: String,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            current_room: None,
            logged_in_user: None,
            mode: DEFAULT_MODE.to_string(),
        }
    }
}

/// In-memory implementation of `RoomRepository`.
///
/// One mutex guards the room map, so every compound read-modify-write (vote
/// plus recomputation, reveal plus recomputation) is atomic under a single
/// lock acquisition; id counters are atomics shared with the lock-free
/// accessor paths.
pub struct InMemoryRoomRepository {
    rooms: Mutex<HashMap<String, Room>>,
    room_counter: AtomicU64,
    story_counter: AtomicU64,
    context: Mutex<SessionContext>,
}

impl Default for InMemoryRoomRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRoomRepository {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            room_counter: AtomicU64::new(1),
            story_counter: AtomicU64::new(1),
            context: Mutex::new(SessionContext::default()),
        }
    }

    /// Keeps the local counter ahead of codes seen from remote peers so
    /// cross-process `room <n>` collisions stay unlikely.
    fn advance_room_counter(&self, code: &str) {
        if let Some(n) = code.strip_prefix("room ").and_then(|n| n.parse::<u64>().ok()) {
            self.room_counter.fetch_max(n + 1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl RoomRepository for InMemoryRoomRepository {
    #[instrument(skip(self))]
    async fn create_room(&self, name: &str, creator: &str) -> String {
        let code = format!("room {}", self.room_counter.fetch_add(1, Ordering::SeqCst));
        let room = Room::new(&code, name, creator);

        self.rooms.lock().unwrap().insert(code.clone(), room);
        self.context.lock().unwrap().current_room = Some(code.clone());

        info!(room_code = %code, room_name = %name, creator = %creator, "Room created");
        code
    }

    #[instrument(skip(self, room))]
    async fn insert_room(&self, room: Room) {
        self.advance_room_counter(&room.code);

        let mut rooms = self.rooms.lock().unwrap();
        if rooms.contains_key(&room.code) {
            debug!(room_code = %room.code, "Room already known, keeping local state");
            return;
        }
        debug!(room_code = %room.code, room_name = %room.name, "Mirroring remote room");
        rooms.insert(room.code.clone(), room);
    }

    async fn get_room(&self, code: &str) -> Option<Room> {
        self.rooms.lock().unwrap().get(code).cloned()
    }

    async fn available_room_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.rooms.lock().unwrap().keys().cloned().collect();
        codes.sort();
        codes
    }

    #[instrument(skip(self))]
    async fn join_room(&self, code: &str, player: &str) -> bool {
        let mut rooms = self.rooms.lock().unwrap();
        match rooms.get_mut(code) {
            Some(room) => {
                room.add_player(player);
                info!(room_code = %code, player = %player, players = room.player_count(), "Player joined room");
                true
            }
            None => {
                debug!(room_code = %code, player = %player, "Join failed, room not found");
                false
            }
        }
    }

    #[instrument(skip(self))]
    async fn schedule_room(&self, code: &str, slot: &str) -> bool {
        let mut rooms = self.rooms.lock().unwrap();
        match rooms.get_mut(code) {
            Some(room) => {
                room.schedule(slot);
                debug!(room_code = %code, slot = %slot, "Room scheduled");
                true
            }
            None => false,
        }
    }

    #[instrument(skip(self))]
    async fn create_story(&self, code: &str, title: &str, description: &str) -> Option<String> {
        let mut rooms = self.rooms.lock().unwrap();
        let room = match rooms.get_mut(code) {
            Some(room) => room,
            None => {
                debug!(room_code = %code, "Story not created, room not found");
                return None;
            }
        };

        let story_id = format!("story_{}", self.story_counter.fetch_add(1, Ordering::SeqCst));
        room.add_story(StoryCard::new(&story_id, title, description));

        info!(room_code = %code, story_id = %story_id, title = %title, "Story created");
        Some(story_id)
    }

    #[instrument(skip(self, card))]
    async fn insert_story(&self, code: &str, card: StoryCard) -> bool {
        let mut rooms = self.rooms.lock().unwrap();
        let room = match rooms.get_mut(code) {
            Some(room) => room,
            None => {
                debug!(room_code = %code, story_id = %card.id, "Story dropped, room not found");
                return false;
            }
        };

        let story_id = card.id.clone();
        if room.add_story(card) {
            debug!(room_code = %code, story_id = %story_id, "Mirroring remote story");
            true
        } else {
            debug!(room_code = %code, story_id = %story_id, "Story already known, keeping local state");
            false
        }
    }

    async fn get_story(&self, code: &str, story_id: &str) -> Option<StoryCard> {
        self.rooms
            .lock()
            .unwrap()
            .get(code)
            .and_then(|room| room.story(story_id))
            .cloned()
    }

    #[instrument(skip(self))]
    async fn update_story_score(
        &self,
        code: &str,
        story_id: &str,
        player: &str,
        vote: Vote,
    ) -> Result<bool, AppError> {
        let mut rooms = self.rooms.lock().unwrap();
        let story = match rooms.get_mut(code).and_then(|room| room.story_mut(story_id)) {
            Some(story) => story,
            None => {
                debug!(room_code = %code, story_id = %story_id, "Score dropped, room or story not found");
                return Ok(false);
            }
        };

        story.add_score(player, vote)?;
        debug!(room_code = %code, story_id = %story_id, player = %player, vote = %vote, "Score recorded");
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn remove_story_score(&self, code: &str, story_id: &str, player: &str) -> bool {
        let mut rooms = self.rooms.lock().unwrap();
        match rooms.get_mut(code).and_then(|room| room.story_mut(story_id)) {
            Some(story) => story.remove_score(player),
            None => false,
        }
    }

    #[instrument(skip(self))]
    async fn reveal_cards(&self, code: &str, story_id: &str) -> Option<f64> {
        let mut rooms = self.rooms.lock().unwrap();
        let story = match rooms.get_mut(code).and_then(|room| room.story_mut(story_id)) {
            Some(story) => story,
            None => {
                debug!(room_code = %code, story_id = %story_id, "Reveal dropped, room or story not found");
                return None;
            }
        };

        story.set_revealed(true);
        story.calculate_average_score();
        let average = story.average_score();

        info!(room_code = %code, story_id = %story_id, average, "Cards revealed");
        Some(average)
    }

    #[instrument(skip(self))]
    async fn set_cards_revealed(&self, code: &str, story_id: &str, revealed: bool) -> bool {
        let mut rooms = self.rooms.lock().unwrap();
        match rooms.get_mut(code).and_then(|room| room.story_mut(story_id)) {
            Some(story) => {
                story.set_revealed(revealed);
                if revealed {
                    story.calculate_average_score();
                }
                true
            }
            None => false,
        }
    }

    #[instrument(skip(self))]
    async fn clear_story_votes(&self, code: &str, story_id: &str) -> bool {
        let mut rooms = self.rooms.lock().unwrap();
        match rooms.get_mut(code).and_then(|room| room.story_mut(story_id)) {
            Some(story) => {
                story.clear_all_votes();
                debug!(room_code = %code, story_id = %story_id, "Votes cleared");
                true
            }
            None => false,
        }
    }

    async fn current_room_code(&self) -> Option<String> {
        self.context.lock().unwrap().current_room.clone()
    }

    async fn set_current_room_code(&self, code: Option<String>) {
        self.context.lock().unwrap().current_room = code;
    }

    async fn logged_in_user(&self) -> Option<String> {
        self.context.lock().unwrap().logged_in_user.clone()
    }

    async fn set_logged_in_user(&self, player: &str) {
        self.context.lock().unwrap().logged_in_user = Some(player.to_string());
    }

    async fn current_mode(&self) -> String {
        self.context.lock().unwrap().mode.clone()
    }

    #[instrument(skip(self))]
    async fn set_current_mode(&self, mode: &str) {
        if mode.trim().is_empty() {
            warn!("Ignoring empty estimation mode");
            return;
        }
        self.context.lock().unwrap().mode = mode.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_room_assigns_sequential_codes() {
        let repo = InMemoryRoomRepository::new();

        let first = repo.create_room("standup", "alice").await;
        let second = repo.create_room("retro", "bob").await;

        assert_eq!(first, "room 1");
        assert_eq!(second, "room 2");
    }

    #[tokio::test]
    async fn create_room_adds_creator_and_sets_active_room() {
        let repo = InMemoryRoomRepository::new();

        let code = repo.create_room("standup", "alice").await;

        let room = repo.get_room(&code).await.unwrap();
        assert!(room.has_player("alice"));
        assert_eq!(room.creator, "alice");
        assert_eq!(repo.current_room_code().await, Some(code));
    }

    #[tokio::test]
    async fn get_nonexistent_room_returns_none() {
        let repo = InMemoryRoomRepository::new();
        assert!(repo.get_room("room 99").await.is_none());
    }

    #[tokio::test]
    async fn join_room_is_idempotent() {
        let repo = InMemoryRoomRepository::new();
        let code = repo.create_room("standup", "alice").await;

        assert!(repo.join_room(&code, "bob").await);
        assert!(repo.join_room(&code, "bob").await);

        let room = repo.get_room(&code).await.unwrap();
        assert_eq!(room.player_count(), 2);
    }

    #[tokio::test]
    async fn join_missing_room_fails() {
        let repo = InMemoryRoomRepository::new();
        assert!(!repo.join_room("room 99", "bob").await);
    }

    #[tokio::test]
    async fn story_ids_increment_from_one() {
        let repo = InMemoryRoomRepository::new();
        let code = repo.create_room("standup", "alice").await;

        let first = repo.create_story(&code, "login-flow", "login page").await;
        let second = repo.create_story(&code, "signup-flow", "").await;

        assert_eq!(first.as_deref(), Some("story_1"));
        assert_eq!(second.as_deref(), Some("story_2"));
        assert_eq!(repo.get_room(&code).await.unwrap().story_count(), 2);
    }

    #[tokio::test]
    async fn create_story_in_missing_room_returns_none() {
        let repo = InMemoryRoomRepository::new();
        assert!(repo.create_story("room 99", "login-flow", "").await.is_none());
    }

    #[tokio::test]
    async fn score_updates_are_last_write_wins() {
        let repo = InMemoryRoomRepository::new();
        let code = repo.create_room("standup", "alice").await;
        let story = repo.create_story(&code, "login-flow", "").await.unwrap();

        assert!(repo
            .update_story_score(&code, &story, "alice", Vote::Estimate(3))
            .await
            .unwrap());
        assert!(repo
            .update_story_score(&code, &story, "alice", Vote::Estimate(8))
            .await
            .unwrap());

        let card = repo.get_story(&code, &story).await.unwrap();
        assert_eq!(card.vote_count(), 1);
        assert_eq!(card.average_score(), 8.0);
    }

    #[tokio::test]
    async fn score_on_missing_story_is_a_noop() {
        let repo = InMemoryRoomRepository::new();
        let code = repo.create_room("standup", "alice").await;

        let applied = repo
            .update_story_score(&code, "story_99", "alice", Vote::Estimate(5))
            .await
            .unwrap();
        assert!(!applied);

        let applied = repo
            .update_story_score("room 99", "story_1", "alice", Vote::Estimate(5))
            .await
            .unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn blank_player_name_surfaces_to_caller() {
        let repo = InMemoryRoomRepository::new();
        let code = repo.create_room("standup", "alice").await;
        let story = repo.create_story(&code, "login-flow", "").await.unwrap();

        let result = repo.update_story_score(&code, &story, "  ", Vote::Estimate(5)).await;
        assert!(matches!(result, Err(AppError::InvalidPlayerName(_))));
    }

    #[tokio::test]
    async fn reveal_returns_recomputed_average() {
        let repo = InMemoryRoomRepository::new();
        let code = repo.create_room("standup", "alice").await;
        let story = repo.create_story(&code, "login-flow", "").await.unwrap();

        repo.update_story_score(&code, &story, "alice", Vote::Estimate(5))
            .await
            .unwrap();
        repo.update_story_score(&code, &story, "bob", Vote::Unknown)
            .await
            .unwrap();

        let average = repo.reveal_cards(&code, &story).await;
        assert_eq!(average, Some(5.0));
        assert!(repo.get_story(&code, &story).await.unwrap().is_revealed());

        assert!(repo.reveal_cards(&code, "story_99").await.is_none());
    }

    #[tokio::test]
    async fn remove_story_score_recomputes_the_average() {
        let repo = InMemoryRoomRepository::new();
        let code = repo.create_room("standup", "alice").await;
        let story = repo.create_story(&code, "login-flow", "").await.unwrap();

        repo.update_story_score(&code, &story, "alice", Vote::Estimate(5))
            .await
            .unwrap();
        repo.update_story_score(&code, &story, "bob", Vote::Estimate(3))
            .await
            .unwrap();

        assert!(repo.remove_story_score(&code, &story, "bob").await);
        assert!(!repo.remove_story_score(&code, &story, "bob").await);
        assert!(!repo.remove_story_score(&code, "story_99", "alice").await);

        let card = repo.get_story(&code, &story).await.unwrap();
        assert_eq!(card.vote_count(), 1);
        assert_eq!(card.average_score(), 5.0);
    }

    #[tokio::test]
    async fn clear_story_votes_resets_reveal() {
        let repo = InMemoryRoomRepository::new();
        let code = repo.create_room("standup", "alice").await;
        let story = repo.create_story(&code, "login-flow", "").await.unwrap();

        repo.update_story_score(&code, &story, "alice", Vote::Estimate(5))
            .await
            .unwrap();
        repo.reveal_cards(&code, &story).await;
        assert!(repo.clear_story_votes(&code, &story).await);

        let card = repo.get_story(&code, &story).await.unwrap();
        assert_eq!(card.vote_count(), 0);
        assert!(!card.is_revealed());
    }

    #[tokio::test]
    async fn insert_room_keeps_existing_state() {
        let repo = InMemoryRoomRepository::new();
        let code = repo.create_room("standup", "alice").await;
        repo.join_room(&code, "bob").await;

        // A remote echo of the same room must not reset membership.
        repo.insert_room(Room::new(&code, "standup", "alice")).await;
        assert_eq!(repo.get_room(&code).await.unwrap().player_count(), 2);
    }

    #[tokio::test]
    async fn insert_room_advances_the_code_counter() {
        let repo = InMemoryRoomRepository::new();

        repo.insert_room(Room::new("room 7", "remote", "carol")).await;
        let next = repo.create_room("standup", "alice").await;

        assert_eq!(next, "room 8");
    }

    #[tokio::test]
    async fn insert_story_never_clobbers_votes() {
        let repo = InMemoryRoomRepository::new();
        let code = repo.create_room("standup", "alice").await;
        let story = repo.create_story(&code, "login-flow", "").await.unwrap();
        repo.update_story_score(&code, &story, "alice", Vote::Estimate(5))
            .await
            .unwrap();

        // Echo of the story-created event after a local vote.
        let inserted = repo
            .insert_story(&code, StoryCard::new(&story, "login-flow", ""))
            .await;

        assert!(!inserted);
        assert_eq!(repo.get_story(&code, &story).await.unwrap().vote_count(), 1);
    }

    #[tokio::test]
    async fn available_room_codes_are_sorted() {
        let repo = InMemoryRoomRepository::new();
        repo.create_room("standup", "alice").await;
        repo.create_room("retro", "bob").await;

        assert_eq!(repo.available_room_codes().await, vec!["room 1", "room 2"]);
    }

    #[tokio::test]
    async fn session_context_round_trips() {
        let repo = InMemoryRoomRepository::new();

        assert!(repo.logged_in_user().await.is_none());
        repo.set_logged_in_user("alice").await;
        assert_eq!(repo.logged_in_user().await.as_deref(), Some("alice"));

        assert_eq!(repo.current_mode().await, DEFAULT_MODE);
        repo.set_current_mode("Fibonacci").await;
        assert_eq!(repo.current_mode().await, "Fibonacci");
        repo.set_current_mode("  ").await;
        assert_eq!(repo.current_mode().await, "Fibonacci");

        repo.set_current_room_code(Some("room 1".to_string())).await;
        assert_eq!(repo.current_room_code().await.as_deref(), Some("room 1"));
        repo.set_current_room_code(None).await;
        assert!(repo.current_room_code().await.is_none());
    }

    #[tokio::test]
    async fn schedule_room_stores_the_slot() {
        let repo = InMemoryRoomRepository::new();
        let code = repo.create_room("standup", "alice").await;

        assert!(repo.schedule_room(&code, "9:00 AM - 10:00 AM").await);
        assert!(!repo.schedule_room("room 99", "9:00 AM - 10:00 AM").await);

        let room = repo.get_room(&code).await.unwrap();
        assert_eq!(room.scheduled_slot(), Some("9:00 AM - 10:00 AM"));
    }
}
