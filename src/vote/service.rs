use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::room::repository::RoomRepository;
use crate::shared::AppError;
use crate::vote::deck::Deck;
use crate::vote::session::VotingSession;
use crate::vote::value::Vote;

/// Service for the voting path: token normalization, submission to the
/// current room's story card, and the derived session views.
///
/// The story card is the single vote store; this service never keeps its own
/// copy of voting state.
pub struct VotingService {
    repository: Arc<dyn RoomRepository>,
}

impl VotingService {
    pub fn new(repository: Arc<dyn RoomRepository>) -> Self {
        Self { repository }
    }

    /// Submits a display-token vote for a story in the current room.
    ///
    /// Returns `Ok(true)` when the vote was recorded, `Ok(false)` when there
    /// is no current room or the story is unknown, and an error only for a
    /// blank player name.
    #[instrument(skip(self))]
    pub async fn submit_vote(
        &self,
        player: &str,
        story_id: &str,
        token: &str,
    ) -> Result<bool, AppError> {
        if player.trim().is_empty() {
            warn!(story_id = %story_id, "Rejecting vote with blank player name");
            return Err(AppError::InvalidPlayerName(player.to_string()));
        }

        let room = match self.repository.current_room_code().await {
            Some(room) => room,
            None => {
                warn!(player = %player, story_id = %story_id, "No current room, vote not recorded");
                return Ok(false);
            }
        };

        let vote = Vote::parse(token);
        let applied = self
            .repository
            .update_story_score(&room, story_id, player, vote)
            .await?;

        if applied {
            info!(player = %player, story_id = %story_id, vote = %vote, "Vote recorded");
        } else {
            debug!(player = %player, story_id = %story_id, "Story not found, vote not recorded");
        }
        Ok(applied)
    }

    /// Derived read view of a story's voting state, if the story exists in
    /// the current room.
    pub async fn voting_session(&self, story_id: &str) -> Option<VotingSession> {
        let room = self.repository.current_room_code().await?;
        let card = self.repository.get_story(&room, story_id).await?;
        Some(VotingSession::snapshot(&card))
    }

    #[instrument(skip(self))]
    pub async fn reveal_votes(&self, story_id: &str) -> bool {
        match self.repository.current_room_code().await {
            Some(room) => self.repository.set_cards_revealed(&room, story_id, true).await,
            None => false,
        }
    }

    #[instrument(skip(self))]
    pub async fn hide_votes(&self, story_id: &str) -> bool {
        match self.repository.current_room_code().await {
            Some(room) => self.repository.set_cards_revealed(&room, story_id, false).await,
            None => false,
        }
    }

    /// Flips the reveal state; vote data is untouched.
    pub async fn toggle_reveal(&self, story_id: &str) -> bool {
        match self.voting_session(story_id).await {
            Some(session) if session.is_revealed() => self.hide_votes(story_id).await,
            Some(_) => self.reveal_votes(story_id).await,
            None => false,
        }
    }

    #[instrument(skip(self))]
    pub async fn clear_votes(&self, story_id: &str) -> bool {
        match self.repository.current_room_code().await {
            Some(room) => self.repository.clear_story_votes(&room, story_id).await,
            None => false,
        }
    }

    pub async fn has_player_voted(&self, player: &str, story_id: &str) -> bool {
        match self.voting_session(story_id).await {
            Some(session) => session.has_player_voted(player),
            None => false,
        }
    }

    /// The card deck in effect for the current estimation mode.
    pub async fn current_deck(&self) -> Deck {
        Deck::from_mode(&self.repository.current_mode().await)
    }

    /// Number of players in the current room, minimum 1 so participation
    /// ratios never divide by zero.
    pub async fn total_players(&self) -> usize {
        let room = match self.repository.current_room_code().await {
            Some(code) => self.repository.get_room(&code).await,
            None => None,
        };
        room.map(|r| r.player_count()).unwrap_or(0).max(1)
    }
}
