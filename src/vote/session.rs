use std::collections::HashMap;

use crate::room::models::StoryCard;
use crate::vote::value::{self, Vote};

/// Read-only snapshot of one story's voting state.
///
/// The story card is the source of truth; a session is derived from it on
/// demand for display and chart consumers, so there is never a second vote
/// store to reconcile. At most one session exists per story id because at
/// most one card does.
#[derive(Debug, Clone, PartialEq)]
pub struct VotingSession {
    story_id: String,
    votes: HashMap<String, Vote>,
    revealed: bool,
    last_vote_time: i64,
}

impl VotingSession {
    pub fn snapshot(card: &StoryCard) -> Self {
        Self {
            story_id: card.id.clone(),
            votes: card.votes().clone(),
            revealed: card.is_revealed(),
            last_vote_time: card.last_vote_time(),
        }
    }

    pub fn story_id(&self) -> &str {
        &self.story_id
    }

    pub fn votes(&self) -> &HashMap<String, Vote> {
        &self.votes
    }

    pub fn player_vote(&self, player: &str) -> Option<Vote> {
        self.votes.get(player).copied()
    }

    pub fn has_player_voted(&self, player: &str) -> bool {
        self.votes.contains_key(player)
    }

    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    pub fn average_score(&self) -> f64 {
        value::average_score(self.votes.values())
    }

    pub fn min_score(&self) -> u32 {
        value::min_score(self.votes.values())
    }

    pub fn max_score(&self) -> u32 {
        value::max_score(self.votes.values())
    }

    pub fn has_consensus(&self) -> bool {
        value::has_consensus(self.votes.values())
    }

    pub fn is_revealed(&self) -> bool {
        self.revealed
    }

    pub fn last_vote_time(&self) -> i64 {
        self.last_vote_time
    }
}

impl From<&StoryCard> for VotingSession {
    fn from(card: &StoryCard) -> Self {
        VotingSession::snapshot(card)
    }
}
