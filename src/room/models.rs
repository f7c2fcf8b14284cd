use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::shared::{now_millis, AppError};
use crate::vote::value::{self, Vote};

/// A named collaboration session: players plus the stories they estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub code: String,
    pub name: String,
    pub creator: String,
    /// Insertion-ordered with set semantics; the creator is always a member.
    players: Vec<String>,
    stories: HashMap<String, StoryCard>,
    scheduled_slot: Option<String>,
}

impl Room {
    pub fn new(code: &str, name: &str, creator: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            creator: creator.to_string(),
            players: vec![creator.to_string()],
            stories: HashMap::new(),
            scheduled_slot: None,
        }
    }

    /// Adds a player if not already present.
    pub fn add_player(&mut self, player: &str) {
        if !self.has_player(player) {
            self.players.push(player.to_string());
        }
    }

    pub fn has_player(&self, player: &str) -> bool {
        self.players.iter().any(|p| p == player)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn players(&self) -> &[String] {
        &self.players
    }

    /// Adds a story card, keeping the first card registered under an id.
    /// Returns false when the id is already taken.
    pub fn add_story(&mut self, card: StoryCard) -> bool {
        if self.stories.contains_key(&card.id) {
            return false;
        }
        self.stories.insert(card.id.clone(), card);
        true
    }

    pub fn story(&self, story_id: &str) -> Option<&StoryCard> {
        self.stories.get(story_id)
    }

    pub fn story_mut(&mut self, story_id: &str) -> Option<&mut StoryCard> {
        self.stories.get_mut(story_id)
    }

    pub fn all_stories(&self) -> Vec<StoryCard> {
        self.stories.values().cloned().collect()
    }

    pub fn story_count(&self) -> usize {
        self.stories.len()
    }

    pub fn schedule(&mut self, slot: &str) {
        self.scheduled_slot = Some(slot.to_string());
    }

    pub fn scheduled_slot(&self) -> Option<&str> {
        self.scheduled_slot.as_deref()
    }
}

/// An estimation unit: the story under discussion and every vote cast on it.
///
/// Votes are keyed by player name, one vote per player, last write wins.
/// The stored average is recomputed on every vote mutation so readers never
/// observe a stale aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryCard {
    pub id: String,
    pub title: String,
    pub description: String,
    pub assigned_user: Option<String>,
    total_points: f64,
    votes: HashMap<String, Vote>,
    average_score: f64,
    revealed: bool,
    last_vote_time: i64,
}

impl StoryCard {
    pub fn new(id: &str, title: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            assigned_user: None,
            total_points: 0.0,
            votes: HashMap::new(),
            average_score: 0.0,
            revealed: false,
            last_vote_time: now_millis(),
        }
    }

    /// Imported backlog points, clamped non-negative.
    pub fn set_total_points(&mut self, points: f64) {
        self.total_points = points.max(0.0);
    }

    pub fn total_points(&self) -> f64 {
        self.total_points
    }

    /// Records a vote, overwriting any prior vote by the same player.
    ///
    /// A blank player name is the caller's error and the one input this type
    /// rejects; everything else is a total function over its inputs.
    pub fn add_score(&mut self, player: &str, vote: Vote) -> Result<(), AppError> {
        if player.trim().is_empty() {
            return Err(AppError::InvalidPlayerName(player.to_string()));
        }
        self.votes.insert(player.to_string(), vote);
        self.last_vote_time = now_millis();
        self.calculate_average_score();
        Ok(())
    }

    /// Removes a player's vote. Returns false when no vote was present.
    pub fn remove_score(&mut self, player: &str) -> bool {
        let removed = self.votes.remove(player).is_some();
        if removed {
            self.calculate_average_score();
        }
        removed
    }

    pub fn calculate_average_score(&mut self) {
        self.average_score = value::average_score(self.votes.values());
    }

    pub fn average_score(&self) -> f64 {
        self.average_score
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

    pub fn votes(&self) -> &HashMap<String, Vote> {
        &self.votes
    }

    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    pub fn player_vote(&self, player: &str) -> Option<Vote> {
        self.votes.get(player).copied()
    }

    pub fn has_player_voted(&self, player: &str) -> bool {
        self.votes.contains_key(player)
    }

    pub fn set_revealed(&mut self, revealed: bool) {
        self.revealed = revealed;
    }

    pub fn is_revealed(&self) -> bool {
        self.revealed
    }

    /// Flips the reveal flag without touching vote data.
    pub fn toggle_reveal(&mut self) {
        self.revealed = !self.revealed;
    }

    pub fn clear_all_votes(&mut self) {
        self.votes.clear();
        self.average_score = 0.0;
        self.revealed = false;
    }

    pub fn last_vote_time(&self) -> i64 {
        self.last_vote_time
    }
}
