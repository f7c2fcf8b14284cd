use serde::{Deserialize, Serialize};

use crate::shared::{now_millis, AppError};

// Broker topics. One topic per event kind; payloads are the flat JSON
// objects defined below.
pub const TOPIC_ROOM_CREATED: &str = "room/created";
pub const TOPIC_PLAYER_JOINED: &str = "player/joined";
pub const TOPIC_STORY_CREATED: &str = "story/created";
pub const TOPIC_STORY_SCORED: &str = "story/scored";
pub const TOPIC_CARDS_REVEALED: &str = "cards/revealed";
pub const TOPIC_ROOMS_UPDATED: &str = "rooms/updated";
pub const TOPIC_MODE_CHANGED: &str = "mode/changed";

pub const ALL_TOPICS: [&str; 7] = [
    TOPIC_ROOM_CREATED,
    TOPIC_PLAYER_JOINED,
    TOPIC_STORY_CREATED,
    TOPIC_STORY_SCORED,
    TOPIC_CARDS_REVEALED,
    TOPIC_ROOMS_UPDATED,
    TOPIC_MODE_CHANGED,
];

/// Events are immutable facts about state changes that already happened,
/// carrying the identifiers a remote process needs to apply the same change.
/// Timestamps are epoch milliseconds, stamped at construction.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreated {
    pub room_code: String,
    pub room_name: String,
    pub creator_name: String,
    pub timestamp: i64,
}

impl RoomCreated {
    pub fn new(room_code: &str, room_name: &str, creator_name: &str) -> Self {
        Self {
            room_code: room_code.to_string(),
            room_name: room_name.to_string(),
            creator_name: creator_name.to_string(),
            timestamp: now_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoined {
    pub room_code: String,
    pub player_name: String,
    pub timestamp: i64,
}

impl PlayerJoined {
    pub fn new(room_code: &str, player_name: &str) -> Self {
        Self {
            room_code: room_code.to_string(),
            player_name: player_name.to_string(),
            timestamp: now_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryCreated {
    pub room_code: String,
    pub story_id: String,
    pub title: String,
    pub description: String,
    pub timestamp: i64,
}

impl StoryCreated {
    pub fn new(room_code: &str, story_id: &str, title: &str, description: &str) -> Self {
        Self {
            room_code: room_code.to_string(),
            story_id: story_id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            timestamp: now_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryScored {
    pub room_code: String,
    pub story_id: String,
    pub player_name: String,
    /// Wire encoding of the vote: estimates as-is, -1 unknown, -2 break.
    pub score: i32,
    pub timestamp: i64,
}

impl StoryScored {
    pub fn new(room_code: &str, story_id: &str, player_name: &str, score: i32) -> Self {
        Self {
            room_code: room_code.to_string(),
            story_id: story_id.to_string(),
            player_name: player_name.to_string(),
            score,
            timestamp: now_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardsRevealed {
    pub room_code: String,
    pub story_id: String,
    /// Average at the publisher; display data, receivers recompute locally.
    pub average_score: f64,
    pub timestamp: i64,
}

impl CardsRevealed {
    pub fn new(room_code: &str, story_id: &str, average_score: f64) -> Self {
        Self {
            room_code: room_code.to_string(),
            story_id: story_id.to_string(),
            average_score,
            timestamp: now_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomsUpdated {
    pub available_rooms: Vec<String>,
    pub timestamp: i64,
}

impl RoomsUpdated {
    pub fn new(available_rooms: Vec<String>) -> Self {
        Self {
            available_rooms,
            timestamp: now_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeChanged {
    pub room_code: String,
    pub mode: String,
    pub timestamp: i64,
}

impl ModeChanged {
    pub fn new(room_code: &str, mode: &str) -> Self {
        Self {
            room_code: room_code.to_string(),
            mode: mode.to_string(),
            timestamp: now_millis(),
        }
    }
}

/// Tagged union over the seven event kinds.
///
/// The tag never travels on the wire: the broker topic identifies the kind,
/// and `decode` is the one dispatch table mapping topics to payload types.
#[derive(Debug, Clone, PartialEq)]
pub enum PokerEvent {
    RoomCreated(RoomCreated),
    PlayerJoined(PlayerJoined),
    StoryCreated(StoryCreated),
    StoryScored(StoryScored),
    CardsRevealed(CardsRevealed),
    RoomsUpdated(RoomsUpdated),
    ModeChanged(ModeChanged),
}

impl PokerEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            PokerEvent::RoomCreated(_) => TOPIC_ROOM_CREATED,
            PokerEvent::PlayerJoined(_) => TOPIC_PLAYER_JOINED,
            PokerEvent::StoryCreated(_) => TOPIC_STORY_CREATED,
            PokerEvent::StoryScored(_) => TOPIC_STORY_SCORED,
            PokerEvent::CardsRevealed(_) => TOPIC_CARDS_REVEALED,
            PokerEvent::RoomsUpdated(_) => TOPIC_ROOMS_UPDATED,
            PokerEvent::ModeChanged(_) => TOPIC_MODE_CHANGED,
        }
    }

    /// Get a human-readable description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            PokerEvent::RoomCreated(_) => "room_created",
            PokerEvent::PlayerJoined(_) => "player_joined",
            PokerEvent::StoryCreated(_) => "story_created",
            PokerEvent::StoryScored(_) => "story_scored",
            PokerEvent::CardsRevealed(_) => "cards_revealed",
            PokerEvent::RoomsUpdated(_) => "rooms_updated",
            PokerEvent::ModeChanged(_) => "mode_changed",
        }
    }

    /// The room this event belongs to; `None` for events without room scope
    /// (the rooms list broadcast).
    pub fn room_code(&self) -> Option<&str> {
        match self {
            PokerEvent::RoomCreated(e) => Some(&e.room_code),
            PokerEvent::PlayerJoined(e) => Some(&e.room_code),
            PokerEvent::StoryCreated(e) => Some(&e.room_code),
            PokerEvent::StoryScored(e) => Some(&e.room_code),
            PokerEvent::CardsRevealed(e) => Some(&e.room_code),
            PokerEvent::RoomsUpdated(_) => None,
            PokerEvent::ModeChanged(e) => Some(&e.room_code),
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            PokerEvent::RoomCreated(e) => e.timestamp,
            PokerEvent::PlayerJoined(e) => e.timestamp,
            PokerEvent::StoryCreated(e) => e.timestamp,
            PokerEvent::StoryScored(e) => e.timestamp,
            PokerEvent::CardsRevealed(e) => e.timestamp,
            PokerEvent::RoomsUpdated(e) => e.timestamp,
            PokerEvent::ModeChanged(e) => e.timestamp,
        }
    }

    /// Serializes the payload to its wire form (flat JSON object).
    pub fn encode(&self) -> Result<String, AppError> {
        let payload = match self {
            PokerEvent::RoomCreated(e) => serde_json::to_string(e),
            PokerEvent::PlayerJoined(e) => serde_json::to_string(e),
            PokerEvent::StoryCreated(e) => serde_json::to_string(e),
            PokerEvent::StoryScored(e) => serde_json::to_string(e),
            PokerEvent::CardsRevealed(e) => serde_json::to_string(e),
            PokerEvent::RoomsUpdated(e) => serde_json::to_string(e),
            PokerEvent::ModeChanged(e) => serde_json::to_string(e),
        }?;
        Ok(payload)
    }

    /// Decodes a payload received on `topic`.
    ///
    /// `Ok(None)` for topics outside the protocol; a malformed payload on a
    /// known topic is an error the receive loop logs and skips.
    pub fn decode(topic: &str, payload: &str) -> Result<Option<PokerEvent>, AppError> {
        let event = match topic {
            TOPIC_ROOM_CREATED => PokerEvent::RoomCreated(serde_json::from_str(payload)?),
            TOPIC_PLAYER_JOINED => PokerEvent::PlayerJoined(serde_json::from_str(payload)?),
            TOPIC_STORY_CREATED => PokerEvent::StoryCreated(serde_json::from_str(payload)?),
            TOPIC_STORY_SCORED => PokerEvent::StoryScored(serde_json::from_str(payload)?),
            TOPIC_CARDS_REVEALED => PokerEvent::CardsRevealed(serde_json::from_str(payload)?),
            TOPIC_ROOMS_UPDATED => PokerEvent::RoomsUpdated(serde_json::from_str(payload)?),
            TOPIC_MODE_CHANGED => PokerEvent::ModeChanged(serde_json::from_str(payload)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

impl From<RoomCreated> for PokerEvent {
    fn from(event: RoomCreated) -> Self {
        PokerEvent::RoomCreated(event)
    }
}

impl From<PlayerJoined> for PokerEvent {
    fn from(event: PlayerJoined) -> Self {
        PokerEvent::PlayerJoined(event)
    }
}

impl From<StoryCreated> for PokerEvent {
    fn from(event: StoryCreated) -> Self {
        PokerEvent::StoryCreated(event)
    }
}

impl From<StoryScored> for PokerEvent {
    fn from(event: StoryScored) -> Self {
        PokerEvent::StoryScored(event)
    }
}

impl From<CardsRevealed> for PokerEvent {
    fn from(event: CardsRevealed) -> Self {
        PokerEvent::CardsRevealed(event)
    }
}

impl From<RoomsUpdated> for PokerEvent {
    fn from(event: RoomsUpdated) -> Self {
        PokerEvent::RoomsUpdated(event)
    }
}

impl From<ModeChanged> for PokerEvent {
    fn from(event: ModeChanged) -> Self {
        PokerEvent::ModeChanged(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_events() -> Vec<PokerEvent> {
        vec![
            RoomCreated::new("room 1", "standup", "alice").into(),
            PlayerJoined::new("room 1", "bob").into(),
            StoryCreated::new("room 1", "story_1", "login-flow", "login page").into(),
            StoryScored::new("room 1", "story_1", "alice", 5).into(),
            CardsRevealed::new("room 1", "story_1", 5.0).into(),
            RoomsUpdated::new(vec!["room 1".to_string(), "room 2".to_string()]).into(),
            ModeChanged::new("room 1", "Fibonacci").into(),
        ]
    }

    #[test]
    fn every_event_round_trips_through_its_topic() {
        for event in all_events() {
            let payload = event.encode().unwrap();
            let decoded = PokerEvent::decode(event.topic(), &payload).unwrap().unwrap();
            assert_eq!(decoded, event);
        }
    }

    #[test]
    fn payload_uses_camel_case_field_names() {
        let event = PokerEvent::from(StoryScored::new("room 1", "story_1", "alice", -1));
        let payload = event.encode().unwrap();

        assert!(payload.contains("\"roomCode\":\"room 1\""));
        assert!(payload.contains("\"storyId\":\"story_1\""));
        assert!(payload.contains("\"playerName\":\"alice\""));
        assert!(payload.contains("\"score\":-1"));
        assert!(payload.contains("\"timestamp\":"));
    }

    #[test]
    fn unknown_topic_decodes_to_none() {
        assert!(PokerEvent::decode("chat/message", "{}").unwrap().is_none());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(PokerEvent::decode(TOPIC_STORY_SCORED, "not json").is_err());
        assert!(PokerEvent::decode(TOPIC_STORY_SCORED, "{\"roomCode\":1}").is_err());
    }

    #[test]
    fn room_code_scope_matches_the_protocol() {
        for event in all_events() {
            match &event {
                PokerEvent::RoomsUpdated(_) => assert!(event.room_code().is_none()),
                _ => assert_eq!(event.room_code(), Some("room 1")),
            }
        }
    }

    #[test]
    fn topics_cover_the_whole_protocol() {
        let topics: Vec<&str> = all_events().iter().map(|e| e.topic()).collect();
        assert_eq!(topics, ALL_TOPICS);
    }
}
