use std::sync::Arc;
use tracing::{debug, info, warn};

use super::events::{
    CardsRevealed, ModeChanged, PlayerJoined, RoomCreated, RoomsUpdated, StoryCreated, StoryScored,
};
use super::subscriber::EventSubscriber;
use crate::room::models::{Room, StoryCard};
use crate::room::repository::RoomRepository;
use crate::shared::AppError;
use crate::vote::value::Vote;

/// The default handler set: applies every inbound event to the local
/// repository so all process views converge.
///
/// Apply operations are idempotent and create-if-absent, so re-delivery and
/// a process's own echo never clobber newer local state. The average carried
/// by a reveal event is display data — the local card recomputes its own.
pub struct RepositoryMirror {
    repository: Arc<dyn RoomRepository>,
}

impl RepositoryMirror {
    pub fn new(repository: Arc<dyn RoomRepository>) -> Self {
        Self { repository }
    }

    /// Registers mirror handlers for all seven event kinds.
    pub async fn attach(&self, subscriber: &EventSubscriber) -> Result<(), AppError> {
        info!("Attaching repository mirror");

        let repo = Arc::clone(&self.repository);
        subscriber
            .subscribe_to_room_created(move |event: RoomCreated| {
                let repo = Arc::clone(&repo);
                async move {
                    debug!(room_code = %event.room_code, "Applying remote room");
                    repo.insert_room(Room::new(
                        &event.room_code,
                        &event.room_name,
                        &event.creator_name,
                    ))
                    .await;
                }
            })
            .await?;

        let repo = Arc::clone(&self.repository);
        subscriber
            .subscribe_to_player_joined(move |event: PlayerJoined| {
                let repo = Arc::clone(&repo);
                async move {
                    if !repo.join_room(&event.room_code, &event.player_name).await {
                        debug!(
                            room_code = %event.room_code,
                            player = %event.player_name,
                            "Membership for unknown room dropped"
                        );
                    }
                }
            })
            .await?;

        let repo = Arc::clone(&self.repository);
        subscriber
            .subscribe_to_story_created(move |event: StoryCreated| {
                let repo = Arc::clone(&repo);
                async move {
                    let card = StoryCard::new(&event.story_id, &event.title, &event.description);
                    repo.insert_story(&event.room_code, card).await;
                }
            })
            .await?;

        let repo = Arc::clone(&self.repository);
        subscriber
            .subscribe_to_story_scored(move |event: StoryScored| {
                let repo = Arc::clone(&repo);
                async move {
                    let vote = Vote::from(event.score);
                    match repo
                        .update_story_score(
                            &event.room_code,
                            &event.story_id,
                            &event.player_name,
                            vote,
                        )
                        .await
                    {
                        Ok(true) => {}
                        Ok(false) => {
                            debug!(
                                room_code = %event.room_code,
                                story_id = %event.story_id,
                                "Score for unknown story dropped"
                            );
                        }
                        Err(error) => {
                            warn!(
                                room_code = %event.room_code,
                                story_id = %event.story_id,
                                error = %error,
                                "Remote score rejected"
                            );
                        }
                    }
                }
            })
            .await?;

        let repo = Arc::clone(&self.repository);
        subscriber
            .subscribe_to_cards_revealed(move |event: CardsRevealed| {
                let repo = Arc::clone(&repo);
                async move {
                    repo.set_cards_revealed(&event.room_code, &event.story_id, true)
                        .await;
                }
            })
            .await?;

        subscriber
            .subscribe_to_rooms_updated(move |event: RoomsUpdated| async move {
                // Display-only payload; nothing to apply to the repository.
                debug!(rooms = ?event.available_rooms, "Room list updated");
            })
            .await?;

        let repo = Arc::clone(&self.repository);
        subscriber
            .subscribe_to_mode_changed(move |event: ModeChanged| {
                let repo = Arc::clone(&repo);
                async move {
                    repo.set_current_mode(&event.mode).await;
                }
            })
            .await?;

        Ok(())
    }
}
