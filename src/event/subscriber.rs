use futures::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::events::{
    CardsRevealed, ModeChanged, PlayerJoined, PokerEvent, RoomCreated, RoomsUpdated, StoryCreated,
    StoryScored, TOPIC_CARDS_REVEALED, TOPIC_MODE_CHANGED, TOPIC_PLAYER_JOINED,
    TOPIC_ROOMS_UPDATED, TOPIC_ROOM_CREATED, TOPIC_STORY_CREATED, TOPIC_STORY_SCORED,
};
use super::listener::RoomEventListener;
use super::publisher::EventPublisher;
use super::transport::{InboundMessage, MessageTransport};
use crate::room::models::{Room, StoryCard};
use crate::room::repository::RoomRepository;
use crate::shared::AppError;
use crate::vote::value::Vote;

type Callback<E> = Arc<dyn Fn(E) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Default)]
struct HandlerRegistry {
    room_created: Option<Callback<RoomCreated>>,
    player_joined: Option<Callback<PlayerJoined>>,
    story_created: Option<Callback<StoryCreated>>,
    story_scored: Option<Callback<StoryScored>>,
    cards_revealed: Option<Callback<CardsRevealed>>,
    rooms_updated: Option<Callback<RoomsUpdated>>,
    mode_changed: Option<Callback<ModeChanged>>,
}

/// Receives broker events and applies them through registered handlers, and
/// offers the convenience operations that pair a local repository mutation
/// with its broadcast.
///
/// At most one handler is registered per event kind; re-registration
/// replaces. Events carrying a room code are delivered only when they match
/// the repository's active room (no active room means everything is
/// delivered). The receive loop survives malformed messages and handler
/// panics — both are logged and the next message is processed.
pub struct EventSubscriber {
    repository: Arc<dyn RoomRepository>,
    publisher: Arc<EventPublisher>,
    transport: Arc<dyn MessageTransport>,
    handlers: Arc<Mutex<HandlerRegistry>>,
    inbound: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
}

impl EventSubscriber {
    pub fn new(
        repository: Arc<dyn RoomRepository>,
        publisher: Arc<EventPublisher>,
        transport: Arc<dyn MessageTransport>,
        inbound: mpsc::Receiver<InboundMessage>,
    ) -> Arc<Self> {
        Arc::new(Self {
            repository,
            publisher,
            transport,
            handlers: Arc::new(Mutex::new(HandlerRegistry::default())),
            inbound: Mutex::new(Some(inbound)),
        })
    }

    /// Starts the processing task draining the inbound channel. The task
    /// ends when every transport-side sender is gone or on abort.
    pub fn start(&self) -> JoinHandle<()> {
        let inbound = self.inbound.lock().unwrap().take();
        let repository = Arc::clone(&self.repository);
        let handlers = Arc::clone(&self.handlers);

        tokio::spawn(async move {
            let mut inbound = match inbound {
                Some(inbound) => inbound,
                None => {
                    warn!("Subscriber already started, ignoring");
                    return;
                }
            };

            info!("Event processing started");
            while let Some(message) = inbound.recv().await {
                dispatch(&repository, &handlers, message).await;
            }
            info!("Event stream closed, processing stopped");
        })
    }

    // Handler registration. One handler per event kind; registering again
    // replaces the previous handler and the topic subscription stands.

    pub async fn subscribe_to_room_created<F, Fut>(&self, handler: F) -> Result<(), AppError>
    where
        F: Fn(RoomCreated) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handlers.lock().unwrap().room_created =
            Some(Arc::new(move |event| Box::pin(handler(event))));
        self.transport.subscribe(TOPIC_ROOM_CREATED).await
    }

    pub async fn subscribe_to_player_joined<F, Fut>(&self, handler: F) -> Result<(), AppError>
    where
        F: Fn(PlayerJoined) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handlers.lock().unwrap().player_joined =
            Some(Arc::new(move |event| Box::pin(handler(event))));
        self.transport.subscribe(TOPIC_PLAYER_JOINED).await
    }

    pub async fn subscribe_to_story_created<F, Fut>(&self, handler: F) -> Result<(), AppError>
    where
        F: Fn(StoryCreated) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handlers.lock().unwrap().story_created =
            Some(Arc::new(move |event| Box::pin(handler(event))));
        self.transport.subscribe(TOPIC_STORY_CREATED).await
    }

    pub async fn subscribe_to_story_scored<F, Fut>(&self, handler: F) -> Result<(), AppError>
    where
        F: Fn(StoryScored) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handlers.lock().unwrap().story_scored =
            Some(Arc::new(move |event| Box::pin(handler(event))));
        self.transport.subscribe(TOPIC_STORY_SCORED).await
    }

    pub async fn subscribe_to_cards_revealed<F, Fut>(&self, handler: F) -> Result<(), AppError>
    where
        F: Fn(CardsRevealed) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handlers.lock().unwrap().cards_revealed =
            Some(Arc::new(move |event| Box::pin(handler(event))));
        self.transport.subscribe(TOPIC_CARDS_REVEALED).await
    }

    pub async fn subscribe_to_rooms_updated<F, Fut>(&self, handler: F) -> Result<(), AppError>
    where
        F: Fn(RoomsUpdated) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handlers.lock().unwrap().rooms_updated =
            Some(Arc::new(move |event| Box::pin(handler(event))));
        self.transport.subscribe(TOPIC_ROOMS_UPDATED).await
    }

    pub async fn subscribe_to_mode_changed<F, Fut>(&self, handler: F) -> Result<(), AppError>
    where
        F: Fn(ModeChanged) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handlers.lock().unwrap().mode_changed =
            Some(Arc::new(move |event| Box::pin(handler(event))));
        self.transport.subscribe(TOPIC_MODE_CHANGED).await
    }

    /// Wires a listener to all five room-scoped event kinds.
    pub async fn subscribe_to_room_events(
        &self,
        listener: Arc<dyn RoomEventListener>,
    ) -> Result<(), AppError> {
        info!(listener = listener.listener_name(), "Registering room event listener");

        let l = Arc::clone(&listener);
        self.subscribe_to_player_joined(move |event| {
            let l = Arc::clone(&l);
            async move { l.on_player_joined(event).await }
        })
        .await?;

        let l = Arc::clone(&listener);
        self.subscribe_to_story_created(move |event| {
            let l = Arc::clone(&l);
            async move { l.on_story_created(event).await }
        })
        .await?;

        let l = Arc::clone(&listener);
        self.subscribe_to_story_scored(move |event| {
            let l = Arc::clone(&l);
            async move { l.on_story_scored(event).await }
        })
        .await?;

        let l = Arc::clone(&listener);
        self.subscribe_to_cards_revealed(move |event| {
            let l = Arc::clone(&l);
            async move { l.on_cards_revealed(event).await }
        })
        .await?;

        let l = Arc::clone(&listener);
        self.subscribe_to_mode_changed(move |event| {
            let l = Arc::clone(&l);
            async move { l.on_mode_changed(event).await }
        })
        .await?;

        Ok(())
    }

    // Convenience operations: a local repository mutation followed by the
    // matching broadcast. Raw repository calls stay purely local — this is
    // the only broadcasting surface.

    /// Creates a room, announces it, and refreshes the shared rooms list.
    pub async fn create_room(&self, name: &str, creator: &str) -> String {
        let code = self.repository.create_room(name, creator).await;

        self.publisher
            .publish(RoomCreated::new(&code, name, creator).into())
            .await;
        let rooms = self.repository.available_room_codes().await;
        self.publisher.publish(RoomsUpdated::new(rooms).into()).await;

        code
    }

    /// Joins a room, adopts it as the active room, and announces the player.
    pub async fn join_room(&self, code: &str, player: &str) -> bool {
        if !self.repository.join_room(code, player).await {
            return false;
        }
        self.repository.set_logged_in_user(player).await;
        self.repository
            .set_current_room_code(Some(code.to_string()))
            .await;

        self.publisher
            .publish(PlayerJoined::new(code, player).into())
            .await;
        true
    }

    /// Adds a story to the active room and announces it.
    pub async fn create_story(&self, title: &str, description: &str) -> Option<String> {
        let room = self.repository.current_room_code().await?;
        let story_id = self
            .repository
            .create_story(&room, title, description)
            .await?;

        self.publisher
            .publish(StoryCreated::new(&room, &story_id, title, description).into())
            .await;
        Some(story_id)
    }

    /// Votes as the logged-in player in the active room and announces the
    /// score. No-op without an active room and player.
    pub async fn score_story(&self, story_id: &str, vote: Vote) -> Result<(), AppError> {
        let (room, player) = match (
            self.repository.current_room_code().await,
            self.repository.logged_in_user().await,
        ) {
            (Some(room), Some(player)) => (room, player),
            _ => {
                debug!(story_id = %story_id, "No active room or player, score not recorded");
                return Ok(());
            }
        };

        let applied = self
            .repository
            .update_story_score(&room, story_id, &player, vote)
            .await?;
        if applied {
            self.publisher
                .publish(StoryScored::new(&room, story_id, &player, vote.into()).into())
                .await;
        }
        Ok(())
    }

    /// Reveals a story's cards in the active room and announces the average.
    pub async fn reveal_cards(&self, story_id: &str) {
        let room = match self.repository.current_room_code().await {
            Some(room) => room,
            None => return,
        };

        if let Some(average) = self.repository.reveal_cards(&room, story_id).await {
            self.publisher
                .publish(CardsRevealed::new(&room, story_id, average).into())
                .await;
        }
    }

    /// Switches the estimation mode and announces it to the active room.
    pub async fn change_mode(&self, mode: &str) {
        let room = match self.repository.current_room_code().await {
            Some(room) => room,
            None => return,
        };

        self.repository.set_current_mode(mode).await;
        self.publisher
            .publish(ModeChanged::new(&room, mode).into())
            .await;
    }

    // Read conveniences over the injected repository.

    pub async fn available_rooms(&self) -> Vec<String> {
        self.repository.available_room_codes().await
    }

    pub async fn current_room(&self) -> Option<Room> {
        let code = self.repository.current_room_code().await?;
        self.repository.get_room(&code).await
    }

    pub async fn current_room_stories(&self) -> Vec<StoryCard> {
        match self.current_room().await {
            Some(room) => room.all_stories(),
            None => Vec::new(),
        }
    }
}

async fn dispatch(
    repository: &Arc<dyn RoomRepository>,
    handlers: &Mutex<HandlerRegistry>,
    message: InboundMessage,
) {
    let event = match PokerEvent::decode(&message.topic, &message.payload) {
        Ok(Some(event)) => event,
        Ok(None) => {
            debug!(topic = %message.topic, "Message on unhandled topic ignored");
            return;
        }
        Err(error) => {
            warn!(topic = %message.topic, error = %error, "Malformed message skipped");
            return;
        }
    };

    // Deliver room-scoped events only for the active room; with no active
    // room everything is delivered.
    if let Some(room_code) = event.room_code() {
        let matches = match repository.current_room_code().await {
            Some(current) => current == room_code,
            None => true,
        };
        if !matches {
            debug!(
                event_type = event.event_type(),
                room_code = %room_code,
                "Event for another room filtered out"
            );
            return;
        }
    }

    match event {
        PokerEvent::RoomCreated(event) => {
            let callback = handlers.lock().unwrap().room_created.clone();
            if let Some(callback) = callback {
                invoke("room_created", callback, event).await;
            }
        }
        PokerEvent::PlayerJoined(event) => {
            let callback = handlers.lock().unwrap().player_joined.clone();
            if let Some(callback) = callback {
                invoke("player_joined", callback, event).await;
            }
        }
        PokerEvent::StoryCreated(event) => {
            let callback = handlers.lock().unwrap().story_created.clone();
            if let Some(callback) = callback {
                invoke("story_created", callback, event).await;
            }
        }
        PokerEvent::StoryScored(event) => {
            let callback = handlers.lock().unwrap().story_scored.clone();
            if let Some(callback) = callback {
                invoke("story_scored", callback, event).await;
            }
        }
        PokerEvent::CardsRevealed(event) => {
            let callback = handlers.lock().unwrap().cards_revealed.clone();
            if let Some(callback) = callback {
                invoke("cards_revealed", callback, event).await;
            }
        }
        PokerEvent::RoomsUpdated(event) => {
            let callback = handlers.lock().unwrap().rooms_updated.clone();
            if let Some(callback) = callback {
                invoke("rooms_updated", callback, event).await;
            }
        }
        PokerEvent::ModeChanged(event) => {
            let callback = handlers.lock().unwrap().mode_changed.clone();
            if let Some(callback) = callback {
                invoke("mode_changed", callback, event).await;
            }
        }
    }
}

/// Runs one handler in its own task so a panic is contained and logged
/// instead of tearing down the receive loop.
async fn invoke<E: Send + 'static>(kind: &'static str, callback: Callback<E>, event: E) {
    let task = tokio::spawn(async move { callback(event).await });
    if let Err(error) = task.await {
        error!(event_type = kind, error = %error, "Event handler failed");
    }
}
