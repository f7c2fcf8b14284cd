use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ConnectionState, InboundMessage, MessageTransport};
use crate::shared::AppError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

enum Command {
    Subscribe(String),
    Shutdown,
}

/// Broker transport over redis pub/sub.
///
/// Channels map 1:1 to topics. Publishes go over a multiplexed connection
/// and resolve once the server accepts them; a dedicated pub/sub connection
/// is driven by a background task that reconnects with exponential backoff
/// and reasserts the accumulated subscription set. Messages published while
/// the subscription is down are lost to this client — there is no replay.
pub struct RedisTransport {
    client: redis::Client,
    client_id: String,
    control: mpsc::Sender<Command>,
    publish_conn: tokio::sync::Mutex<Option<MultiplexedConnection>>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl RedisTransport {
    /// Spawns the subscription task and returns the transport handle.
    ///
    /// Only a malformed broker URL fails here; an unreachable broker is a
    /// runtime condition the task keeps retrying, while local operation
    /// continues.
    pub fn connect(
        broker_url: &str,
        inbound: mpsc::Sender<InboundMessage>,
    ) -> Result<Self, AppError> {
        let client =
            redis::Client::open(broker_url).map_err(|e| AppError::Broker(e.to_string()))?;
        let client_id = format!("client-{}", Uuid::new_v4());
        let (control_tx, control_rx) = mpsc::channel(16);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        info!(client_id = %client_id, broker_url = %broker_url, "Starting broker connection");
        tokio::spawn(run_subscription(
            client.clone(),
            client_id.clone(),
            control_rx,
            inbound,
            state_tx,
        ));

        Ok(Self {
            client,
            client_id,
            control: control_tx,
            publish_conn: tokio::sync::Mutex::new(None),
            state_rx,
        })
    }
}

#[async_trait]
impl MessageTransport for RedisTransport {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), AppError> {
        let mut guard = self.publish_conn.lock().await;

        let mut connection = match guard.take() {
            Some(connection) => connection,
            None => timeout(CONNECT_TIMEOUT, self.client.get_multiplexed_tokio_connection())
                .await
                .map_err(|_| AppError::Broker("broker connect timed out".to_string()))?
                .map_err(|e| AppError::Broker(e.to_string()))?,
        };

        let result: redis::RedisResult<i64> = connection.publish(topic, payload).await;
        match result {
            Ok(receivers) => {
                // Server-side acceptance only; receivers is informational.
                debug!(client_id = %self.client_id, topic = %topic, receivers, "Published");
                *guard = Some(connection);
                Ok(())
            }
            Err(error) => Err(AppError::Broker(error.to_string())),
        }
    }

    async fn subscribe(&self, topic: &str) -> Result<(), AppError> {
        self.control
            .send(Command::Subscribe(topic.to_string()))
            .await
            .map_err(|_| AppError::Broker("subscription task stopped".to_string()))
    }

    async fn disconnect(&self) {
        let _ = self.control.send(Command::Shutdown).await;
        self.publish_conn.lock().await.take();
        debug!(client_id = %self.client_id, "Broker disconnect requested");
    }

    fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }
}

enum Step {
    Control(Option<Command>),
    Message(Option<redis::Msg>),
}

async fn run_subscription(
    client: redis::Client,
    client_id: String,
    mut control: mpsc::Receiver<Command>,
    inbound: mpsc::Sender<InboundMessage>,
    state: watch::Sender<ConnectionState>,
) {
    let mut topics: HashSet<String> = HashSet::new();
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let _ = state.send(ConnectionState::Connecting);

        let connection = match timeout(CONNECT_TIMEOUT, client.get_async_connection()).await {
            Ok(Ok(connection)) => Some(connection),
            Ok(Err(error)) => {
                warn!(client_id = %client_id, error = %error, "Broker connect failed");
                None
            }
            Err(_) => {
                warn!(client_id = %client_id, "Broker connect timed out");
                None
            }
        };

        let Some(connection) = connection else {
            if !wait_for_retry(&mut control, &mut topics, backoff).await {
                let _ = state.send(ConnectionState::Disconnected);
                return;
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
            continue;
        };

        let mut pubsub = connection.into_pubsub();
        let mut resubscribed = true;
        for topic in &topics {
            if let Err(error) = pubsub.subscribe(topic).await {
                warn!(client_id = %client_id, topic = %topic, error = %error, "Resubscription failed");
                resubscribed = false;
                break;
            }
        }
        if !resubscribed {
            if !wait_for_retry(&mut control, &mut topics, backoff).await {
                let _ = state.send(ConnectionState::Disconnected);
                return;
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
            continue;
        }

        info!(client_id = %client_id, topics = topics.len(), "Broker connected");
        let _ = state.send(ConnectionState::Connected);
        backoff = INITIAL_BACKOFF;

        loop {
            // The message stream borrows the pub/sub connection, so decide on
            // one step inside this scope and act on it after the stream drops.
            let step = {
                let mut stream = pubsub.on_message();
                tokio::select! {
                    command = control.recv() => Step::Control(command),
                    message = stream.next() => Step::Message(message),
                }
            };

            match step {
                Step::Control(Some(Command::Subscribe(topic))) => {
                    if topics.insert(topic.clone()) {
                        if let Err(error) = pubsub.subscribe(&topic).await {
                            warn!(client_id = %client_id, topic = %topic, error = %error, "Subscribe failed");
                            let _ = state.send(ConnectionState::ConnectionLost);
                            break;
                        }
                        debug!(client_id = %client_id, topic = %topic, "Subscribed");
                    }
                }
                Step::Control(Some(Command::Shutdown)) | Step::Control(None) => {
                    let _ = state.send(ConnectionState::Disconnected);
                    info!(client_id = %client_id, "Broker connection closed");
                    return;
                }
                Step::Message(Some(message)) => {
                    let topic = message.get_channel_name().to_string();
                    match message.get_payload::<String>() {
                        Ok(payload) => {
                            if inbound.send(InboundMessage { topic, payload }).await.is_err() {
                                // Application side is gone; nothing left to feed.
                                let _ = state.send(ConnectionState::Disconnected);
                                return;
                            }
                        }
                        Err(error) => {
                            warn!(client_id = %client_id, topic = %topic, error = %error, "Non-text payload skipped");
                        }
                    }
                }
                Step::Message(None) => {
                    warn!(client_id = %client_id, "Broker connection lost");
                    let _ = state.send(ConnectionState::ConnectionLost);
                    break;
                }
            }
        }

        if !wait_for_retry(&mut control, &mut topics, backoff).await {
            let _ = state.send(ConnectionState::Disconnected);
            return;
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// Sits out the reconnect delay while still accepting control traffic, so
/// subscriptions registered during an outage are covered by the next
/// connection. Returns false on shutdown.
async fn wait_for_retry(
    control: &mut mpsc::Receiver<Command>,
    topics: &mut HashSet<String>,
    delay: Duration,
) -> bool {
    let deadline = sleep(delay);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => return true,
            command = control.recv() => match command {
                Some(Command::Subscribe(topic)) => {
                    topics.insert(topic);
                }
                Some(Command::Shutdown) | None => return false,
            }
        }
    }
}
