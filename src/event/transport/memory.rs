use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::{ConnectionState, InboundMessage, MessageTransport};
use crate::shared::AppError;

type ClientMap = Mutex<HashMap<Uuid, BrokerClient>>;

struct BrokerClient {
    topics: HashSet<String>,
    inbound: mpsc::Sender<InboundMessage>,
}

/// Process-local broker hub for tests and single-process runs.
///
/// Routes every published payload to each client subscribed to that exact
/// topic — including the publishing client itself, matching the loopback a
/// real broker gives separate publisher/subscriber connections.
pub struct InMemoryBroker {
    clients: Arc<ClientMap>,
}

impl InMemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Creates a transport connected to this broker, delivering into the
    /// given inbound channel.
    pub fn transport(&self, inbound: mpsc::Sender<InboundMessage>) -> InMemoryTransport {
        let client_id = Uuid::new_v4();
        self.clients.lock().unwrap().insert(
            client_id,
            BrokerClient {
                topics: HashSet::new(),
                inbound,
            },
        );
        debug!(client_id = %client_id, "In-memory broker client connected");

        InMemoryTransport {
            clients: Arc::clone(&self.clients),
            client_id,
            state: Mutex::new(ConnectionState::Connected),
        }
    }
}

/// A client connection to an `InMemoryBroker`.
pub struct InMemoryTransport {
    clients: Arc<ClientMap>,
    client_id: Uuid,
    state: Mutex<ConnectionState>,
}

#[async_trait]
impl MessageTransport for InMemoryTransport {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), AppError> {
        if self.state() != ConnectionState::Connected {
            return Err(AppError::Broker("transport disconnected".to_string()));
        }

        // Clone the targets out so no lock is held across the sends.
        let targets: Vec<(Uuid, mpsc::Sender<InboundMessage>)> = self
            .clients
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, client)| client.topics.contains(topic))
            .map(|(id, client)| (*id, client.inbound.clone()))
            .collect();

        for (client_id, target) in targets {
            let message = InboundMessage {
                topic: topic.to_string(),
                payload: payload.to_string(),
            };
            if target.send(message).await.is_err() {
                debug!(client_id = %client_id, topic = %topic, "Receiver gone, dropping client");
                self.clients.lock().unwrap().remove(&client_id);
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), AppError> {
        if self.state() != ConnectionState::Connected {
            return Err(AppError::Broker("transport disconnected".to_string()));
        }
        if let Some(client) = self.clients.lock().unwrap().get_mut(&self.client_id) {
            client.topics.insert(topic.to_string());
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.clients.lock().unwrap().remove(&self.client_id);
        *self.state.lock().unwrap() = ConnectionState::Disconnected;
        debug!(client_id = %self.client_id, "In-memory broker client disconnected");
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }
}
