use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::PokerEvent;
use super::transport::MessageTransport;

/// Fire-and-forget broadcast of domain events to the broker.
///
/// A publish resolves once the broker accepts the message; it never waits
/// for subscribers. While the broker is unreachable, events are dropped with
/// a log line and the caller carries on — local state stays authoritative.
pub struct EventPublisher {
    transport: Arc<dyn MessageTransport>,
    client_id: String,
}

impl EventPublisher {
    pub fn new(transport: Arc<dyn MessageTransport>) -> Self {
        let client_id = format!("publisher-{}", Uuid::new_v4());
        info!(client_id = %client_id, "Event publisher ready");
        Self {
            transport,
            client_id,
        }
    }

    pub async fn publish(&self, event: PokerEvent) {
        let topic = event.topic();
        let payload = match event.encode() {
            Ok(payload) => payload,
            Err(error) => {
                error!(
                    client_id = %self.client_id,
                    event_type = event.event_type(),
                    error = %error,
                    "Event not encodable, dropped"
                );
                return;
            }
        };

        match self.transport.publish(topic, &payload).await {
            Ok(()) => {
                debug!(
                    client_id = %self.client_id,
                    topic = %topic,
                    payload = %payload,
                    "Event published"
                );
            }
            Err(error) => {
                warn!(
                    client_id = %self.client_id,
                    topic = %topic,
                    error = %error,
                    "Broker unavailable, event dropped"
                );
            }
        }
    }
}
