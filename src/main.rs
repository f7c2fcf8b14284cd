use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use planpoker::event::transport::inbound_channel;
use planpoker::{
    EventPublisher, EventSubscriber, InMemoryRoomRepository, MessageTransport, RedisTransport,
    RepositoryMirror, RoomRepository,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "planpoker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting planning poker sync node");

    let broker_url =
        std::env::var("BROKER_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());

    // Explicit construction and injection; lifecycle owned here.
    let repository: Arc<dyn RoomRepository> = Arc::new(InMemoryRoomRepository::new());
    let (inbound_tx, inbound_rx) = inbound_channel();

    let transport: Arc<dyn MessageTransport> = match RedisTransport::connect(&broker_url, inbound_tx)
    {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            error!(broker_url = %broker_url, error = %e, "Invalid broker URL");
            return;
        }
    };

    let publisher = Arc::new(EventPublisher::new(Arc::clone(&transport)));
    let subscriber = EventSubscriber::new(
        Arc::clone(&repository),
        publisher,
        Arc::clone(&transport),
        inbound_rx,
    );

    // Local actions keep working against the repository even when the broker
    // is down; the mirror only needs the subscriptions once it comes up.
    let mirror = RepositoryMirror::new(Arc::clone(&repository));
    if let Err(e) = mirror.attach(&subscriber).await {
        warn!(error = %e, "Broker subscriptions unavailable, running local-only");
    }

    let worker = subscriber.start();
    info!(broker_url = %broker_url, "Sync node running; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");

    info!("Shutting down");
    transport.disconnect().await;
    let _ = worker.await;
}
