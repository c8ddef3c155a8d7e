use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::Sender;
use tokio::net::TcpListener;

use crate::host::Inbound;
use crate::player_registry::PlayerRegistry;

/// Bind `bind_addr` and accept clients until an accept fails.
pub async fn run(
    bind_addr: &str,
    inbox: Sender<Inbound>,
    registry: Arc<PlayerRegistry>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!("Listening on {}", bind_addr);
    serve(listener, inbox, registry).await
}

/// Accept loop on an already-bound listener.
pub async fn serve(
    listener: TcpListener,
    inbox: Sender<Inbound>,
    registry: Arc<PlayerRegistry>,
) -> anyhow::Result<()> {
    let next_conn_id = AtomicU64::new(1);
    loop {
        let (stream, addr) = listener.accept().await?;
        let conn_id = next_conn_id.fetch_add(1, Ordering::Relaxed);
        tracing::info!("Connection {} from {}", conn_id, addr);

        let inbox = inbox.clone();
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            if let Err(e) = super::connection::handle(stream, conn_id, inbox, registry).await {
                tracing::warn!("Connection from {} closed: {:#}", addr, e);
            }
        });
    }
}
