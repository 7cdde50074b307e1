//! Accept loop and connection orchestration

use crate::handlers::handle_connection;
use crate::state::AppState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Accept connections until `shutdown` is cancelled.
///
/// Cancellation closes the listener and is also seen by every open
/// connection. Before returning, the shared task queue is closed and all
/// connection handlers have finished; the caller then shuts the pool down.
pub async fn serve(listener: TcpListener, state: Arc<AppState>, shutdown: CancellationToken) {
    let connections = TaskTracker::new();

    loop {
        let accepted = tokio::select! {
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Error accepting connection");
                continue;
            }
        };

        let span = info_span!("connection", %peer, session = %Uuid::new_v4());
        let state = state.clone();
        let shutdown = shutdown.clone();
        connections.spawn(
            async move {
                if let Err(e) = handle_connection(stream, peer.to_string(), state, shutdown).await {
                    warn!(error = %e, "Connection closed with error");
                }
            }
            .instrument(span),
        );
    }

    drop(listener);
    info!(open = connections.len(), "Listener closed, draining connections");

    state.pool.close_queue().await;
    connections.close();
    connections.wait().await;

    info!("All connections finished");
}
