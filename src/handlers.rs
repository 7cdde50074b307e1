//! Per-connection command dispatcher
//!
//! Reads newline-terminated commands, drives the worker pool and writes
//! exactly one reply line per non-blank command.

use crate::command::{Command, PoolCommand};
use crate::error::{ConnectionError, PoolError};
use crate::pool::WorkerPool;
use crate::state::AppState;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const MSG_STOPPED: &str = "connection stopped";

/// Why the command loop ended
enum Exit {
    Quit,
    Eof,
    Shutdown,
}

/// Serve one client until `quit`, end of stream or `shutdown`.
pub async fn handle_connection<S>(
    stream: S,
    peer: String,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let max = state.config.max_line_length;
    let mut lines = Framed::new(stream, LinesCodec::new_with_max_length(max));

    info!("Client connected");
    lines
        .send(format!("Hello, {}", peer))
        .await
        .map_err(|e| ConnectionError::from_codec(e, max))?;

    let exit = loop {
        let next = tokio::select! {
            () = shutdown.cancelled() => break Exit::Shutdown,
            next = lines.next() => next,
        };

        let line = match next {
            Some(line) => line.map_err(|e| ConnectionError::from_codec(e, max))?,
            None => break Exit::Eof,
        };

        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        info!(command, "Command received");

        let reply = match Command::parse(command) {
            Ok(Command::Quit) => break Exit::Quit,
            Ok(Command::Pool(command)) => execute(command, &state.pool).await,
            Err(e) => e.to_string(),
        };

        lines
            .send(reply.as_str())
            .await
            .map_err(|e| ConnectionError::from_codec(e, max))?;
        info!(reply = %reply, "Reply sent");
    };

    match exit {
        Exit::Quit => lines
            .send(MSG_STOPPED)
            .await
            .map_err(|e| ConnectionError::from_codec(e, max))?,
        Exit::Eof | Exit::Shutdown => {
            // Peer may already be gone
            if let Err(e) = lines.send(MSG_STOPPED).await {
                debug!(error = %e, "Could not send stop notice");
            }
        }
    }

    info!("Client disconnected");
    Ok(())
}

/// Run a parsed command against the pool and render the reply line.
pub async fn execute(command: PoolCommand<'_>, pool: &WorkerPool) -> String {
    let result = match command {
        PoolCommand::SubmitTask(task) => pool
            .submit_task(task.to_string())
            .await
            .map(|()| "successful adding task".to_string()),
        PoolCommand::AddWorker => pool
            .add_worker()
            .await
            .map(|id| format!("successful adding worker {}", id)),
        PoolCommand::DeleteAnyWorker => pool
            .delete_any_worker()
            .await
            .map(|id| format!("successful deleting worker {}", id)),
        PoolCommand::DeleteWorker(id) => pool
            .delete_worker(id)
            .await
            .map(|()| format!("successful deleting worker {}", id)),
    };

    result.unwrap_or_else(|e: PoolError| e.to_string())
}
