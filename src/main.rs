//! Task pool server
//!
//! Accepts line-oriented client connections that manage a dynamic pool of
//! workers and submit tasks to it.

use std::sync::Arc;
use taskpool::config::Config;
use taskpool::error::ServiceError;
use taskpool::pool::WorkerPool;
use taskpool::server::serve;
use taskpool::state::AppState;
use taskpool::worker::Report;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskpool=info,taskpool_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ServiceError> {
    let config = Arc::new(Config::load()?);
    info!("Configuration loaded: {:?}", config);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServiceError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(addr = %addr, "Server started");

    // Completed tasks go to the operator, not back to clients
    let (report_tx, report_rx) = mpsc::unbounded_channel();
    let operator = tokio::spawn(print_reports(report_rx));

    let app_state = Arc::new(AppState {
        pool: WorkerPool::new(&config, report_tx),
        config: config.clone(),
    });

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    serve(listener, app_state.clone(), shutdown).await;
    app_state.pool.shutdown().await;

    // Dropping the pool drops the last report sender
    drop(app_state);
    let _ = operator.await;

    info!("Server stopped");
    Ok(())
}

async fn print_reports(mut reports: mpsc::UnboundedReceiver<Report>) {
    while let Some(report) = reports.recv().await {
        println!("{}", report.output);
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }

    info!("Shutting down...");
    shutdown.cancel();
}
