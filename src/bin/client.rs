//! Interactive client: forwards stdin lines to the server and prints
//! whatever the server sends back, whenever it arrives.

use futures::{SinkExt, StreamExt};
use taskpool::config::Config;
use taskpool::error::ServiceError;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskpool_client=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "Client failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ServiceError> {
    let config = Config::load()?;
    let stream = TcpStream::connect(config.dial_addr()).await?;
    let (read_half, write_half) = stream.into_split();

    let mut from_server = FramedRead::new(read_half, LinesCodec::new());
    let mut to_server = FramedWrite::new(write_half, LinesCodec::new());

    let mut reader = tokio::spawn(async move {
        while let Some(line) = from_server.next().await {
            match line {
                Ok(line) => println!("{}", line),
                Err(e) => {
                    debug!(error = %e, "Stopped reading from server");
                    break;
                }
            }
        }
    });

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = &mut reader => return Ok(()),
            line = stdin.next_line() => match line? {
                Some(line) => {
                    if let Err(e) = to_server.send(line).await {
                        debug!(error = %e, "Server connection closed");
                        break;
                    }
                }
                None => break,
            },
        }
    }

    // Local input ended; let the server's last lines arrive
    drop(to_server);
    let _ = reader.await;
    Ok(())
}
