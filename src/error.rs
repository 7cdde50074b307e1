//! Error types for the task pool service
//!
//! Pool and command errors render as the reply line sent to the client.

use crate::worker::WorkerId;
use thiserror::Error;
use tokio_util::codec::LinesCodecError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("there is no worker {0}")]
    NotFound(WorkerId),

    #[error("no worker to delete")]
    EmptyPool,

    #[error("no workers to process task, add worker and retry")]
    NoWorkers,

    #[error("no worker accepted task within {0}ms, add worker and retry")]
    Timeout(u64),

    #[error("worker pool is shut down")]
    Closed,
}

/// Malformed client input. Never fatal for the connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid command")]
    Invalid,

    #[error("task can not be blank")]
    BlankTask,

    #[error("command has no parameters")]
    NoParameters,

    #[error("not numeric id {0}")]
    NotNumericId(String),
}

/// Transport failure on a single client connection.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line exceeds {max} bytes")]
    LineTooLong { max: usize },
}

impl ConnectionError {
    pub(crate) fn from_codec(err: LinesCodecError, max: usize) -> Self {
        match err {
            LinesCodecError::MaxLineLengthExceeded => ConnectionError::LineTooLong { max },
            LinesCodecError::Io(e) => ConnectionError::Io(e),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Fatal startup errors for the binaries.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
