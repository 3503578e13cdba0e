//! Error types for bring-up: argument validation, antenna file loading,
//! and socket setup. The receive/write hot path never returns `Result` —
//! per the error handling design, failures there are logged and the
//! pipeline keeps running.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("antenna file {path}: {reason}")]
    AntennaFile { path: PathBuf, reason: String },

    #[error("antenna file {path}:{line}: {reason}")]
    AntennaFileLine {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("failed to bind UDP socket on port {port}: {source}")]
    SocketBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
