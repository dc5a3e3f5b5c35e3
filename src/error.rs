//! Crate-wide error types

use thiserror::Error;

/// Result type alias for nanokv operations
pub type Result<T> = std::result::Result<T, Error>;

/// nanokv error types, grouped by subsystem
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Compute (parser/analyzer) errors
    #[error("wrong symbol '{symbol}' at pos {pos}")]
    WrongSymbol { symbol: char, pos: usize },

    #[error("empty query")]
    EmptyQuery,

    #[error("command must be a command")]
    MustBeCommand,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("wrong number of arguments: {0}")]
    WrongNumberOfArguments(&'static str),

    #[error("wrong key")]
    WrongKey,

    #[error("wrong argument: {0}")]
    WrongArgument(&'static str),

    // Storage errors
    #[error("key not found")]
    KeyNotFound,

    // WAL errors
    #[error("WAL error: {0}")]
    Wal(String),

    #[error("WAL segment not found: {0}")]
    WalSegmentNotFound(String),

    #[error("WAL entry corrupted in segment {segment}: {reason}")]
    WalCorrupted { segment: String, reason: String },

    #[error("WAL serialization error: {0}")]
    WalSerialization(#[from] bincode::Error),

    // Replication errors
    #[error("replication error: {0}")]
    Replication(String),

    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    // Network errors
    #[error("network error: {0}")]
    Network(String),

    #[error("connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("connection timeout to {0}")]
    ConnectionTimeout(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal
    #[error("internal error: {0}")]
    Internal(String),

    #[error("shutdown in progress")]
    ShuttingDown,
}

impl Error {
    /// Human-readable response string as returned on the client wire protocol.
    ///
    /// GET/SET/DEL errors are success-shaped on the wire; the client tells
    /// success from failure by content, not by framing.
    pub fn as_response(&self) -> String {
        self.to_string()
    }

    /// Whether a replication-side error is worth retrying on the next tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectionTimeout(_) | Error::PeerUnreachable(_) | Error::Network(_)
        )
    }
}
