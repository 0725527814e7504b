//! Error types for the core library.

use thiserror::Error;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the core library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Public key is not 64 lowercase hex characters
    #[error("invalid pubkey: {0}")]
    InvalidKey(String),
    /// Event could not be decoded
    #[error("malformed event: {0}")]
    MalformedEvent(String),
}

/// Reasons a relay URL is rejected by [`RelayUrl::parse`](crate::RelayUrl::parse).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("empty relay URL")]
    Empty,
    #[error("relay URL must use ws or wss scheme")]
    UnsupportedScheme,
    #[error("relay URL must not contain query or fragment")]
    QueryOrFragment,
    #[error("relay URL must have a host")]
    MissingHost,
    #[error("malformed relay URL: {0}")]
    Malformed(String),
}

/// Why a single relay-list record was left out of the write index.
///
/// Skips are never fatal; the builder tallies them in
/// [`IndexStats`](crate::IndexStats).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum SkipReason {
    #[error("blank or non-object line")]
    NotAnObject,
    #[error("event body could not be decoded")]
    Undecodable,
    #[error("event is not a relay list")]
    WrongKind,
}
