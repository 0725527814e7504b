//! Core library for relay outbox planning.
//!
//! This crate provides the fundamental abstractions the planner is built on:
//! - Relay URL canonicalization and host keys
//! - Public key normalization and validation
//! - Signed event envelopes and relay-list decoding
//! - The write index (relay -> declaring pubkeys)
//! - Host-unique outbox relay selection

pub mod endpoint;
pub mod error;
pub mod event;
pub mod index;
pub mod key;
pub mod outbox;

pub use endpoint::{ExclusionSet, HostKey, RelayUrl};
pub use error::{Error, Result, SkipReason, UrlError};
pub use event::Event;
pub use index::{IndexStats, WriteIndex, WriteIndexBuilder};
pub use key::{KeySet, PubKey};
pub use outbox::unique_by_host;
