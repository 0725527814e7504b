//! Replication strategies for relay outbox planning.
//!
//! This crate decides which relays to subscribe to and which authors to ask
//! each relay for:
//! - How many relays each author should be read from (replication factor)
//! - Which relays to select (greedy multi-replica set cover)
//! - The resulting relay -> authors assignment

pub mod placement;
pub mod strategy;

pub use placement::Assignment;
pub use strategy::{GreedyStrategy, ReplicationStrategy};
