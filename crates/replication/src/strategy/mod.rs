//! Replication strategy abstractions.
//!
//! A replication strategy turns a write index into an [`Assignment`]:
//! the relays to subscribe to and, for each, the authors to request.
//!
//! - **GreedyStrategy**: repeatedly picks the relay that satisfies the most
//!   outstanding replica need

pub mod greedy;

pub use greedy::GreedyStrategy;

use corelib::WriteIndex;

use crate::placement::Assignment;

/// Trait for replication strategies.
///
/// A replication strategy determines:
/// 1. How many distinct relays each author should be read from
/// 2. Which relays to select
/// 3. Which authors each selected relay is asked for
///
/// # Thread Safety
///
/// Implementations must be thread-safe (Send + Sync) as they may be
/// shared across threads.
pub trait ReplicationStrategy: Send + Sync + 'static {
    /// Get the number of relays each author should be assigned to.
    ///
    /// # Returns
    /// Replication factor (always >= 1)
    fn replication_factor(&self) -> usize;

    /// Select relays and assign authors to them.
    ///
    /// Must be deterministic: the same index yields the same selection
    /// order and the same per-relay author lists.
    fn assign(&self, index: &WriteIndex) -> Assignment;

    /// Get the strategy name (for logging/debugging).
    fn name(&self) -> &'static str;
}
