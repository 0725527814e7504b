//! Error types for plan construction.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// The user key for personal streams is not a 64-hex pubkey
    #[error("invalid user pubkey: {0}")]
    InvalidUserKey(String),
}
