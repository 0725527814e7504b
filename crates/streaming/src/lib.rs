//! Subscription plans for the router.
//!
//! This crate turns a relay -> authors assignment into router streams:
//! - Bounded author chunks per selected relay
//! - Catch-all streams for under-replicated authors
//! - The user's own outbound and mention streams
//! - Rendering of the plan as a router configuration file

pub mod codec;
pub mod error;
pub mod plan;

pub use codec::RouterConfigCodec;
pub use error::PlanError;
pub use plan::{build_plan, safe_name, Direction, PartitionConfig, StreamSpec, SubscriptionPlan};
