//! Keep a member alive in the group.
//!
//! Heartbeats also carry the rebalance signal: once another member joins
//! or leaves, the coordinator answers with `REBALANCE_IN_PROGRESS` and
//! the member has to join again.

pub mod request;
pub mod response;
