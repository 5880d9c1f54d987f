//! Locate the current coordinator of a group.
//!
//! Group membership and committed offsets are owned by one broker per
//! group. Any broker answers this request with that broker's address;
//! after `NOT_COORDINATOR_FOR_GROUP` or a dropped connection the member
//! asks again.

pub mod request;
pub mod response;
