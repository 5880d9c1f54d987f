//! Describe the brokers of a cluster and who leads each partition.
//!
//! Any broker answers a metadata request. The member uses it at start up
//! to learn the partition count of each subscribed topic and to route
//! fetches to each partition's leader.

pub mod request;
pub mod response;
