//! Look up offsets by timestamp.
//!
//! Two timestamps have special meaning: `-1` asks for the log end offset
//! (the offset the next produced record will get) and `-2` for the log
//! start offset. A member without a committed offset uses one of them
//! depending on its initial offset policy.

pub mod request;
pub mod response;

/// Timestamp asking for the offset the next record will be written at.
pub const LATEST_TIMESTAMP: i64 = -1;
/// Timestamp asking for the oldest offset still retained.
pub const EARLIEST_TIMESTAMP: i64 = -2;
