//! Encoding and creation for Sync Group requests.
//!
//! ### Protocol Def
//! ```text
//! SyncGroup Request (Version: 2) => group_id generation_id member_id [assignments]
//!   group_id => STRING
//!   generation_id => INT32
//!   member_id => STRING
//!   assignments => member_id assignment
//!     member_id => STRING
//!     assignment => BYTES
//! ```

use bytes::BufMut;

use super::MemberAssignment;
use crate::{
    encode::{encode_embedded, ToByte},
    error::Result,
    protocol::HeaderRequest,
};

const API_KEY_SYNC_GROUP: i16 = 14;
const API_VERSION: i16 = 2;

#[derive(Debug)]
pub struct SyncGroupRequest<'a> {
    pub header: HeaderRequest<'a>,
    pub group_id: &'a str,
    pub generation_id: i32,
    pub member_id: &'a str,
    /// Each member's share. Empty unless this member is the leader.
    pub assignments: Vec<GroupAssignment<'a>>,
}

#[derive(Debug, Clone)]
pub struct GroupAssignment<'a> {
    pub member_id: &'a str,
    pub assignment: MemberAssignment,
}

impl<'a> SyncGroupRequest<'a> {
    pub fn new(
        correlation_id: i32,
        client_id: &'a str,
        group_id: &'a str,
        generation_id: i32,
        member_id: &'a str,
        assignments: Vec<GroupAssignment<'a>>,
    ) -> Self {
        Self {
            header: HeaderRequest::new(API_KEY_SYNC_GROUP, API_VERSION, correlation_id, client_id),
            group_id,
            generation_id,
            member_id,
            assignments,
        }
    }
}

impl<'a> ToByte for SyncGroupRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding SyncGroupRequest {:?}", self);
        self.header.encode(buffer)?;
        self.group_id.encode(buffer)?;
        self.generation_id.encode(buffer)?;
        self.member_id.encode(buffer)?;
        self.assignments.encode(buffer)?;
        Ok(())
    }
}

impl<'a> ToByte for GroupAssignment<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.member_id.encode(buffer)?;
        encode_embedded(&self.assignment, buffer)
    }
}
