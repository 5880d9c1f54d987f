//! Encoding and creation for Leave Group requests.
//!
//! ### Protocol Def
//! ```text
//! LeaveGroup Request (Version: 0) => group_id member_id
//!   group_id => STRING
//!   member_id => STRING
//! ```

use bytes::BufMut;

use crate::{encode::ToByte, error::Result, protocol::HeaderRequest};

const API_KEY_LEAVE_GROUP: i16 = 13;
const API_VERSION: i16 = 0;

#[derive(Debug)]
pub struct LeaveGroupRequest<'a> {
    pub header: HeaderRequest<'a>,
    pub group_id: &'a str,
    pub member_id: &'a str,
}

impl<'a> LeaveGroupRequest<'a> {
    pub fn new(
        correlation_id: i32,
        client_id: &'a str,
        group_id: &'a str,
        member_id: &'a str,
    ) -> Self {
        Self {
            header: HeaderRequest::new(API_KEY_LEAVE_GROUP, API_VERSION, correlation_id, client_id),
            group_id,
            member_id,
        }
    }
}

impl<'a> ToByte for LeaveGroupRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding LeaveGroupRequest {:?}", self);
        self.header.encode(buffer)?;
        self.group_id.encode(buffer)?;
        self.member_id.encode(buffer)?;
        Ok(())
    }
}
