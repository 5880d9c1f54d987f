//! Encoding and creation for Heartbeat requests.
//!
//! ### Protocol Def
//! ```text
//! Heartbeat Request (Version: 0) => group_id generation_id member_id
//!   group_id => STRING
//!   generation_id => INT32
//!   member_id => STRING
//! ```

use bytes::BufMut;

use crate::{encode::ToByte, error::Result, protocol::HeaderRequest};

const API_KEY_HEARTBEAT: i16 = 12;
const API_VERSION: i16 = 0;

#[derive(Debug)]
pub struct HeartbeatRequest<'a> {
    pub header: HeaderRequest<'a>,
    pub group_id: &'a str,
    pub generation_id: i32,
    pub member_id: &'a str,
}

impl<'a> HeartbeatRequest<'a> {
    pub fn new(
        correlation_id: i32,
        client_id: &'a str,
        group_id: &'a str,
        generation_id: i32,
        member_id: &'a str,
    ) -> Self {
        Self {
            header: HeaderRequest::new(API_KEY_HEARTBEAT, API_VERSION, correlation_id, client_id),
            group_id,
            generation_id,
            member_id,
        }
    }
}

impl<'a> ToByte for HeartbeatRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding HeartbeatRequest {:?}", self);
        self.header.encode(buffer)?;
        self.group_id.encode(buffer)?;
        self.generation_id.encode(buffer)?;
        self.member_id.encode(buffer)?;
        Ok(())
    }
}
