//! Encoding and creation for Join Group requests.
//!
//! A member joining for the first time sends an empty member id and
//! uses the one the coordinator hands back from then on. The session
//! timeout bounds how long the coordinator waits between heartbeats
//! before evicting the member; the rebalance timeout bounds how long it
//! waits for every member to rejoin once a rebalance has started.
//!
//! ### Protocol Def
//! ```text
//! JoinGroup Request (Version: 2) => group_id session_timeout_ms rebalance_timeout_ms member_id protocol_type [protocols]
//!   group_id => STRING
//!   session_timeout_ms => INT32
//!   rebalance_timeout_ms => INT32
//!   member_id => STRING
//!   protocol_type => STRING
//!   protocols => name metadata
//!     name => STRING
//!     metadata => BYTES
//! ```

use bytes::BufMut;

use super::Subscription;
use crate::{
    encode::{encode_embedded, ToByte},
    error::Result,
    protocol::HeaderRequest,
};

const API_KEY_JOIN_GROUP: i16 = 11;
const API_VERSION: i16 = 2;

#[derive(Debug)]
pub struct JoinGroupRequest<'a> {
    pub header: HeaderRequest<'a>,
    /// The group identifier.
    pub group_id: &'a str,
    /// The coordinator considers the consumer dead if it receives no heartbeat after this timeout in milliseconds.
    pub session_timeout_ms: i32,
    /// The maximum time in milliseconds that the coordinator will wait for each member to rejoin when rebalancing the group.
    pub rebalance_timeout_ms: i32,
    /// Empty if the member is joining for the first time.
    pub member_id: &'a str,
    /// Always `consumer` for consumer groups.
    pub protocol_type: &'a str,
    /// Assignment strategies this member supports, most preferred first.
    pub protocols: Vec<GroupProtocol<'a>>,
}

#[derive(Debug)]
pub struct GroupProtocol<'a> {
    /// The strategy name, such as `roundrobin` or `range`.
    pub name: &'a str,
    pub subscription: Subscription,
}

impl<'a> JoinGroupRequest<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        correlation_id: i32,
        client_id: &'a str,
        group_id: &'a str,
        session_timeout_ms: i32,
        rebalance_timeout_ms: i32,
        member_id: &'a str,
        protocol_type: &'a str,
        protocols: Vec<GroupProtocol<'a>>,
    ) -> Self {
        Self {
            header: HeaderRequest::new(API_KEY_JOIN_GROUP, API_VERSION, correlation_id, client_id),
            group_id,
            session_timeout_ms,
            rebalance_timeout_ms,
            member_id,
            protocol_type,
            protocols,
        }
    }
}

impl<'a> ToByte for JoinGroupRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding JoinGroupRequest {:?}", self);
        self.header.encode(buffer)?;
        self.group_id.encode(buffer)?;
        self.session_timeout_ms.encode(buffer)?;
        self.rebalance_timeout_ms.encode(buffer)?;
        self.member_id.encode(buffer)?;
        self.protocol_type.encode(buffer)?;
        self.protocols.encode(buffer)?;
        Ok(())
    }
}

impl<'a> ToByte for GroupProtocol<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.name.encode(buffer)?;
        encode_embedded(&self.subscription, buffer)
    }
}
