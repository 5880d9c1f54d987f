//! Become a member of a group, creating it if there are no active members.
//!
//! Joining is the first half of a rebalance. Every member sends the list of
//! assignment strategies it supports together with its subscription, the
//! coordinator picks one strategy all members share, bumps the generation
//! and elects a leader. Only the leader receives the other members'
//! subscriptions; it computes the assignment and hands it back through
//! [`SyncGroup`](super::sync_group).
//!
//! The group membership API is generic: subscriptions and assignments are
//! opaque bytes to the coordinator. Consumers embed the schema below so
//! that tooling such as `kafka-consumer-groups.sh` can read them.
//!
//! ```text
//! Subscription => Version [Topic] UserData
//!   Version => int16
//!   Topic => string
//!   UserData => nullable bytes
//! ```
//!
//! Newer clients append fields after `UserData`; those are ignored when
//! parsing another member's subscription.

pub mod request;
pub mod response;

use bytes::{BufMut, Bytes};
use nom::{number::complete::be_i16, IResult};
use nombytes::NomBytes;

use crate::{
    encode::{AsStrings, ToByte},
    error::Result,
    parser,
};

/// Version of the embedded consumer protocol written by this member.
pub const SUBSCRIPTION_VERSION: i16 = 0;

/// What a member wants to consume, embedded in its join request.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub version: i16,
    pub topics: Vec<String>,
    pub user_data: Option<Bytes>,
}

impl Subscription {
    pub fn new(topics: Vec<String>) -> Self {
        Self {
            version: SUBSCRIPTION_VERSION,
            topics,
            user_data: None,
        }
    }
}

impl ToByte for Subscription {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.version.encode(buffer)?;
        AsStrings(self.topics.as_slice()).encode(buffer)?;
        self.user_data.encode(buffer)?;
        Ok(())
    }
}

impl TryFrom<Bytes> for Subscription {
    type Error = crate::error::Error;

    fn try_from(s: Bytes) -> Result<Self> {
        let (topics, version, user_data) =
            crate::protocol::parse_response("Subscription", s, parse_subscription)?;
        Ok(Subscription {
            version,
            topics: topics
                .iter()
                .map(parser::to_string)
                .collect::<Result<Vec<String>>>()?,
            user_data,
        })
    }
}

type RawSubscription = (Vec<Bytes>, i16, Option<Bytes>);

fn parse_subscription(s: NomBytes) -> IResult<NomBytes, RawSubscription> {
    let (s, version) = be_i16(s)?;
    let (s, topics) = parser::parse_array(parser::parse_string)(s)?;
    let (s, user_data) = parser::parse_nullable_bytes(s)?;
    Ok((s, (topics, version, user_data)))
}
