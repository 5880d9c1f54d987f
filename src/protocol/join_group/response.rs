//! Parsing and processing for Join Group responses.
//!
//! Every member learns the chosen strategy, the new generation id and
//! who the leader is. The member list is only filled in for the leader;
//! followers get an empty array and wait for their share in SyncGroup.
//! Requests carrying an older generation id are answered with
//! `ILLEGAL_GENERATION` from here on.
//!
//! ### Protocol Def
//! ```text
//! JoinGroup Response (Version: 2) => throttle_time_ms error_code generation_id protocol_name leader member_id [members]
//!   throttle_time_ms => INT32
//!   error_code => INT16
//!   generation_id => INT32
//!   protocol_name => STRING
//!   leader => STRING
//!   member_id => STRING
//!   members => member_id metadata
//!     member_id => STRING
//!     metadata => BYTES
//! ```

use bytes::Bytes;
use nom::{number::complete::be_i32, IResult};
use nombytes::NomBytes;

use super::Subscription;
use crate::{
    error::{Error, KafkaCode, Result},
    parser::{self, parse_array},
    protocol::{check, parse_header_response, parse_response, HeaderResponse},
};

#[derive(Debug, PartialEq)]
pub struct JoinGroupResponse {
    pub header: HeaderResponse,
    /// The duration in milliseconds for which the request was throttled due to a quota violation, or zero if the request did not violate any quota.
    pub throttle_time_ms: i32,
    /// The error code, or 0 if there was no error.
    pub error_code: KafkaCode,
    /// The generation ID of the group.
    pub generation_id: i32,
    /// The group protocol selected by the coordinator.
    pub protocol_name: Bytes,
    /// The leader of the group.
    pub leader: Bytes,
    /// The member ID assigned by the group coordinator.
    pub member_id: Bytes,
    /// Each member in the group, in join order. Empty if this member is not the leader.
    pub members: Vec<Member>,
}

#[derive(Debug, PartialEq)]
pub struct Member {
    pub member_id: Bytes,
    /// The member's embedded [`Subscription`].
    pub metadata: Bytes,
}

impl Member {
    pub fn subscription(&self) -> Result<Subscription> {
        Subscription::try_from(self.metadata.clone())
    }
}

impl JoinGroupResponse {
    pub fn is_error(&self) -> Result<()> {
        check(self.error_code)
    }

    pub fn is_leader(&self) -> bool {
        self.leader == self.member_id
    }
}

impl TryFrom<Bytes> for JoinGroupResponse {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        parse_response("JoinGroupResponse", s, parse_join_group_response)
    }
}

pub fn parse_join_group_response(s: NomBytes) -> IResult<NomBytes, JoinGroupResponse> {
    let (s, header) = parse_header_response(s)?;
    let (s, throttle_time_ms) = be_i32(s)?;
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, generation_id) = be_i32(s)?;
    let (s, protocol_name) = parser::parse_string(s)?;
    let (s, leader) = parser::parse_string(s)?;
    let (s, member_id) = parser::parse_string(s)?;
    let (s, members) = parse_array(parse_member)(s)?;

    Ok((
        s,
        JoinGroupResponse {
            header,
            throttle_time_ms,
            error_code,
            generation_id,
            protocol_name,
            leader,
            member_id,
            members,
        },
    ))
}

fn parse_member(s: NomBytes) -> IResult<NomBytes, Member> {
    let (s, member_id) = parser::parse_string(s)?;
    let (s, metadata) = parser::parse_bytes(s)?;
    Ok((
        s,
        Member {
            member_id,
            metadata,
        },
    ))
}
