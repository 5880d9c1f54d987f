//! Bytecode protocol requests & responses.
//!
//! Only the messages a consumer group member needs are implemented, as
//! described in the [Kafka Documentation](https://kafka.apache.org/protocol.html):
//!
//! | API              | key | version |
//! |------------------|-----|---------|
//! | Fetch            | 1   | 4       |
//! | ListOffsets      | 2   | 1       |
//! | Metadata         | 3   | 0       |
//! | OffsetCommit     | 8   | 2       |
//! | OffsetFetch      | 9   | 2       |
//! | FindCoordinator  | 10  | 0       |
//! | JoinGroup        | 11  | 2       |
//! | Heartbeat        | 12  | 0       |
//! | LeaveGroup       | 13  | 0       |
//! | SyncGroup        | 14  | 2       |
//!
//! Each message lives in its own module with a `request` file that builds
//! and encodes what is sent and a `response` file that parses what comes
//! back. Every request starts with a [`HeaderRequest`] and every response
//! with a [`HeaderResponse`].

pub mod commit_offset;
pub mod fetch;
pub mod find_coordinator;
pub mod heartbeat;
pub mod join_group;
pub mod leave_group;
pub mod list_offsets;
pub mod metadata;
pub mod offset_fetch;
pub mod sync_group;

use std::fmt::Debug;

use bytes::{BufMut, Bytes};
use nom::{number::complete::be_i32, IResult};
use nombytes::NomBytes;

// re exporting these for ease
pub use self::{
    commit_offset::{request::OffsetCommitRequest, response::OffsetCommitResponse},
    fetch::{request::FetchRequest, response::FetchResponse},
    find_coordinator::{request::FindCoordinatorRequest, response::FindCoordinatorResponse},
    heartbeat::{request::HeartbeatRequest, response::HeartbeatResponse},
    join_group::{request::JoinGroupRequest, response::JoinGroupResponse},
    leave_group::{request::LeaveGroupRequest, response::LeaveGroupResponse},
    list_offsets::{request::ListOffsetsRequest, response::ListOffsetsResponse},
    metadata::{request::MetadataRequest, response::MetadataResponse},
    offset_fetch::{request::OffsetFetchRequest, response::OffsetFetchResponse},
    sync_group::{
        request::SyncGroupRequest, response::SyncGroupResponse, MemberAssignment,
        TopicAssignment,
    },
};
use crate::{
    encode::ToByte,
    error::{Error, KafkaCode, Result},
};

#[derive(Debug, Clone)]
pub struct HeaderRequest<'a> {
    /// The API key of this request.
    pub api_key: i16,
    /// The API version of this request.
    pub api_version: i16,
    /// The correlation ID of this request.
    pub correlation_id: i32,
    /// The client ID string.
    pub client_id: &'a str,
}

impl<'a> HeaderRequest<'a> {
    pub fn new(api_key: i16, api_version: i16, correlation_id: i32, client_id: &'a str) -> Self {
        Self {
            api_key,
            api_version,
            correlation_id,
            client_id,
        }
    }
}

impl<'a> ToByte for HeaderRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.api_key.encode(buffer)?;
        self.api_version.encode(buffer)?;
        self.correlation_id.encode(buffer)?;
        self.client_id.encode(buffer)?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct HeaderResponse {
    /// The correlation ID of this response.
    pub correlation_id: i32,
}

pub fn parse_header_response(s: NomBytes) -> IResult<NomBytes, HeaderResponse> {
    let (s, correlation_id) = be_i32(s)?;
    Ok((s, HeaderResponse { correlation_id }))
}

/// Run a response parser over a whole frame, logging what failed to parse.
pub(crate) fn parse_response<T, F>(name: &str, s: Bytes, parser: F) -> Result<T>
where
    T: Debug,
    F: FnOnce(NomBytes) -> IResult<NomBytes, T>,
{
    tracing::trace!("Parsing {} {:?}", name, s);
    let (_, response) = parser(NomBytes::new(s.clone())).map_err(|err| {
        tracing::error!("ERROR: Failed parsing {} {:?}", name, err);
        tracing::error!("ERROR: {} Bytes {:?}", name, s);
        Error::ParsingError(s)
    })?;
    tracing::trace!("Parsed {} {:?}", name, response);
    Ok(response)
}

/// Turn a wire error code into a result.
pub(crate) fn check(code: KafkaCode) -> Result<()> {
    match code {
        KafkaCode::None => Ok(()),
        code => Err(Error::KafkaError(code)),
    }
}
