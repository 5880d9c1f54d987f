//! Parsing and processing for Sync Group responses.
//!
//! ### Protocol Def
//! ```text
//! SyncGroup Response (Version: 2) => throttle_time_ms error_code assignment
//!   throttle_time_ms => INT32
//!   error_code => INT16
//!   assignment => BYTES
//! ```

use bytes::Bytes;
use nom::{number::complete::be_i32, IResult};
use nombytes::NomBytes;

use super::MemberAssignment;
use crate::{
    error::{Error, KafkaCode, Result},
    parser,
    protocol::{check, parse_header_response, parse_response, HeaderResponse},
};

#[derive(Debug, PartialEq)]
pub struct SyncGroupResponse {
    pub header: HeaderResponse,
    pub throttle_time_ms: i32,
    pub error_code: KafkaCode,
    /// This member's [`MemberAssignment`], still encoded.
    pub assignment: Bytes,
}

impl SyncGroupResponse {
    pub fn is_error(&self) -> Result<()> {
        check(self.error_code)
    }

    pub fn member_assignment(&self) -> Result<MemberAssignment> {
        MemberAssignment::try_from(self.assignment.clone())
    }
}

impl TryFrom<Bytes> for SyncGroupResponse {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        parse_response("SyncGroupResponse", s, parse_sync_group_response)
    }
}

pub fn parse_sync_group_response(s: NomBytes) -> IResult<NomBytes, SyncGroupResponse> {
    let (s, header) = parse_header_response(s)?;
    let (s, throttle_time_ms) = be_i32(s)?;
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, assignment) = parser::parse_bytes(s)?;

    Ok((
        s,
        SyncGroupResponse {
            header,
            throttle_time_ms,
            error_code,
            assignment,
        },
    ))
}
