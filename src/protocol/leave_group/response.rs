//! Parsing and processing for Leave Group responses.
//!
//! ### Protocol Def
//! ```text
//! LeaveGroup Response (Version: 0) => error_code
//!   error_code => INT16
//! ```

use bytes::Bytes;
use nom::IResult;
use nombytes::NomBytes;

use crate::{
    error::{Error, KafkaCode, Result},
    parser,
    protocol::{check, parse_header_response, parse_response, HeaderResponse},
};

#[derive(Debug, PartialEq)]
pub struct LeaveGroupResponse {
    pub header: HeaderResponse,
    pub error_code: KafkaCode,
}

impl LeaveGroupResponse {
    pub fn is_error(&self) -> Result<()> {
        check(self.error_code)
    }
}

impl TryFrom<Bytes> for LeaveGroupResponse {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        parse_response("LeaveGroupResponse", s, parse_leave_group_response)
    }
}

pub fn parse_leave_group_response(s: NomBytes) -> IResult<NomBytes, LeaveGroupResponse> {
    let (s, header) = parse_header_response(s)?;
    let (s, error_code) = parser::parse_kafka_code(s)?;

    Ok((s, LeaveGroupResponse { header, error_code }))
}
