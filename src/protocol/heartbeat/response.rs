//! Parsing and processing for Heartbeat responses.
//!
//! ### Protocol Def
//! ```text
//! Heartbeat Response (Version: 0) => error_code
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
pub struct HeartbeatResponse {
    pub header: HeaderResponse,
    pub error_code: KafkaCode,
}

impl HeartbeatResponse {
    pub fn is_error(&self) -> Result<()> {
        check(self.error_code)
    }
}

impl TryFrom<Bytes> for HeartbeatResponse {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        parse_response("HeartbeatResponse", s, parse_heartbeat_response)
    }
}

pub fn parse_heartbeat_response(s: NomBytes) -> IResult<NomBytes, HeartbeatResponse> {
    let (s, header) = parse_header_response(s)?;
    let (s, error_code) = parser::parse_kafka_code(s)?;

    Ok((s, HeartbeatResponse { header, error_code }))
}
