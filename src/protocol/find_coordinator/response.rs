//! Parsing and processing for Find Coordinator responses.
//!
//! ### Protocol Def
//! ```text
//! FindCoordinator Response (Version: 0) => error_code node_id host port
//!   error_code => INT16
//!   node_id => INT32
//!   host => STRING
//!   port => INT32
//! ```

use bytes::Bytes;
use nom::{number::complete::be_i32, IResult};
use nombytes::NomBytes;

use crate::{
    error::{Error, KafkaCode, Result},
    parser,
    protocol::{check, parse_header_response, parse_response, HeaderResponse},
};

#[derive(Debug, PartialEq)]
pub struct FindCoordinatorResponse {
    pub header: HeaderResponse,
    pub error_code: KafkaCode,
    /// The node id of the coordinator.
    pub node_id: i32,
    pub host: Bytes,
    pub port: i32,
}

impl FindCoordinatorResponse {
    pub fn is_error(&self) -> Result<()> {
        check(self.error_code)
    }

    /// `host:port` of the coordinator, ready for a connection.
    pub fn addr(&self) -> Result<String> {
        Ok(format!("{}:{}", parser::to_string(&self.host)?, self.port))
    }
}

impl TryFrom<Bytes> for FindCoordinatorResponse {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        parse_response(
            "FindCoordinatorResponse",
            s,
            parse_find_coordinator_response,
        )
    }
}

pub fn parse_find_coordinator_response(s: NomBytes) -> IResult<NomBytes, FindCoordinatorResponse> {
    let (s, header) = parse_header_response(s)?;
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, node_id) = be_i32(s)?;
    let (s, host) = parser::parse_string(s)?;
    let (s, port) = be_i32(s)?;

    Ok((
        s,
        FindCoordinatorResponse {
            header,
            error_code,
            node_id,
            host,
            port,
        },
    ))
}
