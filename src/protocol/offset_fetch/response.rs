//! Parsing and processing for Offset Fetch responses.
//!
//! ### Protocol Def
//! ```text
//! OffsetFetch Response (Version: 2) => [topics] error_code
//!   topics => name [partitions]
//!     name => STRING
//!     partitions => partition_index committed_offset metadata error_code
//!       partition_index => INT32
//!       committed_offset => INT64
//!       metadata => NULLABLE_STRING
//!       error_code => INT16
//!   error_code => INT16
//! ```

use bytes::Bytes;
use nom::{
    number::complete::{be_i32, be_i64},
    IResult,
};
use nombytes::NomBytes;

use crate::{
    error::{Error, KafkaCode, Result},
    parser,
    protocol::{check, parse_header_response, parse_response, HeaderResponse},
};

#[derive(Debug, PartialEq)]
pub struct OffsetFetchResponse {
    pub header: HeaderResponse,
    pub topics: Vec<Topic>,
    /// Group level error, such as a coordinator that moved.
    pub error_code: KafkaCode,
}

#[derive(Debug, PartialEq)]
pub struct Topic {
    pub name: Bytes,
    pub partitions: Vec<Partition>,
}

#[derive(Debug, PartialEq)]
pub struct Partition {
    pub partition_index: i32,
    /// The committed offset, or -1 if nothing was committed.
    pub committed_offset: i64,
    pub metadata: Option<Bytes>,
    pub error_code: KafkaCode,
}

impl OffsetFetchResponse {
    /// The group level code first, then the first failing partition.
    pub fn is_error(&self) -> Result<()> {
        check(self.error_code)?;
        self.topics
            .iter()
            .flat_map(|topic| topic.partitions.iter())
            .try_for_each(|partition| check(partition.error_code))
    }
}

impl TryFrom<Bytes> for OffsetFetchResponse {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        parse_response("OffsetFetchResponse", s, parse_offset_fetch_response)
    }
}

pub fn parse_offset_fetch_response(s: NomBytes) -> IResult<NomBytes, OffsetFetchResponse> {
    let (s, header) = parse_header_response(s)?;
    let (s, topics) = parser::parse_array(parse_topic)(s)?;
    let (s, error_code) = parser::parse_kafka_code(s)?;

    Ok((
        s,
        OffsetFetchResponse {
            header,
            topics,
            error_code,
        },
    ))
}

fn parse_topic(s: NomBytes) -> IResult<NomBytes, Topic> {
    let (s, name) = parser::parse_string(s)?;
    let (s, partitions) = parser::parse_array(parse_partition)(s)?;
    Ok((s, Topic { name, partitions }))
}

fn parse_partition(s: NomBytes) -> IResult<NomBytes, Partition> {
    let (s, partition_index) = be_i32(s)?;
    let (s, committed_offset) = be_i64(s)?;
    let (s, metadata) = parser::parse_nullable_string(s)?;
    let (s, error_code) = parser::parse_kafka_code(s)?;
    Ok((
        s,
        Partition {
            partition_index,
            committed_offset,
            metadata,
            error_code,
        },
    ))
}
