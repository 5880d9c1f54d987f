//! Parsing and processing for Fetch responses.
//!
//! The `records` of each partition are kept as bytes here and only split
//! into batches by [`Partition::records_from`], so a damaged batch fails
//! that partition rather than the whole response.
//!
//! ### Protocol Def
//! ```text
//! Fetch Response (Version: 4) => throttle_time_ms [responses]
//!   throttle_time_ms => INT32
//!   responses => topic [partitions]
//!     topic => STRING
//!     partitions => partition_index error_code high_watermark last_stable_offset [aborted_transactions] records
//!       partition_index => INT32
//!       error_code => INT16
//!       high_watermark => INT64
//!       last_stable_offset => INT64
//!       aborted_transactions => producer_id first_offset
//!         producer_id => INT64
//!         first_offset => INT64
//!       records => RECORDS
//! ```

use bytes::Bytes;
use nom::{
    number::complete::{be_i32, be_i64},
    IResult,
};
use nombytes::NomBytes;

use super::records::{decode_batches, Record};
use crate::{
    error::{Error, KafkaCode, Result},
    parser,
    protocol::{check, parse_header_response, parse_response, HeaderResponse},
};

#[derive(Debug, PartialEq)]
pub struct FetchResponse {
    pub header: HeaderResponse,
    pub throttle_time_ms: i32,
    pub topics: Vec<Topic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    pub name: Bytes,
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub partition_index: i32,
    pub error_code: KafkaCode,
    pub high_watermark: i64,
    pub last_stable_offset: i64,
    /// Null on the wire unless reading committed.
    pub aborted_transactions: Vec<AbortedTransaction>,
    pub records: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AbortedTransaction {
    pub producer_id: i64,
    pub first_offset: i64,
}

impl FetchResponse {
    pub fn partition(&self, topic: &str, partition_index: i32) -> Option<&Partition> {
        self.topics
            .iter()
            .find(|t| t.name == topic.as_bytes())
            .and_then(|t| {
                t.partitions
                    .iter()
                    .find(|p| p.partition_index == partition_index)
            })
    }
}

impl Partition {
    pub fn is_error(&self) -> Result<()> {
        check(self.error_code)
    }

    /// Records at or after `fetch_offset`, in log order.
    ///
    /// Batches are returned whole, so the first one may start before the
    /// offset that was asked for.
    pub fn records_from(&self, fetch_offset: i64) -> Result<Vec<Record>> {
        Ok(decode_batches(self.records.clone())?
            .into_iter()
            .flat_map(|batch| batch.records)
            .filter(|record| record.offset >= fetch_offset)
            .collect())
    }
}

impl TryFrom<Bytes> for FetchResponse {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        parse_response("FetchResponse", s, parse_fetch_response)
    }
}

pub fn parse_fetch_response(s: NomBytes) -> IResult<NomBytes, FetchResponse> {
    let (s, header) = parse_header_response(s)?;
    let (s, throttle_time_ms) = be_i32(s)?;
    let (s, topics) = parser::parse_array(parse_topic)(s)?;

    Ok((
        s,
        FetchResponse {
            header,
            throttle_time_ms,
            topics,
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
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, high_watermark) = be_i64(s)?;
    let (s, last_stable_offset) = be_i64(s)?;
    let (s, aborted_transactions) = parser::parse_array(parse_aborted_transaction)(s)?;
    let (s, records) = parser::parse_nullable_bytes(s)?;

    Ok((
        s,
        Partition {
            partition_index,
            error_code,
            high_watermark,
            last_stable_offset,
            aborted_transactions,
            records: records.unwrap_or_default(),
        },
    ))
}

fn parse_aborted_transaction(s: NomBytes) -> IResult<NomBytes, AbortedTransaction> {
    let (s, producer_id) = be_i64(s)?;
    let (s, first_offset) = be_i64(s)?;
    Ok((
        s,
        AbortedTransaction {
            producer_id,
            first_offset,
        },
    ))
}
