//! Encoding and creation for Fetch requests.
//!
//! ### Protocol Def
//! ```text
//! Fetch Request (Version: 4) => replica_id max_wait_ms min_bytes max_bytes isolation_level [topics]
//!   replica_id => INT32
//!   max_wait_ms => INT32
//!   min_bytes => INT32
//!   max_bytes => INT32
//!   isolation_level => INT8
//!   topics => topic [partitions]
//!     topic => STRING
//!     partitions => partition fetch_offset partition_max_bytes
//!       partition => INT32
//!       fetch_offset => INT64
//!       partition_max_bytes => INT32
//! ```

use bytes::BufMut;

use crate::{encode::ToByte, error::Result, protocol::HeaderRequest};

const API_KEY_FETCH: i16 = 1;
const API_VERSION: i16 = 4;
const CONSUMER_REPLICA_ID: i32 = -1;

#[derive(Debug)]
pub struct FetchRequest<'a> {
    pub header: HeaderRequest<'a>,
    pub replica_id: i32,
    /// How long the broker may hold the request waiting for `min_bytes`.
    pub max_wait_ms: i32,
    pub min_bytes: i32,
    pub max_bytes: i32,
    /// 0 reads uncommitted records, 1 stops at the last stable offset.
    pub isolation_level: i8,
    pub topics: Vec<Topic<'a>>,
}

#[derive(Debug)]
pub struct Topic<'a> {
    pub topic: &'a str,
    pub partitions: Vec<Partition>,
}

#[derive(Debug)]
pub struct Partition {
    pub partition: i32,
    pub fetch_offset: i64,
    pub partition_max_bytes: i32,
}

impl<'a> FetchRequest<'a> {
    pub fn new(
        correlation_id: i32,
        client_id: &'a str,
        max_wait_ms: i32,
        min_bytes: i32,
        max_bytes: i32,
        isolation_level: i8,
    ) -> Self {
        Self {
            header: HeaderRequest::new(API_KEY_FETCH, API_VERSION, correlation_id, client_id),
            replica_id: CONSUMER_REPLICA_ID,
            max_wait_ms,
            min_bytes,
            max_bytes,
            isolation_level,
            topics: vec![],
        }
    }

    pub fn add(
        &mut self,
        topic_name: &'a str,
        partition: i32,
        fetch_offset: i64,
        partition_max_bytes: i32,
    ) {
        let entry = Partition {
            partition,
            fetch_offset,
            partition_max_bytes,
        };
        match self.topics.iter_mut().find(|t| t.topic == topic_name) {
            None => self.topics.push(Topic {
                topic: topic_name,
                partitions: vec![entry],
            }),
            Some(topic) => {
                if !topic.partitions.iter().any(|p| p.partition == partition) {
                    topic.partitions.push(entry);
                }
            }
        }
    }
}

impl<'a> ToByte for FetchRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding FetchRequest {:?}", self);
        self.header.encode(buffer)?;
        self.replica_id.encode(buffer)?;
        self.max_wait_ms.encode(buffer)?;
        self.min_bytes.encode(buffer)?;
        self.max_bytes.encode(buffer)?;
        self.isolation_level.encode(buffer)?;
        self.topics.encode(buffer)?;
        Ok(())
    }
}

impl<'a> ToByte for Topic<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.topic.encode(buffer)?;
        self.partitions.encode(buffer)?;
        Ok(())
    }
}

impl ToByte for Partition {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.partition.encode(buffer)?;
        self.fetch_offset.encode(buffer)?;
        self.partition_max_bytes.encode(buffer)?;
        Ok(())
    }
}
