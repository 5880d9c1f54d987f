//! Encoding and creation for List Offsets requests.
//!
//! ### Protocol Def
//! ```text
//! ListOffsets Request (Version: 1) => replica_id [topics]
//!   replica_id => INT32
//!   topics => name [partitions]
//!     name => STRING
//!     partitions => partition_index timestamp
//!       partition_index => INT32
//!       timestamp => INT64
//! ```

use bytes::BufMut;

use crate::{encode::ToByte, error::Result, protocol::HeaderRequest};

const API_KEY_LIST_OFFSETS: i16 = 2;
const API_VERSION: i16 = 1;
/// Consumers are not replicas.
const CONSUMER_REPLICA_ID: i32 = -1;

#[derive(Debug)]
pub struct ListOffsetsRequest<'a> {
    pub header: HeaderRequest<'a>,
    pub replica_id: i32,
    pub topics: Vec<Topic<'a>>,
}

#[derive(Debug)]
pub struct Topic<'a> {
    pub name: &'a str,
    pub partitions: Vec<Partition>,
}

#[derive(Debug)]
pub struct Partition {
    pub partition_index: i32,
    pub timestamp: i64,
}

impl<'a> ListOffsetsRequest<'a> {
    pub fn new(correlation_id: i32, client_id: &'a str) -> Self {
        Self {
            header: HeaderRequest::new(API_KEY_LIST_OFFSETS, API_VERSION, correlation_id, client_id),
            replica_id: CONSUMER_REPLICA_ID,
            topics: vec![],
        }
    }

    pub fn add(&mut self, topic_name: &'a str, partition_index: i32, timestamp: i64) {
        let partition = Partition {
            partition_index,
            timestamp,
        };
        match self.topics.iter_mut().find(|topic| topic.name == topic_name) {
            None => self.topics.push(Topic {
                name: topic_name,
                partitions: vec![partition],
            }),
            Some(topic) => {
                if !topic
                    .partitions
                    .iter()
                    .any(|p| p.partition_index == partition_index)
                {
                    topic.partitions.push(partition);
                }
            }
        }
    }
}

impl<'a> ToByte for ListOffsetsRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding ListOffsetsRequest {:?}", self);
        self.header.encode(buffer)?;
        self.replica_id.encode(buffer)?;
        self.topics.encode(buffer)?;
        Ok(())
    }
}

impl<'a> ToByte for Topic<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.name.encode(buffer)?;
        self.partitions.encode(buffer)?;
        Ok(())
    }
}

impl ToByte for Partition {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.partition_index.encode(buffer)?;
        self.timestamp.encode(buffer)?;
        Ok(())
    }
}
