//! Encoding and creation for Offset Commit requests.
//!
//! ### Protocol Def
//! ```text
//! OffsetCommit Request (Version: 2) => group_id generation_id member_id retention_time_ms [topics]
//!   group_id => STRING
//!   generation_id => INT32
//!   member_id => STRING
//!   retention_time_ms => INT64
//!   topics => name [partitions]
//!     name => STRING
//!     partitions => partition_index committed_offset committed_metadata
//!       partition_index => INT32
//!       committed_offset => INT64
//!       committed_metadata => NULLABLE_STRING
//! ```

use bytes::BufMut;

use crate::{encode::ToByte, error::Result, protocol::HeaderRequest};

const API_KEY_OFFSET_COMMIT: i16 = 8;
const API_VERSION: i16 = 2;

#[derive(Debug)]
pub struct OffsetCommitRequest<'a> {
    pub header: HeaderRequest<'a>,
    pub group_id: &'a str,
    pub generation_id: i32,
    pub member_id: &'a str,
    /// How long the broker keeps the offsets; -1 uses the broker setting.
    pub retention_time_ms: i64,
    pub topics: Vec<Topic<'a>>,
}

#[derive(Debug)]
pub struct Topic<'a> {
    pub name: &'a str,
    pub partitions: Vec<Partition<'a>>,
}

#[derive(Debug)]
pub struct Partition<'a> {
    pub partition_index: i32,
    pub committed_offset: i64,
    pub committed_metadata: Option<&'a str>,
}

impl<'a> OffsetCommitRequest<'a> {
    pub fn new(
        correlation_id: i32,
        client_id: &'a str,
        group_id: &'a str,
        generation_id: i32,
        member_id: &'a str,
        retention_time_ms: i64,
    ) -> Self {
        Self {
            header: HeaderRequest::new(
                API_KEY_OFFSET_COMMIT,
                API_VERSION,
                correlation_id,
                client_id,
            ),
            group_id,
            generation_id,
            member_id,
            retention_time_ms,
            topics: vec![],
        }
    }

    /// Stage an offset; a later call for the same partition replaces it.
    pub fn add(
        &mut self,
        topic_name: &'a str,
        partition_index: i32,
        committed_offset: i64,
        committed_metadata: Option<&'a str>,
    ) {
        let partition = Partition {
            partition_index,
            committed_offset,
            committed_metadata,
        };
        match self.topics.iter_mut().find(|topic| topic.name == topic_name) {
            None => self.topics.push(Topic {
                name: topic_name,
                partitions: vec![partition],
            }),
            Some(topic) => match topic
                .partitions
                .iter_mut()
                .find(|p| p.partition_index == partition_index)
            {
                Some(existing) => *existing = partition,
                None => topic.partitions.push(partition),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

impl<'a> ToByte for OffsetCommitRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding OffsetCommitRequest {:?}", self);
        self.header.encode(buffer)?;
        self.group_id.encode(buffer)?;
        self.generation_id.encode(buffer)?;
        self.member_id.encode(buffer)?;
        self.retention_time_ms.encode(buffer)?;
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

impl<'a> ToByte for Partition<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.partition_index.encode(buffer)?;
        self.committed_offset.encode(buffer)?;
        self.committed_metadata.encode(buffer)?;
        Ok(())
    }
}
