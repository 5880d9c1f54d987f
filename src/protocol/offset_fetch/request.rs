//! Encoding and creation for Offset Fetch requests.
//!
//! ### Protocol Def
//! ```text
//! OffsetFetch Request (Version: 2) => group_id [topics]
//!   group_id => STRING
//!   topics => name [partition_indexes]
//!     name => STRING
//!     partition_indexes => INT32
//! ```

use bytes::BufMut;

use crate::{encode::ToByte, error::Result, protocol::HeaderRequest};

const API_KEY_OFFSET_FETCH: i16 = 9;
const API_VERSION: i16 = 2;

#[derive(Debug)]
pub struct OffsetFetchRequest<'a> {
    pub header: HeaderRequest<'a>,
    pub group_id: &'a str,
    pub topics: Vec<Topic<'a>>,
}

#[derive(Debug)]
pub struct Topic<'a> {
    pub name: &'a str,
    pub partition_indexes: Vec<i32>,
}

impl<'a> OffsetFetchRequest<'a> {
    pub fn new(correlation_id: i32, client_id: &'a str, group_id: &'a str) -> Self {
        Self {
            header: HeaderRequest::new(API_KEY_OFFSET_FETCH, API_VERSION, correlation_id, client_id),
            group_id,
            topics: vec![],
        }
    }

    /// Ask for a partition; asking twice is the same as asking once.
    pub fn add(&mut self, topic_name: &'a str, partition_index: i32) {
        match self.topics.iter_mut().find(|topic| topic.name == topic_name) {
            None => self.topics.push(Topic {
                name: topic_name,
                partition_indexes: vec![partition_index],
            }),
            Some(topic) => {
                if !topic.partition_indexes.contains(&partition_index) {
                    topic.partition_indexes.push(partition_index);
                }
            }
        }
    }
}

impl<'a> ToByte for OffsetFetchRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding OffsetFetchRequest {:?}", self);
        self.header.encode(buffer)?;
        self.group_id.encode(buffer)?;
        self.topics.encode(buffer)?;
        Ok(())
    }
}

impl<'a> ToByte for Topic<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.name.encode(buffer)?;
        self.partition_indexes.encode(buffer)?;
        Ok(())
    }
}
