//! Synchronize state for all members of a group (e.g. distribute partition assignments to consumers).
//!
//! Every member sends SyncGroup right after joining; only the leader
//! fills in the assignments. The coordinator answers each member with
//! its own share once the leader's request has arrived.
//!
//! The share is opaque bytes on the wire, encoded with the consumer
//! protocol's assignment schema:
//!
//! ```text
//! MemberAssignment => Version [Topic [Partition]] UserData
//!   Version => int16
//!   Topic => string
//!   Partition => int32
//!   UserData => nullable bytes
//! ```
//!
//! A member left without partitions may receive zero bytes instead.

pub mod request;
pub mod response;

use bytes::{BufMut, Bytes};
use nom::{
    number::complete::{be_i16, be_i32},
    IResult,
};
use nombytes::NomBytes;

use crate::{
    encode::ToByte,
    error::{Error, Result},
    parser,
    protocol::parse_response,
};

pub const ASSIGNMENT_VERSION: i16 = 0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberAssignment {
    pub version: i16,
    pub topics: Vec<TopicAssignment>,
    pub user_data: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicAssignment {
    pub topic: String,
    pub partitions: Vec<i32>,
}

impl MemberAssignment {
    pub fn new(topics: Vec<TopicAssignment>) -> Self {
        Self {
            version: ASSIGNMENT_VERSION,
            topics,
            user_data: None,
        }
    }

    pub fn partition_count(&self) -> usize {
        self.topics.iter().map(|t| t.partitions.len()).sum()
    }
}

impl ToByte for MemberAssignment {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.version.encode(buffer)?;
        self.topics.encode(buffer)?;
        self.user_data.encode(buffer)?;
        Ok(())
    }
}

impl ToByte for TopicAssignment {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.topic.encode(buffer)?;
        self.partitions.encode(buffer)?;
        Ok(())
    }
}

impl TryFrom<Bytes> for MemberAssignment {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        if s.is_empty() {
            return Ok(MemberAssignment::default());
        }
        let (version, topics, user_data) =
            parse_response("MemberAssignment", s, parse_member_assignment)?;
        let topics = topics
            .into_iter()
            .map(|(topic, partitions)| {
                Ok(TopicAssignment {
                    topic: parser::to_string(&topic)?,
                    partitions,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MemberAssignment {
            version,
            topics,
            user_data,
        })
    }
}

type RawAssignment = (i16, Vec<(Bytes, Vec<i32>)>, Option<Bytes>);

fn parse_member_assignment(s: NomBytes) -> IResult<NomBytes, RawAssignment> {
    let (s, version) = be_i16(s)?;
    let (s, topics) = parser::parse_array(parse_topic_assignment)(s)?;
    let (s, user_data) = parser::parse_nullable_bytes(s)?;
    Ok((s, (version, topics, user_data)))
}

fn parse_topic_assignment(s: NomBytes) -> IResult<NomBytes, (Bytes, Vec<i32>)> {
    let (s, topic) = parser::parse_string(s)?;
    let (s, partitions) = parser::parse_array(be_i32)(s)?;
    Ok((s, (topic, partitions)))
}

#[cfg(test)]
mod test {
    use nombytes::NomBytes;

    use super::*;
    use crate::{encode::ToByte, error::KafkaCode, protocol};

    fn assignment_bytes() -> Vec<u8> {
        let mut b = vec![0, 0, 0, 0, 0, 1, 0, 10];
        b.extend_from_slice(b"test-topic");
        b.extend_from_slice(&[0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 2, 255, 255, 255, 255]);
        b
    }

    fn assignment() -> MemberAssignment {
        MemberAssignment::new(vec![TopicAssignment {
            topic: "test-topic".to_owned(),
            partitions: vec![0, 2],
        }])
    }

    #[test]
    fn encode() {
        let mut b = vec![0, 14, 0, 2, 0, 0, 0, 1, 0, 4];
        b.extend_from_slice(b"rust");
        b.extend_from_slice(&[0, 5]);
        b.extend_from_slice(b"group");
        b.extend_from_slice(&[0, 0, 0, 3, 0, 2]);
        b.extend_from_slice(b"m1");
        b.extend_from_slice(&[0, 0, 0, 2]);
        b.extend_from_slice(&[0, 2]);
        b.extend_from_slice(b"m1");
        b.extend_from_slice(&[0, 0, 0, 34]);
        b.extend_from_slice(&assignment_bytes());
        b.extend_from_slice(&[0, 2]);
        b.extend_from_slice(b"m2");
        b.extend_from_slice(&[0, 0, 0, 10, 0, 0, 0, 0, 0, 0, 255, 255, 255, 255]);

        let req = request::SyncGroupRequest::new(
            1,
            "rust",
            "group",
            3,
            "m1",
            vec![
                request::GroupAssignment {
                    member_id: "m1",
                    assignment: assignment(),
                },
                request::GroupAssignment {
                    member_id: "m2",
                    assignment: MemberAssignment::new(vec![]),
                },
            ],
        );
        let mut buffer: Vec<u8> = vec![];
        req.encode(&mut buffer).unwrap();

        assert_eq!(buffer, b);
    }

    #[test]
    fn parse() {
        let mut b = vec![0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 34];
        b.extend_from_slice(&assignment_bytes());

        let (_, parsed) =
            response::parse_sync_group_response(NomBytes::new(Bytes::from(b))).unwrap();
        assert_eq!(
            parsed.header,
            protocol::HeaderResponse { correlation_id: 1 }
        );
        assert_eq!(parsed.error_code, KafkaCode::None);
        assert_eq!(parsed.member_assignment().unwrap(), assignment());
        assert_eq!(parsed.member_assignment().unwrap().partition_count(), 2);
    }

    #[test]
    fn empty_assignment_means_no_partitions() {
        let b = Bytes::from_static(b"\0\0\0\x01\0\0\0\0\0\x1b\0\0\0\0");
        let parsed = response::SyncGroupResponse::try_from(b).unwrap();
        assert_eq!(parsed.error_code, KafkaCode::RebalanceInProgress);
        assert!(parsed.is_error().is_err());
        assert_eq!(parsed.member_assignment().unwrap(), MemberAssignment::default());
    }
}
