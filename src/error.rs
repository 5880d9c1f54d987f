//! Error types for the consumer group member.
use bytes::Bytes;
use num_derive::FromPrimitive;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("kafka error {0:?}")]
    KafkaError(KafkaCode),
    #[error("io error {0:?}")]
    IoError(std::io::ErrorKind),
    #[error("could not parse response {0:?}")]
    ParsingError(Bytes),
    #[error("could not encode request")]
    EncodingError,
    #[error("bytes were not valid utf8")]
    DecodingUtf8Error,
    #[error("no bootstrap broker addresses were given")]
    MissingBrokerConfigOptions,
    #[error("no leader for topic {0} partition {1}")]
    NoLeaderForTopicPartition(String, i32),
    #[error("no connection for broker {0}")]
    NoConnectionForBroker(i32),
    #[error("metadata is missing topic {0}")]
    MetadataNeedsSync(String),
    #[error("assignment strategy {0} is not supported")]
    AssignmentStrategyNotSupported(String),
    #[error("record batch compression {0} is not supported")]
    UnsupportedCompression(i16),
    #[error("record batch magic {0} is not supported")]
    UnsupportedMagic(i8),
    #[error("record batch at offset {0} failed its crc check")]
    CorruptRecordBatch(i64),
    #[error("response correlation id {received} does not match request {expected}")]
    CorrelationMismatch { expected: i32, received: i32 },
    #[error("broker connection is closed")]
    ConnectionClosed,
    #[error("consumer group was cancelled")]
    Cancelled,
    #[error("claim task failed: {0}")]
    TaskFailed(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err.kind())
    }
}

/// Various errors reported by a remote Kafka server.
/// See also [Kafka Errors](http://kafka.apache.org/protocol.html)
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
pub enum KafkaCode {
    /// An unexpected server error
    Unknown = -1,
    None = 0,
    /// The requested offset is outside the range of offsets
    /// maintained by the server for the given topic/partition
    OffsetOutOfRange = 1,
    /// This indicates that a message contents does not match its CRC
    CorruptMessage = 2,
    /// This request is for a topic or partition that does not exist
    /// on this broker.
    UnknownTopicOrPartition = 3,
    /// The message has a negative size
    InvalidMessageSize = 4,
    /// This error is thrown if we are in the middle of a leadership
    /// election and there is currently no leader for this partition
    /// and hence it is unavailable for writes.
    LeaderNotAvailable = 5,
    /// This error is thrown if the client attempts to send messages
    /// to a replica that is not the leader for some partition. It
    /// indicates that the clients metadata is out of date.
    NotLeaderForPartition = 6,
    /// This error is thrown if the request exceeds the user-specified
    /// time limit in the request.
    RequestTimedOut = 7,
    /// This is not a client facing error and is used mostly by tools
    /// when a broker is not alive.
    BrokerNotAvailable = 8,
    /// If replica is expected on a broker, but is not (this can be
    /// safely ignored).
    ReplicaNotAvailable = 9,
    /// The server has a configurable maximum message size to avoid
    /// unbounded memory allocation. This error is thrown if the
    /// client attempt to produce a message larger than this maximum.
    MessageSizeTooLarge = 10,
    /// Internal error code for broker-to-broker communication.
    StaleControllerEpoch = 11,
    /// If you specify a string larger than configured maximum for
    /// offset metadata
    OffsetMetadataTooLarge = 12,
    /// The server disconnected before a response was received.
    NetworkException = 13,
    /// The broker returns this error code for an offset fetch request
    /// if it is still loading offsets (after a leader change for that
    /// offsets topic partition), or in response to group membership
    /// requests (such as heartbeats) when group metadata is being
    /// loaded by the coordinator.
    GroupLoadInProgress = 14,
    /// The broker returns this error code for group coordinator
    /// requests, offset commits, and most group management requests
    /// if the offsets topic has not yet been created, or if the group
    /// coordinator is not active.
    GroupCoordinatorNotAvailable = 15,
    /// The broker returns this error code if it receives an offset
    /// fetch or commit request for a group that it is not a
    /// coordinator for.
    NotCoordinatorForGroup = 16,
    /// For a request which attempts to access an invalid topic
    /// (e.g. one which has an illegal name), or if an attempt is made
    /// to write to an internal topic (such as the consumer offsets
    /// topic).
    InvalidTopic = 17,
    /// If a message batch in a produce request exceeds the maximum
    /// configured segment size.
    RecordListTooLarge = 18,
    /// Returned from a produce request when the number of in-sync
    /// replicas is lower than the configured minimum and requiredAcks is
    /// -1.
    NotEnoughReplicas = 19,
    /// Returned from a produce request when the message was written
    /// to the log, but with fewer in-sync replicas than required.
    NotEnoughReplicasAfterAppend = 20,
    /// Returned from a produce request if the requested requiredAcks is
    /// invalid (anything other than -1, 1, or 0).
    InvalidRequiredAcks = 21,
    /// Returned from group membership requests (such as heartbeats) when
    /// the generation id provided in the request is not the current
    /// generation.
    IllegalGeneration = 22,
    /// Returned in join group when the member provides a protocol type or
    /// set of protocols which is not compatible with the current group.
    InconsistentGroupProtocol = 23,
    /// Returned in join group when the groupId is empty or null.
    InvalidGroupId = 24,
    /// Returned from group requests (offset commits/fetches, heartbeats,
    /// etc) when the memberId is not in the current generation.
    UnknownMemberId = 25,
    /// Return in join group when the requested session timeout is
    /// outside of the allowed range on the broker
    InvalidSessionTimeout = 26,
    /// Returned in heartbeat requests when the coordinator has begun
    /// rebalancing the group. This indicates to the client that it
    /// should rejoin the group.
    RebalanceInProgress = 27,
    /// This error indicates that an offset commit was rejected because of
    /// oversize metadata.
    InvalidCommitOffsetSize = 28,
    /// Returned by the broker when the client is not authorized to access
    /// the requested topic.
    TopicAuthorizationFailed = 29,
    /// Returned by the broker when the client is not authorized to access
    /// a particular groupId.
    GroupAuthorizationFailed = 30,
    /// Returned by the broker when the client is not authorized to use an
    /// inter-broker or administrative API.
    ClusterAuthorizationFailed = 31,
    /// The timestamp of the message is out of acceptable range.
    InvalidTimestamp = 32,
    /// The broker does not support the requested SASL mechanism.
    UnsupportedSaslMechanism = 33,
    /// Request is not valid given the current SASL state.
    IllegalSaslState = 34,
    /// The version of API is not supported.
    UnsupportedVersion = 35,
    /// The group member needs to have a valid member id before actually
    /// entering a consumer group.
    MemberIdRequired = 79,
}

impl KafkaCode {
    /// Codes after which the current generation is gone and the member
    /// has to go through join and sync again.
    pub fn is_rebalance(&self) -> bool {
        matches!(
            self,
            KafkaCode::RebalanceInProgress
                | KafkaCode::IllegalGeneration
                | KafkaCode::UnknownMemberId
                | KafkaCode::NotCoordinatorForGroup
                | KafkaCode::GroupCoordinatorNotAvailable
        )
    }
}

impl Error {
    /// Whether the error means the connection it came from can no longer be used.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            Error::IoError(_)
                | Error::ConnectionClosed
                | Error::CorrelationMismatch { .. }
                | Error::KafkaError(KafkaCode::NotCoordinatorForGroup)
                | Error::KafkaError(KafkaCode::GroupCoordinatorNotAvailable)
        )
    }

    /// Whether the fetched data itself cannot be read. Fetching the same
    /// offset again gives the same answer.
    pub fn is_unreadable_batch(&self) -> bool {
        matches!(
            self,
            Error::CorruptRecordBatch(_) | Error::UnsupportedCompression(_) | Error::UnsupportedMagic(_)
        )
    }
}

#[cfg(test)]
mod test {
    use num_traits::FromPrimitive;

    use super::*;

    #[test]
    fn codes_map_from_the_wire() {
        assert_eq!(KafkaCode::from_i16(27), Some(KafkaCode::RebalanceInProgress));
        assert_eq!(KafkaCode::from_i16(-1), Some(KafkaCode::Unknown));
        assert_eq!(KafkaCode::from_i16(500), None);
    }

    #[test]
    fn rebalance_codes() {
        assert!(KafkaCode::RebalanceInProgress.is_rebalance());
        assert!(KafkaCode::IllegalGeneration.is_rebalance());
        assert!(!KafkaCode::OffsetOutOfRange.is_rebalance());
    }

    #[test]
    fn unreadable_batches() {
        assert!(Error::CorruptRecordBatch(3).is_unreadable_batch());
        assert!(Error::UnsupportedCompression(2).is_unreadable_batch());
        assert!(!Error::ConnectionClosed.is_unreadable_batch());
        assert!(!Error::KafkaError(KafkaCode::OffsetOutOfRange).is_unreadable_batch());
    }
}
