//! Commit a set of offsets for a consumer group.
//!
//! The committed offset is the next offset the group should read, one
//! past the last processed record. Commits carry the generation and
//! member id; a stale generation is refused with `ILLEGAL_GENERATION`.

pub mod request;
pub mod response;

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use nombytes::NomBytes;

    use super::*;
    use crate::{encode::ToByte, error::KafkaCode};

    #[test]
    fn encode() {
        let mut b = vec![0, 8, 0, 2, 0, 0, 0, 4, 0, 4];
        b.extend_from_slice(b"rust");
        b.extend_from_slice(&[0, 5]);
        b.extend_from_slice(b"group");
        b.extend_from_slice(&[0, 0, 0, 6, 0, 2]);
        b.extend_from_slice(b"m1");
        b.extend_from_slice(&[255, 255, 255, 255, 255, 255, 255, 255]);
        b.extend_from_slice(&[0, 0, 0, 1, 0, 10]);
        b.extend_from_slice(b"test-topic");
        b.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 18, 255, 255]);

        let mut req = request::OffsetCommitRequest::new(4, "rust", "group", 6, "m1", -1);
        req.add("test-topic", 3, 17, None);
        req.add("test-topic", 3, 18, None);
        let mut buffer: Vec<u8> = vec![];
        req.encode(&mut buffer).unwrap();

        assert_eq!(buffer, b);
    }

    #[test]
    fn parse() {
        let mut b = vec![0, 0, 0, 4, 0, 0, 0, 1, 0, 10];
        b.extend_from_slice(b"test-topic");
        b.extend_from_slice(&[0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 22]);

        let (_, res) =
            response::parse_offset_commit_response(NomBytes::new(Bytes::from(b))).unwrap();
        assert_eq!(res.header.correlation_id, 4);
        assert_eq!(res.topics[0].partitions[0].error_code, KafkaCode::None);
        assert_eq!(
            res.is_error(),
            Err(crate::error::Error::KafkaError(KafkaCode::IllegalGeneration))
        );
    }
}
