//! Fetch the offsets a group has committed.
//!
//! A partition the group never committed for comes back with offset `-1`
//! and no error; the member then falls back to its initial offset policy.

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
        let mut b = vec![0, 9, 0, 2, 0, 0, 0, 3, 0, 4];
        b.extend_from_slice(b"rust");
        b.extend_from_slice(&[0, 5]);
        b.extend_from_slice(b"group");
        b.extend_from_slice(&[0, 0, 0, 1, 0, 10]);
        b.extend_from_slice(b"test-topic");
        b.extend_from_slice(&[0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 1]);

        let mut req = request::OffsetFetchRequest::new(3, "rust", "group");
        req.add("test-topic", 0);
        req.add("test-topic", 1);
        req.add("test-topic", 1);
        let mut buffer: Vec<u8> = vec![];
        req.encode(&mut buffer).unwrap();

        assert_eq!(buffer, b);
    }

    #[test]
    fn parse() {
        let mut b = vec![0, 0, 0, 3, 0, 0, 0, 1, 0, 10];
        b.extend_from_slice(b"test-topic");
        b.extend_from_slice(&[0, 0, 0, 2]);
        // partition 0 committed at 42 with metadata "m"
        b.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 42, 0, 1, b'm', 0, 0]);
        // partition 1 never committed
        b.extend_from_slice(&[0, 0, 0, 1, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 0, 0]);
        b.extend_from_slice(&[0, 0]);

        let (_, res) =
            response::parse_offset_fetch_response(NomBytes::new(Bytes::from(b))).unwrap();
        assert_eq!(res.header.correlation_id, 3);
        assert_eq!(res.error_code, KafkaCode::None);
        assert!(res.is_error().is_ok());
        let partitions = &res.topics[0].partitions;
        assert_eq!(partitions[0].committed_offset, 42);
        assert_eq!(partitions[0].metadata, Some(Bytes::from_static(b"m")));
        assert_eq!(partitions[1].committed_offset, -1);
        assert_eq!(partitions[1].metadata, None);
    }

    #[test]
    fn group_level_error() {
        let b = Bytes::from_static(b"\0\0\0\x03\0\0\0\0\0\x10");
        let res = response::OffsetFetchResponse::try_from(b).unwrap();
        assert_eq!(
            res.is_error(),
            Err(crate::error::Error::KafkaError(
                KafkaCode::NotCoordinatorForGroup
            ))
        );
    }
}
