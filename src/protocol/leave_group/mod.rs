//! Directly depart a group.
//!
//! Leaving lets the coordinator rebalance the remaining members right
//! away instead of waiting for the session timeout to expire.

pub mod request;
pub mod response;

#[cfg(test)]
mod test {
    use bytes::Bytes;

    use super::*;
    use crate::{encode::ToByte, error::KafkaCode};

    #[test]
    fn encode() {
        let mut b = vec![0, 13, 0, 0, 0, 0, 0, 2, 0, 4];
        b.extend_from_slice(b"rust");
        b.extend_from_slice(&[0, 5]);
        b.extend_from_slice(b"group");
        b.extend_from_slice(&[0, 6]);
        b.extend_from_slice(b"member");

        let req = request::LeaveGroupRequest::new(2, "rust", "group", "member");
        let mut buffer: Vec<u8> = vec![];
        req.encode(&mut buffer).unwrap();

        assert_eq!(buffer, b);
    }

    #[test]
    fn parse() {
        let res =
            response::LeaveGroupResponse::try_from(Bytes::from_static(b"\0\0\0\x02\0\x19")).unwrap();
        assert_eq!(res.header.correlation_id, 2);
        assert_eq!(res.error_code, KafkaCode::UnknownMemberId);

        assert!(response::LeaveGroupResponse::try_from(Bytes::from_static(b"\0\0")).is_err());
    }
}
