//! Read records from the leaders of a set of partitions.
//!
//! A fetch names a start offset per partition and returns whole record
//! batches from there, waiting up to `max_wait_ms` for `min_bytes` to
//! accumulate. Each partition may come back with its own error code.

pub mod records;
pub mod request;
pub mod response;

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use nombytes::NomBytes;

    use super::*;
    use crate::{
        encode::ToByte,
        error::{Error, KafkaCode},
    };

    const PRICE_UPDATES: &[u8] = include_bytes!("../../../testdata/fetch_v4_price_updates.bin");

    #[test]
    fn encode() {
        let mut b = vec![0, 1, 0, 4, 0, 0, 0, 6, 0, 4];
        b.extend_from_slice(b"rust");
        b.extend_from_slice(&[255, 255, 255, 255, 0, 0, 1, 244, 0, 0, 0, 1, 3, 32, 0, 0, 0]);
        b.extend_from_slice(&[0, 0, 0, 1, 0, 10]);
        b.extend_from_slice(b"test-topic");
        b.extend_from_slice(&[0, 0, 0, 2]);
        b.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 5, 0, 16, 0, 0]);
        b.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 9, 0, 16, 0, 0]);

        let mut req = request::FetchRequest::new(6, "rust", 500, 1, 52_428_800, 0);
        req.add("test-topic", 0, 5, 1_048_576);
        req.add("test-topic", 1, 9, 1_048_576);
        req.add("test-topic", 1, 12, 1_048_576);
        let mut buffer: Vec<u8> = vec![];
        req.encode(&mut buffer).unwrap();

        assert_eq!(buffer, b);
    }

    #[test]
    fn parse() {
        let (rest, res) =
            response::parse_fetch_response(NomBytes::new(Bytes::from_static(PRICE_UPDATES)))
                .unwrap();
        assert!(rest.to_bytes().is_empty());
        assert_eq!(res.header.correlation_id, 1);
        assert_eq!(res.topics.len(), 1);

        let partition = res.partition("price-updates", 0).unwrap();
        assert_eq!(partition.error_code, KafkaCode::None);
        assert_eq!(partition.high_watermark, 14);
        assert_eq!(partition.last_stable_offset, 14);
        assert!(partition.aborted_transactions.is_empty());
        assert_eq!(partition.records.len(), 3806);
        assert!(res.partition("price-updates", 1).is_none());
    }

    #[test]
    fn records() {
        let res = response::FetchResponse::try_from(Bytes::from_static(PRICE_UPDATES)).unwrap();
        let partition = res.partition("price-updates", 0).unwrap();

        let records = partition.records_from(0).unwrap();
        let offsets: Vec<i64> = records.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, (0..14).collect::<Vec<i64>>());

        let first = &records[0];
        assert_eq!(first.key, Some(Bytes::from_static(b"TSLA")));
        assert_eq!(first.timestamp, 1_697_722_200_000);
        let value = first.value.clone().unwrap();
        assert_eq!(value.len(), 198);
        assert!(value.starts_with(b"{\"symbol\": \"TSLA\""));
        assert_eq!(records[13].timestamp, 1_697_724_960_000);
    }

    #[test]
    fn records_before_the_fetch_offset_are_dropped() {
        let res = response::FetchResponse::try_from(Bytes::from_static(PRICE_UPDATES)).unwrap();
        let partition = res.partition("price-updates", 0).unwrap();

        let records = partition.records_from(11).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].offset, 11);
        assert!(partition.records_from(14).unwrap().is_empty());
    }

    #[test]
    fn truncated_tail_is_ignored() {
        let res = response::FetchResponse::try_from(Bytes::from_static(PRICE_UPDATES)).unwrap();
        let mut partition = res.partition("price-updates", 0).unwrap().clone();
        partition.records = partition.records.slice(..partition.records.len() - 100);

        let records = partition.records_from(0).unwrap();
        assert_eq!(records.len(), 13);
        assert_eq!(records.last().map(|r| r.offset), Some(12));
    }

    #[test]
    fn corrupt_batch_fails_the_partition() {
        let res = response::FetchResponse::try_from(Bytes::from_static(PRICE_UPDATES)).unwrap();
        let mut partition = res.partition("price-updates", 0).unwrap().clone();
        let mut damaged = partition.records.to_vec();
        damaged[100] ^= 0x01;
        partition.records = Bytes::from(damaged);

        assert_eq!(
            partition.records_from(0),
            Err(Error::CorruptRecordBatch(0))
        );
    }

    #[test]
    fn null_records() {
        let mut b = vec![0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 1, 0, 1, b't', 0, 0, 0, 1];
        b.extend_from_slice(&[0, 0, 0, 0, 0, 1]);
        b.extend_from_slice(&[0; 8]);
        b.extend_from_slice(&[255; 8]);
        b.extend_from_slice(&[255, 255, 255, 255, 255, 255, 255, 255]);

        let res = response::FetchResponse::try_from(Bytes::from(b)).unwrap();
        let partition = res.partition("t", 0).unwrap();
        assert_eq!(
            partition.is_error(),
            Err(Error::KafkaError(KafkaCode::OffsetOutOfRange))
        );
        assert!(partition.records_from(0).unwrap().is_empty());
    }
}
