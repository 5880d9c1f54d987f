//! Per partition processing of a generation's claims.
use async_trait::async_trait;

use crate::{
    codec::Codec,
    error::Result,
    session::{GroupSession, PartitionClaim},
    sink::Sink,
};

/// Callbacks the group client drives for every generation.
///
/// `setup` runs before any claim is consumed and `cleanup` after every
/// `consume_claim` of the generation has returned. `consume_claim` runs
/// once per claim, concurrently with its siblings, and should return when
/// the claim runs dry.
#[async_trait]
pub trait ClaimHandler: Send + Sync + 'static {
    async fn setup(&self, _session: &GroupSession) -> Result<()> {
        Ok(())
    }

    async fn cleanup(&self, _session: &GroupSession) -> Result<()> {
        Ok(())
    }

    async fn consume_claim(&self, session: &GroupSession, claim: PartitionClaim) -> Result<()>;
}

/// Decodes every record of a claim and hands the outcome to the sink.
///
/// Each record is marked after the sink saw it, whether it decoded or
/// not: a malformed record is reported once and then skipped for good.
#[derive(Debug, Clone)]
pub struct ClaimProcessor<C, S> {
    codec: C,
    sink: S,
}

impl<C, S> ClaimProcessor<C, S> {
    pub fn new(codec: C, sink: S) -> Self {
        Self { codec, sink }
    }
}

#[async_trait]
impl<C, S> ClaimHandler for ClaimProcessor<C, S>
where
    C: Codec,
    S: Sink<C::Output>,
{
    async fn consume_claim(&self, session: &GroupSession, mut claim: PartitionClaim) -> Result<()> {
        tracing::info!(
            "Member {:?} | Consuming {} partition {} from offset {}",
            session.member_id(),
            claim.topic(),
            claim.partition(),
            claim.initial_offset()
        );

        let mut processed = 0u64;
        while let Some(record) = claim.next().await {
            let outcome = self.codec.decode(&record.value);
            self.sink.accept(&record, outcome);
            session.mark_processed(&record);
            processed += 1;
        }

        tracing::debug!(
            "Member {:?} | Claim on {} partition {} ended after {} records",
            session.member_id(),
            claim.topic(),
            claim.partition(),
            processed
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use bytes::Bytes;
    use prost::Message;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        broker::{Generation, Record, TopicPartition, TopicPartitions},
        codec::{DecodeError, DecodedTransaction, TransactionCodec},
    };

    #[derive(Default)]
    struct Recorded(Mutex<Vec<(i64, bool)>>);

    impl Sink<DecodedTransaction> for std::sync::Arc<Recorded> {
        fn accept(&self, record: &Record, outcome: std::result::Result<DecodedTransaction, DecodeError>) {
            self.0.lock().unwrap().push((record.offset, outcome.is_ok()));
        }
    }

    fn record(offset: i64, value: Bytes) -> Record {
        Record {
            topic: "test-topic".to_owned(),
            partition: 0,
            offset,
            timestamp: 0,
            key: Bytes::new(),
            value,
        }
    }

    #[tokio::test]
    async fn every_record_is_reported_and_marked_in_order() {
        let valid = Bytes::from(
            DecodedTransaction {
                index: 1,
                ..Default::default()
            }
            .encode_to_vec(),
        );
        let garbage = Bytes::from_static(b"\x0a\x05ab");

        let generation = Generation {
            group_id: "g".to_owned(),
            member_id: "m".to_owned(),
            generation_id: 1,
        };
        let token = CancellationToken::new();
        let (session, marks) = GroupSession::new(generation, TopicPartitions::new(), token.clone());
        let (tx, rx) = mpsc::channel(8);
        let claim = PartitionClaim::new(TopicPartition::new("test-topic", 0), 0, rx, token);

        tx.send(record(0, valid.clone())).await.unwrap();
        tx.send(record(1, garbage)).await.unwrap();
        tx.send(record(2, valid)).await.unwrap();
        drop(tx);

        let sink = std::sync::Arc::new(Recorded::default());
        let processor = ClaimProcessor::new(TransactionCodec, sink.clone());
        processor.consume_claim(&session, claim).await.unwrap();

        assert_eq!(
            *sink.0.lock().unwrap(),
            vec![(0, true), (1, false), (2, true)]
        );
        assert_eq!(marks.drain_offsets(), vec![1, 2, 3]);
    }
}
