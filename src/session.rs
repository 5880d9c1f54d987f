//! One generation of group membership.
//!
//! A [`GroupSession`] lives from a successful sync until the coordinator
//! revokes the generation or the client stops. It owns the generation's
//! cancellation token; every claim, fetcher, heartbeat and committer of the
//! generation stops when that token is cancelled.
//!
//! Marks never touch the network. They travel over a channel to the
//! committer task, which keeps the highest staged offset per partition and
//! flushes on an interval and one last time when the generation is over.
use std::{sync::Arc, time::Duration};

use async_stream::stream;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    broker::{Generation, GroupBroker, PartitionOffsets, Record, TopicPartition, TopicPartitions},
    consumer_group_builder::InitialOffset,
    error::{Error, KafkaCode, Result},
};

const FETCH_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Mark {
    claim: TopicPartition,
    /// Next offset to read.
    offset: i64,
}

/// What claim processors see of the generation they belong to.
#[derive(Debug)]
pub struct GroupSession {
    generation: Generation,
    claims: TopicPartitions,
    marks: mpsc::UnboundedSender<Mark>,
    token: CancellationToken,
}

impl GroupSession {
    /// A session for `generation` and the receiving end its committer drains.
    pub(crate) fn new(
        generation: Generation,
        claims: TopicPartitions,
        token: CancellationToken,
    ) -> (Arc<Self>, MarkReceiver) {
        let (marks, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            generation,
            claims,
            marks,
            token,
        });
        (session, MarkReceiver(rx))
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    pub fn member_id(&self) -> &str {
        &self.generation.member_id
    }

    /// The partitions assigned to this member for this generation.
    pub fn claims(&self) -> &TopicPartitions {
        &self.claims
    }

    /// False once the generation has been revoked or the client stopped.
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Resolves when the generation ends.
    pub async fn ended(&self) {
        self.token.cancelled().await
    }

    /// Stage `record` as processed. The next commit stores its offset + 1.
    ///
    /// Never waits on the network. Ignored once the generation ended, the
    /// partition may already belong to someone else.
    pub fn mark_processed(&self, record: &Record) {
        self.mark_offset(record.topic_partition(), record.offset + 1);
    }

    /// Stage `offset` as the next offset to read for `claim`.
    pub fn mark_offset(&self, claim: TopicPartition, offset: i64) {
        if self.token.is_cancelled() {
            tracing::debug!(
                "Member {:?} | Ignoring mark for {} partition {} of ended generation {}",
                self.generation.member_id,
                claim.topic,
                claim.partition,
                self.generation.generation_id
            );
            return;
        }
        if self.marks.send(Mark { claim, offset }).is_err() {
            tracing::debug!("Member {:?} | Committer is gone", self.generation.member_id);
        }
    }

    pub(crate) fn end(&self) {
        self.token.cancel();
    }
}

pub(crate) struct MarkReceiver(mpsc::UnboundedReceiver<Mark>);

#[cfg(test)]
impl MarkReceiver {
    pub(crate) fn drain_offsets(mut self) -> Vec<i64> {
        let mut offsets = vec![];
        while let Ok(mark) = self.0.try_recv() {
            offsets.push(mark.offset);
        }
        offsets
    }
}

/// An assigned partition, bound to the generation it was handed out in.
///
/// Yields records in log order until the generation ends; it is never
/// restarted, the next generation brings a fresh claim.
#[derive(Debug)]
pub struct PartitionClaim {
    topic_partition: TopicPartition,
    initial_offset: i64,
    records: mpsc::Receiver<Record>,
    token: CancellationToken,
}

impl PartitionClaim {
    pub(crate) fn new(
        topic_partition: TopicPartition,
        initial_offset: i64,
        records: mpsc::Receiver<Record>,
        token: CancellationToken,
    ) -> Self {
        Self {
            topic_partition,
            initial_offset,
            records,
            token,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic_partition.topic
    }

    pub fn partition(&self) -> i32 {
        self.topic_partition.partition
    }

    /// Offset the claim started reading from.
    pub fn initial_offset(&self) -> i64 {
        self.initial_offset
    }

    /// Wait for the next record. `None` once the generation ended.
    pub async fn next(&mut self) -> Option<Record> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            record = self.records.recv() => record,
        }
    }

    pub fn into_stream(mut self) -> impl Stream<Item = Record> {
        stream! {
            while let Some(record) = self.next().await {
                yield record;
            }
        }
    }
}

/// Pull records for one claim from its partition leader until `token` is
/// cancelled or the claim is dropped.
///
/// An offset the broker no longer has is reset with `policy`; other errors
/// are retried after a short pause.
pub(crate) async fn run_fetcher<B: GroupBroker>(
    broker: Arc<B>,
    claim: TopicPartition,
    mut offset: i64,
    policy: InitialOffset,
    records: mpsc::Sender<Record>,
    token: CancellationToken,
) {
    tracing::debug!("Fetching {} partition {} from offset {}", claim.topic, claim.partition, offset);
    let mut stall = Stall::default();
    loop {
        let fetched = tokio::select! {
            _ = token.cancelled() => return,
            fetched = broker.fetch(&claim, offset) => fetched,
        };

        match fetched {
            Ok(batch) => {
                stall.clear();
                for record in batch {
                    offset = record.offset + 1;
                    tokio::select! {
                        _ = token.cancelled() => return,
                        sent = records.send(record) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
            Err(Error::KafkaError(KafkaCode::OffsetOutOfRange)) => {
                tracing::warn!(
                    "Offset {} is out of range for {} partition {}, resetting to {:?}",
                    offset,
                    claim.topic,
                    claim.partition,
                    policy
                );
                match reset_offset(broker.as_ref(), &claim, policy).await {
                    Ok(reset) => offset = reset,
                    Err(err) => {
                        tracing::warn!("Resetting offset failed {:?}", err);
                        if pause(&token).await {
                            return;
                        }
                    }
                }
            }
            Err(err) if err.is_unreadable_batch() => {
                if stall.first_at(offset) {
                    tracing::error!(
                        "{} partition {} cannot be read past offset {}: {}. It will not progress until the batch is removed",
                        claim.topic,
                        claim.partition,
                        offset,
                        err
                    );
                } else {
                    tracing::trace!("{} partition {} still stuck at {}", claim.topic, claim.partition, offset);
                }
                if pause(&token).await {
                    return;
                }
            }
            Err(err) => {
                tracing::warn!(
                    "Fetching {} partition {} at offset {} failed {:?}",
                    claim.topic,
                    claim.partition,
                    offset,
                    err
                );
                if pause(&token).await {
                    return;
                }
            }
        }
    }
}

/// The offset a fetcher is stuck at, so the stall is reported once.
#[derive(Debug, Default)]
struct Stall {
    at: Option<i64>,
}

impl Stall {
    /// True the first time `offset` fails.
    fn first_at(&mut self, offset: i64) -> bool {
        self.at.replace(offset) != Some(offset)
    }

    fn clear(&mut self) {
        self.at = None;
    }
}

/// True when cancelled during the pause.
async fn pause(token: &CancellationToken) -> bool {
    tokio::select! {
        _ = token.cancelled() => true,
        _ = tokio::time::sleep(FETCH_BACKOFF) => false,
    }
}

async fn reset_offset<B: GroupBroker + ?Sized>(
    broker: &B,
    claim: &TopicPartition,
    policy: InitialOffset,
) -> Result<i64> {
    let partitions = TopicPartitions::from([(claim.topic.clone(), vec![claim.partition])]);
    broker
        .list_offsets(&partitions, policy)
        .await?
        .get(claim)
        .copied()
        .ok_or_else(|| Error::NoLeaderForTopicPartition(claim.topic.clone(), claim.partition))
}

/// Start offsets for every claim: the committed offset, or the policy's
/// end of the log where the group never committed.
pub(crate) async fn start_offsets<B: GroupBroker + ?Sized>(
    broker: &B,
    group_id: &str,
    claims: &TopicPartitions,
    policy: InitialOffset,
) -> Result<PartitionOffsets> {
    let mut offsets = broker.committed_offsets(group_id, claims).await?;

    let mut uncommitted = TopicPartitions::new();
    for (topic, partitions) in claims {
        for partition in partitions {
            let tp = TopicPartition::new(topic, *partition);
            if offsets.get(&tp).map_or(true, |offset| *offset < 0) {
                uncommitted.entry(topic.clone()).or_default().push(*partition);
            }
        }
    }

    if !uncommitted.is_empty() {
        tracing::debug!("No committed offset for {:?}, using {:?}", uncommitted, policy);
        offsets.extend(broker.list_offsets(&uncommitted, policy).await?);
    }
    Ok(offsets)
}

/// Stage marks and flush them every `interval`. When `stop` is cancelled
/// an interval flush still waiting on the broker is abandoned, and the
/// remaining marks are drained and flushed a last time within
/// `final_timeout`.
///
/// A commit refused because the generation is gone ends the session.
/// Returns the offsets the broker accepted last.
pub(crate) async fn run_committer<B: GroupBroker>(
    broker: Arc<B>,
    session: Arc<GroupSession>,
    marks: MarkReceiver,
    interval: Duration,
    final_timeout: Duration,
    stop: CancellationToken,
) -> PartitionOffsets {
    let MarkReceiver(mut marks) = marks;
    let mut committer = Committer::default();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            mark = marks.recv() => match mark {
                Some(mark) => committer.stage(mark),
                None => break,
            },
            _ = stop.cancelled() => break,
            _ = ticker.tick() => tokio::select! {
                _ = stop.cancelled() => break,
                _ = committer.flush(broker.as_ref(), &session) => {}
            },
        }
    }

    while let Ok(mark) = marks.try_recv() {
        committer.stage(mark);
    }
    let last = tokio::time::timeout(final_timeout, committer.flush(broker.as_ref(), &session));
    if last.await.is_err() {
        tracing::warn!(
            "Member {:?} | Final commit timed out after {:?}, {} offsets left uncommitted",
            session.member_id(),
            final_timeout,
            committer.staged.len()
        );
    }
    committer.committed
}

#[derive(Debug, Default)]
struct Committer {
    staged: PartitionOffsets,
    committed: PartitionOffsets,
}

impl Committer {
    /// Offsets only move forward.
    fn stage(&mut self, mark: Mark) {
        let current = self
            .staged
            .get(&mark.claim)
            .or_else(|| self.committed.get(&mark.claim))
            .copied()
            .unwrap_or(i64::MIN);
        if mark.offset > current {
            self.staged.insert(mark.claim, mark.offset);
        }
    }

    async fn flush<B: GroupBroker + ?Sized>(&mut self, broker: &B, session: &GroupSession) {
        if self.staged.is_empty() {
            return;
        }
        let generation = session.generation();
        match broker.commit_offsets(generation, &self.staged).await {
            Ok(()) => {
                tracing::debug!(
                    "Member {:?} | Committed {} offsets for generation {}",
                    generation.member_id,
                    self.staged.len(),
                    generation.generation_id
                );
                self.committed.extend(self.staged.drain());
            }
            Err(Error::KafkaError(code)) if code.is_rebalance() => {
                tracing::info!(
                    "Member {:?} | Commit refused with {:?}, generation {} is over",
                    generation.member_id,
                    code,
                    generation.generation_id
                );
                self.staged.clear();
                session.end();
            }
            Err(err) => {
                tracing::warn!(
                    "Member {:?} | Commit failed {:?}, keeping {} offsets staged",
                    generation.member_id,
                    err,
                    self.staged.len()
                );
            }
        }
    }
}
