#![allow(dead_code)]

use std::{
    collections::HashMap,
    env,
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use prost::Message;
use tokio::sync::Notify;
use txgroup::prelude::{
    bytes::Bytes, BalanceStrategy, DecodeError, DecodedTransaction, Error, Generation,
    GroupBroker, GroupMember, InitialOffset, JoinOutcome, KafkaCode, PartitionOffsets, Record,
    Result, Sink, SubscribeUpdateTransactionInfo, TopicPartition, TopicPartitions,
};

const KAFKA_BROKERS: &str = "KAFKA_BROKERS";
const KAFKA_TOPIC: &str = "KAFKA_TOPIC";

const FETCH_WAIT: Duration = Duration::from_millis(50);

pub const TEST_GROUP: &str = "test-group";

pub fn get_brokers() -> Result<(bool, Vec<String>)> {
    let brokers: Vec<String> = match env::var(KAFKA_BROKERS) {
        Ok(brokers) => brokers.split(',').map(str::to_string).collect(),
        Err(_) => {
            tracing::warn!("Skipping test because no {} is set", KAFKA_BROKERS);
            return Ok((true, vec![]));
        }
    };
    Ok((false, brokers))
}

pub fn get_brokers_and_topic() -> Result<(bool, Vec<String>, String)> {
    let (skip, brokers) = get_brokers()?;
    if skip {
        return Ok((skip, vec![], "".to_string()));
    }
    let topic = match env::var(KAFKA_TOPIC) {
        Ok(topic) => topic,
        Err(_) => {
            tracing::warn!("Skipping test because no {} is set", KAFKA_TOPIC);
            return Ok((true, vec![], "".to_string()));
        }
    };
    Ok((false, brokers, topic))
}

/// A transaction update as it would be published on the topic.
pub fn encoded_transaction(index: u64) -> Bytes {
    SubscribeUpdateTransactionInfo {
        signature: Bytes::from(format!("sig-{index}")),
        is_vote: index % 2 == 0,
        transaction: Bytes::from_static(b"tx"),
        meta: Bytes::from_static(b"meta"),
        index,
    }
    .encode_to_vec()
    .into()
}

/// Length delimited field running past the end of the payload.
pub fn garbage() -> Bytes {
    Bytes::from_static(b"\x0a\x05ab")
}

/// Poll `check` until it holds or `within` runs out.
pub async fn eventually<F: Fn() -> bool>(within: Duration, check: F) -> bool {
    let until = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < until {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

pub async fn within<F: Future>(limit: Duration, fut: F) -> F::Output {
    match tokio::time::timeout(limit, fut).await {
        Ok(output) => output,
        Err(_) => panic!("did not finish within {:?}", limit),
    }
}

/// Offset and whether it decoded, in the order the sink saw them.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    seen: Arc<Mutex<Vec<(TopicPartition, i64, bool)>>>,
}

impl RecordingSink {
    pub fn outcomes(&self) -> Vec<(i64, bool)> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|(_, offset, ok)| (*offset, *ok))
            .collect()
    }

    pub fn outcomes_for(&self, claim: &TopicPartition) -> Vec<i64> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(tp, _, _)| tp == claim)
            .map(|(_, offset, _)| *offset)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl Sink<DecodedTransaction> for RecordingSink {
    fn accept(&self, record: &Record, outcome: std::result::Result<DecodedTransaction, DecodeError>) {
        self.seen
            .lock()
            .unwrap()
            .push((record.topic_partition(), record.offset, outcome.is_ok()));
    }
}

#[derive(Debug, Default)]
struct State {
    logs: HashMap<TopicPartition, Vec<Bytes>>,
    committed: PartitionOffsets,
    commits: Vec<(i32, PartitionOffsets)>,
    generation_id: i32,
    member_id: String,
    members_joined: u32,
    rebalancing: bool,
    failing_joins: u32,
    left: Vec<Generation>,
}

/// Single member coordinator and log store living in memory.
///
/// Every join starts a new generation. [`MemoryBroker::revoke`] makes the
/// next heartbeat and commit of the current generation answer
/// `RebalanceInProgress`, as a coordinator does when another member shows up.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    state: Mutex<State>,
    appended: Notify,
    joins: AtomicUsize,
    closes: AtomicUsize,
    fetches: AtomicUsize,
    block_joins: AtomicBool,
    stall_commits: AtomicBool,
    forget_offsets: AtomicBool,
}

impl MemoryBroker {
    pub fn new(topic: &str, partitions: i32) -> Arc<Self> {
        let broker = Self::default();
        {
            let mut state = broker.state.lock().unwrap();
            for partition in 0..partitions {
                state.logs.insert(TopicPartition::new(topic, partition), vec![]);
            }
        }
        Arc::new(broker)
    }

    pub fn produce(&self, topic: &str, partition: i32, value: Bytes) -> i64 {
        let offset = {
            let mut state = self.state.lock().unwrap();
            let log = state
                .logs
                .get_mut(&TopicPartition::new(topic, partition))
                .unwrap();
            log.push(value);
            log.len() as i64 - 1
        };
        self.appended.notify_waiters();
        offset
    }

    pub fn revoke(&self) {
        self.state.lock().unwrap().rebalancing = true;
    }

    pub fn fail_joins(&self, times: u32) {
        self.state.lock().unwrap().failing_joins = times;
    }

    pub fn block_joins(&self) {
        self.block_joins.store(true, Ordering::SeqCst);
    }

    /// Commits from now on never get an answer.
    pub fn stall_commits(&self) {
        self.stall_commits.store(true, Ordering::SeqCst);
    }

    /// Offset lookups answer without any partition in them.
    pub fn forget_offsets(&self) {
        self.forget_offsets.store(true, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn generation_id(&self) -> i32 {
        self.state.lock().unwrap().generation_id
    }

    pub fn committed(&self, topic: &str, partition: i32) -> Option<i64> {
        self.state
            .lock()
            .unwrap()
            .committed
            .get(&TopicPartition::new(topic, partition))
            .copied()
    }

    /// Generation id of every accepted commit, in order.
    pub fn commit_generations(&self) -> Vec<i32> {
        self.state
            .lock()
            .unwrap()
            .commits
            .iter()
            .map(|(generation_id, _)| *generation_id)
            .collect()
    }

    pub fn left(&self) -> Vec<Generation> {
        self.state.lock().unwrap().left.clone()
    }

    fn check_generation(state: &State, generation: &Generation) -> Result<()> {
        if generation.member_id != state.member_id {
            return Err(Error::KafkaError(KafkaCode::UnknownMemberId));
        }
        if generation.generation_id != state.generation_id {
            return Err(Error::KafkaError(KafkaCode::IllegalGeneration));
        }
        if state.rebalancing {
            return Err(Error::KafkaError(KafkaCode::RebalanceInProgress));
        }
        Ok(())
    }

    fn end_offsets(&self, partitions: &TopicPartitions, oldest: bool) -> Result<PartitionOffsets> {
        let state = self.state.lock().unwrap();
        let mut offsets = PartitionOffsets::new();
        for (topic, partitions) in partitions {
            for partition in partitions {
                let tp = TopicPartition::new(topic, *partition);
                let log = state
                    .logs
                    .get(&tp)
                    .ok_or(Error::KafkaError(KafkaCode::UnknownTopicOrPartition))?;
                let offset = if oldest { 0 } else { log.len() as i64 };
                offsets.insert(tp, offset);
            }
        }
        Ok(offsets)
    }
}

#[async_trait]
impl GroupBroker for MemoryBroker {
    async fn join_group(
        &self,
        group_id: &str,
        member_id: &str,
        topics: &[String],
        strategy: BalanceStrategy,
    ) -> Result<JoinOutcome> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        if self.block_joins.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();
        if state.failing_joins > 0 {
            state.failing_joins -= 1;
            return Err(Error::KafkaError(KafkaCode::GroupCoordinatorNotAvailable));
        }
        assert_eq!(group_id, TEST_GROUP);
        if !member_id.is_empty() && member_id != state.member_id {
            return Err(Error::KafkaError(KafkaCode::UnknownMemberId));
        }
        if member_id.is_empty() {
            state.members_joined += 1;
            state.member_id = format!("member-{}", state.members_joined);
        }
        state.generation_id += 1;
        state.rebalancing = false;

        Ok(JoinOutcome {
            generation_id: state.generation_id,
            member_id: state.member_id.clone(),
            leader_id: state.member_id.clone(),
            protocol: strategy.name().to_string(),
            members: vec![GroupMember {
                member_id: state.member_id.clone(),
                topics: topics.to_vec(),
            }],
        })
    }

    async fn sync_group(
        &self,
        generation: &Generation,
        assignments: &HashMap<String, TopicPartitions>,
    ) -> Result<TopicPartitions> {
        let state = self.state.lock().unwrap();
        Self::check_generation(&state, generation)?;
        Ok(assignments
            .get(&generation.member_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn heartbeat(&self, generation: &Generation) -> Result<()> {
        let state = self.state.lock().unwrap();
        Self::check_generation(&state, generation)
    }

    async fn leave_group(&self, generation: &Generation) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.left.push(generation.clone());
        state.member_id.clear();
        Ok(())
    }

    async fn partitions_for(&self, topics: &[String]) -> Result<TopicPartitions> {
        let state = self.state.lock().unwrap();
        let mut partitions = TopicPartitions::new();
        for tp in state.logs.keys() {
            if topics.contains(&tp.topic) {
                partitions.entry(tp.topic.clone()).or_default().push(tp.partition);
            }
        }
        Ok(partitions)
    }

    async fn committed_offsets(
        &self,
        group_id: &str,
        partitions: &TopicPartitions,
    ) -> Result<PartitionOffsets> {
        assert_eq!(group_id, TEST_GROUP);
        let state = self.state.lock().unwrap();
        let mut offsets = PartitionOffsets::new();
        for (topic, partitions) in partitions {
            for partition in partitions {
                let tp = TopicPartition::new(topic, *partition);
                let offset = state.committed.get(&tp).copied().unwrap_or(-1);
                offsets.insert(tp, offset);
            }
        }
        Ok(offsets)
    }

    async fn list_offsets(
        &self,
        partitions: &TopicPartitions,
        policy: InitialOffset,
    ) -> Result<PartitionOffsets> {
        if self.forget_offsets.load(Ordering::SeqCst) {
            return Ok(PartitionOffsets::new());
        }
        self.end_offsets(partitions, policy == InitialOffset::Oldest)
    }

    async fn commit_offsets(&self, generation: &Generation, offsets: &PartitionOffsets) -> Result<()> {
        if self.stall_commits.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let mut state = self.state.lock().unwrap();
        Self::check_generation(&state, generation)?;
        for (tp, offset) in offsets {
            state.committed.insert(tp.clone(), *offset);
        }
        state.commits.push((generation.generation_id, offsets.clone()));
        Ok(())
    }

    async fn fetch(&self, claim: &TopicPartition, offset: i64) -> Result<Vec<Record>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let deadline = tokio::time::Instant::now() + FETCH_WAIT;
        loop {
            let appended = self.appended.notified();
            {
                let state = self.state.lock().unwrap();
                let log = state
                    .logs
                    .get(claim)
                    .ok_or(Error::KafkaError(KafkaCode::UnknownTopicOrPartition))?;
                if offset < 0 || offset as usize > log.len() {
                    return Err(Error::KafkaError(KafkaCode::OffsetOutOfRange));
                }
                if (offset as usize) < log.len() {
                    return Ok(log[offset as usize..]
                        .iter()
                        .enumerate()
                        .map(|(i, value)| Record {
                            topic: claim.topic.clone(),
                            partition: claim.partition,
                            offset: offset + i as i64,
                            timestamp: 0,
                            key: Bytes::new(),
                            value: value.clone(),
                        })
                        .collect());
                }
            }
            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(vec![]);
            }
        }
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
