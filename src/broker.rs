//! The coordinator and partition leaders, seen from one group member.
//!
//! [`GroupBroker`] is the boundary between the group runtime and the
//! cluster. [`KafkaBroker`] speaks the wire protocol; tests drive the
//! runtime through an in-memory implementation instead.
use std::collections::{BTreeMap, HashMap};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::instrument;

use crate::{
    assignor::BalanceStrategy,
    consumer_group_builder::{FetchParams, GroupConfig, InitialOffset},
    error::{Error, KafkaCode, Result},
    metadata::ClusterMetadata,
    network::BrokerConnection,
    parser,
    protocol::{
        self, fetch::records, join_group::request::GroupProtocol, join_group::Subscription,
        sync_group::request::GroupAssignment, MemberAssignment, TopicAssignment,
    },
};

/// Protocol type every consumer group announces.
pub const CONSUMER_PROTOCOL_TYPE: &str = "consumer";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: &str, partition: i32) -> Self {
        Self {
            topic: topic.to_owned(),
            partition,
        }
    }
}

/// Partition ids per topic.
pub type TopicPartitions = HashMap<String, Vec<i32>>;

/// One offset per partition; -1 where the broker has none.
pub type PartitionOffsets = HashMap<TopicPartition, i64>;

/// A consumed record. The key and value are empty when the producer sent null.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub timestamp: i64,
    pub key: Bytes,
    pub value: Bytes,
}

impl Record {
    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(&self.topic, self.partition)
    }

    fn from_fetched(claim: &TopicPartition, record: records::Record) -> Self {
        Self {
            topic: claim.topic.clone(),
            partition: claim.partition,
            offset: record.offset,
            timestamp: record.timestamp,
            key: record.key.unwrap_or_default(),
            value: record.value.unwrap_or_default(),
        }
    }
}

/// One membership epoch. Stale as soon as the coordinator rebalances.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Generation {
    pub group_id: String,
    pub member_id: String,
    pub generation_id: i32,
}

/// A member as the leader sees it after the join.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupMember {
    pub member_id: String,
    pub topics: Vec<String>,
}

impl GroupMember {
    pub fn subscribes_to(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct JoinOutcome {
    pub generation_id: i32,
    pub member_id: String,
    pub leader_id: String,
    pub protocol: String,
    /// Filled in for the leader only, in join order.
    pub members: Vec<GroupMember>,
}

impl JoinOutcome {
    pub fn is_leader(&self) -> bool {
        self.member_id == self.leader_id
    }
}

#[async_trait]
pub trait GroupBroker: Send + Sync + 'static {
    /// Join, or rejoin with the id handed out earlier. An empty member id
    /// asks the coordinator for a new one.
    async fn join_group(
        &self,
        group_id: &str,
        member_id: &str,
        topics: &[String],
        strategy: BalanceStrategy,
    ) -> Result<JoinOutcome>;

    /// Send the assignments (leader) or nothing (followers) and receive
    /// this member's share.
    async fn sync_group(
        &self,
        generation: &Generation,
        assignments: &HashMap<String, TopicPartitions>,
    ) -> Result<TopicPartitions>;

    async fn heartbeat(&self, generation: &Generation) -> Result<()>;

    async fn leave_group(&self, generation: &Generation) -> Result<()>;

    async fn partitions_for(&self, topics: &[String]) -> Result<TopicPartitions>;

    async fn committed_offsets(
        &self,
        group_id: &str,
        partitions: &TopicPartitions,
    ) -> Result<PartitionOffsets>;

    async fn list_offsets(
        &self,
        partitions: &TopicPartitions,
        policy: InitialOffset,
    ) -> Result<PartitionOffsets>;

    /// `offsets` are the next offsets to read.
    async fn commit_offsets(&self, generation: &Generation, offsets: &PartitionOffsets)
        -> Result<()>;

    /// Records at or after `offset`; empty when nothing arrived within the
    /// fetch wait time.
    async fn fetch(&self, claim: &TopicPartition, offset: i64) -> Result<Vec<Record>>;

    /// Release every connection. Closing twice is a logged no-op.
    async fn close(&self);
}

/// [`GroupBroker`] over the Kafka wire protocol.
///
/// Keeps a connection to a bootstrap broker for metadata and coordinator
/// lookups, one to the group coordinator for membership and offsets, and
/// one per partition leader for fetches. Any of them is replaced when it
/// breaks; the coordinator is looked up again when it moves.
///
/// Fetches for claims on the same leader are merged: while one request to
/// a leader is out, the claims asking meanwhile queue up and go out
/// together in the next one.
#[derive(Debug)]
pub struct KafkaBroker {
    bootstrap_addrs: Vec<String>,
    client_id: String,
    session_timeout_ms: i32,
    rebalance_timeout_ms: i32,
    retention_time_ms: i64,
    fetch_params: FetchParams,
    bootstrap: Mutex<BrokerConnection>,
    coordinator: Mutex<Option<BrokerConnection>>,
    leaders: Mutex<HashMap<i32, BrokerConnection>>,
    metadata: RwLock<ClusterMetadata>,
    rounds: FetchRounds,
    closed: AtomicBool,
}

/// Fetch rounds per leader node id.
type FetchRounds = Arc<Mutex<HashMap<i32, FetchRound>>>;

/// Claims waiting for the next fetch request to one leader.
#[derive(Debug, Default)]
struct FetchRound {
    conn: Option<BrokerConnection>,
    waiting: Vec<FetchWaiter>,
    in_flight: bool,
}

#[derive(Debug)]
struct FetchWaiter {
    claim: TopicPartition,
    offset: i64,
    reply: oneshot::Sender<Result<Vec<Record>>>,
}

impl KafkaBroker {
    /// Connect to the first reachable bootstrap broker and load the
    /// cluster layout.
    pub async fn connect(config: &GroupConfig) -> Result<Self> {
        tracing::info!("Connecting to cluster at {}", config.bootstrap_addrs.join(","));
        let bootstrap = BrokerConnection::new(config.bootstrap_addrs.clone()).await?;
        let metadata = ClusterMetadata::fetch(&bootstrap, &config.client_id, &[]).await?;

        Ok(Self {
            bootstrap_addrs: config.bootstrap_addrs.clone(),
            client_id: config.client_id.clone(),
            session_timeout_ms: config.session_timeout_ms,
            rebalance_timeout_ms: config.rebalance_timeout_ms,
            retention_time_ms: config.retention_time_ms,
            fetch_params: config.fetch_params.clone(),
            bootstrap: Mutex::new(bootstrap),
            coordinator: Mutex::new(None),
            leaders: Mutex::new(HashMap::new()),
            metadata: RwLock::new(metadata),
            rounds: FetchRounds::default(),
            closed: AtomicBool::new(false),
        })
    }

    async fn bootstrap(&self) -> Result<BrokerConnection> {
        let mut conn = self.bootstrap.lock().await;
        if !conn.is_usable() {
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::ConnectionClosed);
            }
            tracing::debug!("Reconnecting to bootstrap brokers");
            *conn = BrokerConnection::new(self.bootstrap_addrs.clone()).await?;
        }
        Ok(conn.clone())
    }

    /// Locate the current coordinator of a group.
    ///
    /// See this [protocol spec] for more information.
    ///
    /// [protocol spec]: protocol::find_coordinator
    #[instrument(level = "debug", skip(self))]
    async fn coordinator(&self, group_id: &str) -> Result<BrokerConnection> {
        let mut slot = self.coordinator.lock().await;
        if let Some(conn) = slot.as_ref().filter(|conn| conn.is_usable()) {
            return Ok(conn.clone());
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ConnectionClosed);
        }

        let bootstrap = self.bootstrap().await?;
        let response_bytes = bootstrap
            .request(|correlation_id| {
                protocol::FindCoordinatorRequest::new(correlation_id, &self.client_id, group_id)
            })
            .await?;
        let response = protocol::FindCoordinatorResponse::try_from(response_bytes)?;
        response.is_error()?;

        let addr = response.addr()?;
        tracing::info!("Group {} is coordinated by node {} at {}", group_id, response.node_id, addr);
        let conn = BrokerConnection::new(vec![addr]).await?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Forget the coordinator when `result` says it is gone or unreachable.
    async fn observe_coordinator<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_connection_fault() {
                tracing::warn!("Dropping coordinator connection after {:?}", err);
                if let Some(conn) = self.coordinator.lock().await.take() {
                    conn.close().await;
                }
            }
        }
        result
    }

    async fn broker_connection(&self, node_id: i32) -> Result<BrokerConnection> {
        let mut leaders = self.leaders.lock().await;
        if let Some(conn) = leaders.get(&node_id).filter(|conn| conn.is_usable()) {
            return Ok(conn.clone());
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ConnectionClosed);
        }
        let addr = self.metadata.read().await.broker_addr(node_id)?;
        tracing::debug!("Connecting to broker {} at {}", node_id, addr);
        let conn = BrokerConnection::new(vec![addr]).await?;
        leaders.insert(node_id, conn.clone());
        Ok(conn)
    }

    /// Reload the layout of the topics already known.
    async fn refresh_metadata(&self) -> Result<()> {
        let topics = self
            .metadata
            .read()
            .await
            .topics
            .iter()
            .map(|t| parser::to_string(&t.name))
            .collect::<Result<Vec<String>>>()?;
        let bootstrap = self.bootstrap().await?;
        let fresh = ClusterMetadata::fetch(&bootstrap, &self.client_id, &topics).await?;
        *self.metadata.write().await = fresh;
        Ok(())
    }

    /// Queue a fetch on the claim's leader and wait for the round that
    /// carries it. Starts the rounds for that leader when none are running.
    async fn fetch_from_leader(&self, claim: &TopicPartition, offset: i64) -> Result<Vec<Record>> {
        let leader = self
            .metadata
            .read()
            .await
            .get_leader_for_topic_partition(&claim.topic, claim.partition)?;
        let conn = self.broker_connection(leader).await?;

        let (reply, answer) = oneshot::channel();
        let start = {
            let mut rounds = self.rounds.lock().await;
            let round = rounds.entry(leader).or_default();
            round.conn = Some(conn);
            round.waiting.push(FetchWaiter {
                claim: claim.clone(),
                offset,
                reply,
            });
            !std::mem::replace(&mut round.in_flight, true)
        };
        if start {
            tokio::spawn(run_fetch_rounds(
                self.rounds.clone(),
                leader,
                self.client_id.clone(),
                self.fetch_params.clone(),
            ));
        }
        answer.await.map_err(|_| Error::ConnectionClosed)?
    }
}

/// Send one fetch request per batch of waiting claims to `leader` until
/// nobody waits anymore. Runs detached so a caller giving up does not cut
/// a request short for the others.
async fn run_fetch_rounds(rounds: FetchRounds, leader: i32, client_id: String, params: FetchParams) {
    loop {
        let (conn, waiters) = {
            let mut rounds = rounds.lock().await;
            let Some(round) = rounds.get_mut(&leader) else {
                return;
            };
            round.waiting.retain(|waiter| !waiter.reply.is_closed());
            match round.conn.clone() {
                Some(conn) if !round.waiting.is_empty() => (conn, std::mem::take(&mut round.waiting)),
                _ => {
                    round.in_flight = false;
                    return;
                }
            }
        };

        // one entry per claim, from the lowest offset anyone asked for
        let mut offsets: BTreeMap<TopicPartition, i64> = BTreeMap::new();
        for waiter in &waiters {
            offsets
                .entry(waiter.claim.clone())
                .and_modify(|offset| *offset = (*offset).min(waiter.offset))
                .or_insert(waiter.offset);
        }
        tracing::trace!("Fetching {} partitions from broker {}", offsets.len(), leader);

        let response = conn
            .request(|correlation_id| {
                let mut req = protocol::FetchRequest::new(
                    correlation_id,
                    &client_id,
                    params.max_wait_ms,
                    params.min_bytes,
                    params.max_bytes,
                    params.isolation_level,
                );
                for (claim, offset) in offsets.iter() {
                    req.add(&claim.topic, claim.partition, *offset, params.max_partition_bytes);
                }
                req
            })
            .await
            .and_then(protocol::FetchResponse::try_from);

        for waiter in waiters {
            let answer = match &response {
                Ok(response) => fetched_records(response, &waiter.claim, waiter.offset),
                Err(err) => Err(err.clone()),
            };
            // the claim may have stopped waiting
            let _ = waiter.reply.send(answer);
        }
    }
}

fn fetched_records(
    response: &protocol::FetchResponse,
    claim: &TopicPartition,
    offset: i64,
) -> Result<Vec<Record>> {
    let Some(partition) = response.partition(&claim.topic, claim.partition) else {
        return Ok(vec![]);
    };
    partition.is_error()?;
    Ok(partition
        .records_from(offset)?
        .into_iter()
        .map(|record| Record::from_fetched(claim, record))
        .collect())
}

#[async_trait]
impl GroupBroker for KafkaBroker {
    #[instrument(level = "debug", skip(self, topics))]
    async fn join_group(
        &self,
        group_id: &str,
        member_id: &str,
        topics: &[String],
        strategy: BalanceStrategy,
    ) -> Result<JoinOutcome> {
        let result = async {
            let conn = self.coordinator(group_id).await?;
            let subscription = Subscription::new(topics.to_vec());
            let response_bytes = conn
                .request(|correlation_id| {
                    protocol::JoinGroupRequest::new(
                        correlation_id,
                        &self.client_id,
                        group_id,
                        self.session_timeout_ms,
                        self.rebalance_timeout_ms,
                        member_id,
                        CONSUMER_PROTOCOL_TYPE,
                        vec![GroupProtocol {
                            name: strategy.name(),
                            subscription,
                        }],
                    )
                })
                .await?;
            let response = protocol::JoinGroupResponse::try_from(response_bytes)?;
            response.is_error()?;

            let members = response
                .members
                .iter()
                .map(|member| {
                    Ok(GroupMember {
                        member_id: parser::to_string(&member.member_id)?,
                        topics: member.subscription()?.topics,
                    })
                })
                .collect::<Result<Vec<GroupMember>>>()?;

            Ok(JoinOutcome {
                generation_id: response.generation_id,
                member_id: parser::to_string(&response.member_id)?,
                leader_id: parser::to_string(&response.leader)?,
                protocol: parser::to_string(&response.protocol_name)?,
                members,
            })
        }
        .await;
        self.observe_coordinator(result).await
    }

    #[instrument(level = "debug", skip(self, assignments))]
    async fn sync_group(
        &self,
        generation: &Generation,
        assignments: &HashMap<String, TopicPartitions>,
    ) -> Result<TopicPartitions> {
        let result = async {
            let conn = self.coordinator(&generation.group_id).await?;
            let response_bytes = conn
                .request(|correlation_id| {
                    let assignments = assignments
                        .iter()
                        .map(|(member_id, partitions)| GroupAssignment {
                            member_id,
                            assignment: to_member_assignment(partitions),
                        })
                        .collect();
                    protocol::SyncGroupRequest::new(
                        correlation_id,
                        &self.client_id,
                        &generation.group_id,
                        generation.generation_id,
                        &generation.member_id,
                        assignments,
                    )
                })
                .await?;
            let response = protocol::SyncGroupResponse::try_from(response_bytes)?;
            response.is_error()?;
            Ok(from_member_assignment(response.member_assignment()?))
        }
        .await;
        self.observe_coordinator(result).await
    }

    #[instrument(level = "trace", skip(self))]
    async fn heartbeat(&self, generation: &Generation) -> Result<()> {
        let result = async {
            let conn = self.coordinator(&generation.group_id).await?;
            let response_bytes = conn
                .request(|correlation_id| {
                    protocol::HeartbeatRequest::new(
                        correlation_id,
                        &self.client_id,
                        &generation.group_id,
                        generation.generation_id,
                        &generation.member_id,
                    )
                })
                .await?;
            protocol::HeartbeatResponse::try_from(response_bytes)?.is_error()
        }
        .await;
        self.observe_coordinator(result).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn leave_group(&self, generation: &Generation) -> Result<()> {
        let result = async {
            let conn = self.coordinator(&generation.group_id).await?;
            let response_bytes = conn
                .request(|correlation_id| {
                    protocol::LeaveGroupRequest::new(
                        correlation_id,
                        &self.client_id,
                        &generation.group_id,
                        &generation.member_id,
                    )
                })
                .await?;
            protocol::LeaveGroupResponse::try_from(response_bytes)?.is_error()
        }
        .await;
        self.observe_coordinator(result).await
    }

    async fn partitions_for(&self, topics: &[String]) -> Result<TopicPartitions> {
        let bootstrap = self.bootstrap().await?;
        let fresh = ClusterMetadata::fetch(&bootstrap, &self.client_id, topics).await?;
        let partitions = topics
            .iter()
            .map(|topic| Ok((topic.clone(), fresh.partitions_for(topic)?)))
            .collect::<Result<TopicPartitions>>()?;
        *self.metadata.write().await = fresh;
        Ok(partitions)
    }

    #[instrument(level = "debug", skip(self, partitions))]
    async fn committed_offsets(
        &self,
        group_id: &str,
        partitions: &TopicPartitions,
    ) -> Result<PartitionOffsets> {
        let result = async {
            let conn = self.coordinator(group_id).await?;
            let response_bytes = conn
                .request(|correlation_id| {
                    let mut req =
                        protocol::OffsetFetchRequest::new(correlation_id, &self.client_id, group_id);
                    for (topic, ids) in partitions {
                        for partition in ids {
                            req.add(topic, *partition);
                        }
                    }
                    req
                })
                .await?;
            let response = protocol::OffsetFetchResponse::try_from(response_bytes)?;
            response.is_error()?;

            let mut offsets = PartitionOffsets::new();
            for topic in response.topics.iter() {
                let name = parser::to_string(&topic.name)?;
                for partition in topic.partitions.iter() {
                    offsets.insert(
                        TopicPartition::new(&name, partition.partition_index),
                        partition.committed_offset,
                    );
                }
            }
            Ok(offsets)
        }
        .await;
        self.observe_coordinator(result).await
    }

    #[instrument(level = "debug", skip(self, partitions))]
    async fn list_offsets(
        &self,
        partitions: &TopicPartitions,
        policy: InitialOffset,
    ) -> Result<PartitionOffsets> {
        let by_leader: BTreeMap<i32, Vec<(&str, i32)>> = self.metadata.read().await.partitions_by_leader(
            partitions
                .iter()
                .flat_map(|(topic, ids)| ids.iter().map(move |p| (topic.as_str(), *p))),
        )?;

        let mut offsets = PartitionOffsets::new();
        for (leader, leader_partitions) in by_leader {
            let conn = self.broker_connection(leader).await?;
            let response_bytes = conn
                .request(|correlation_id| {
                    let mut req = protocol::ListOffsetsRequest::new(correlation_id, &self.client_id);
                    for (topic, partition) in leader_partitions.iter() {
                        req.add(topic, *partition, policy.timestamp());
                    }
                    req
                })
                .await?;
            let response = protocol::ListOffsetsResponse::try_from(response_bytes)?;
            response.is_error()?;

            for topic in response.topics.iter() {
                let name = parser::to_string(&topic.name)?;
                for partition in topic.partitions.iter() {
                    offsets.insert(
                        TopicPartition::new(&name, partition.partition_index),
                        partition.offset,
                    );
                }
            }
        }
        Ok(offsets)
    }

    #[instrument(level = "debug", skip(self, offsets))]
    async fn commit_offsets(
        &self,
        generation: &Generation,
        offsets: &PartitionOffsets,
    ) -> Result<()> {
        if offsets.is_empty() {
            return Ok(());
        }
        let result = async {
            let conn = self.coordinator(&generation.group_id).await?;
            let response_bytes = conn
                .request(|correlation_id| {
                    let mut req = protocol::OffsetCommitRequest::new(
                        correlation_id,
                        &self.client_id,
                        &generation.group_id,
                        generation.generation_id,
                        &generation.member_id,
                        self.retention_time_ms,
                    );
                    for (tp, offset) in offsets {
                        req.add(&tp.topic, tp.partition, *offset, None);
                    }
                    req
                })
                .await?;
            protocol::OffsetCommitResponse::try_from(response_bytes)?.is_error()
        }
        .await;
        self.observe_coordinator(result).await
    }

    async fn fetch(&self, claim: &TopicPartition, offset: i64) -> Result<Vec<Record>> {
        let result = self.fetch_from_leader(claim, offset).await;
        if let Err(err) = &result {
            let stale_layout = matches!(
                err,
                Error::NoLeaderForTopicPartition(..)
                    | Error::KafkaError(
                        KafkaCode::NotLeaderForPartition
                            | KafkaCode::LeaderNotAvailable
                            | KafkaCode::UnknownTopicOrPartition
                    )
            );
            if stale_layout || err.is_connection_fault() {
                tracing::warn!(
                    "Fetching {} partition {} failed with {:?}, reloading metadata",
                    claim.topic,
                    claim.partition,
                    err
                );
                if let Err(err) = self.refresh_metadata().await {
                    tracing::warn!("Reloading metadata failed {:?}", err);
                }
            }
        }
        result
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Broker connections already closed");
            return;
        }
        if let Some(conn) = self.coordinator.lock().await.take() {
            conn.close().await;
        }
        for (_, conn) in self.leaders.lock().await.drain() {
            conn.close().await;
        }
        self.bootstrap.lock().await.close().await;
        tracing::info!("Closed broker connections");
    }
}

pub(crate) fn to_member_assignment(partitions: &TopicPartitions) -> MemberAssignment {
    let mut topics: Vec<TopicAssignment> = partitions
        .iter()
        .filter(|(_, ids)| !ids.is_empty())
        .map(|(topic, ids)| TopicAssignment {
            topic: topic.clone(),
            partitions: ids.clone(),
        })
        .collect();
    topics.sort_by(|a, b| a.topic.cmp(&b.topic));
    MemberAssignment::new(topics)
}

pub(crate) fn from_member_assignment(assignment: MemberAssignment) -> TopicPartitions {
    let mut partitions = TopicPartitions::new();
    for topic in assignment.topics {
        partitions
            .entry(topic.topic)
            .or_default()
            .extend(topic.partitions);
    }
    partitions
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicUsize;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    const PRICE_UPDATES: &[u8] = include_bytes!("../testdata/fetch_v4_price_updates.bin");

    /// Answers every request with the recorded fetch response, counting them.
    async fn fetch_broker(requests: Arc<AtomicUsize>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            loop {
                let Ok(size) = socket.read_i32().await else {
                    return;
                };
                let mut body = vec![0; size as usize];
                if socket.read_exact(&mut body).await.is_err() {
                    return;
                }
                requests.fetch_add(1, Ordering::SeqCst);

                let mut payload = PRICE_UPDATES.to_vec();
                payload[..4].copy_from_slice(&body[4..8]);
                let mut out = (payload.len() as i32).to_be_bytes().to_vec();
                out.extend_from_slice(&payload);
                if socket.write_all(&out).await.is_err() {
                    return;
                }
            }
        });
        addr
    }

    fn waiter(partition: i32, offset: i64) -> (FetchWaiter, oneshot::Receiver<Result<Vec<Record>>>) {
        let (reply, answer) = oneshot::channel();
        let waiter = FetchWaiter {
            claim: TopicPartition::new("price-updates", partition),
            offset,
            reply,
        };
        (waiter, answer)
    }

    #[tokio::test]
    async fn claims_on_one_leader_share_a_fetch() {
        let requests = Arc::new(AtomicUsize::new(0));
        let addr = fetch_broker(requests.clone()).await;
        let conn = BrokerConnection::new(vec![addr]).await.unwrap();

        let (from_start, from_start_answer) = waiter(0, 0);
        let (from_eleven, from_eleven_answer) = waiter(0, 11);
        let (idle, idle_answer) = waiter(1, 0);
        let rounds = FetchRounds::default();
        rounds.lock().await.insert(
            1,
            FetchRound {
                conn: Some(conn),
                waiting: vec![from_start, from_eleven, idle],
                in_flight: true,
            },
        );

        run_fetch_rounds(rounds.clone(), 1, "test".to_owned(), FetchParams::default()).await;
        assert_eq!(requests.load(Ordering::SeqCst), 1);

        assert_eq!(from_start_answer.await.unwrap().unwrap().len(), 14);
        let tail = from_eleven_answer.await.unwrap().unwrap();
        assert_eq!(tail.iter().map(|r| r.offset).collect::<Vec<_>>(), vec![11, 12, 13]);
        assert_eq!(tail[0].topic, "price-updates");
        assert!(idle_answer.await.unwrap().unwrap().is_empty());

        let rounds = rounds.lock().await;
        assert!(!rounds[&1].in_flight);
        assert!(rounds[&1].waiting.is_empty());
    }

    #[tokio::test]
    async fn abandoned_fetches_are_not_sent() {
        let requests = Arc::new(AtomicUsize::new(0));
        let addr = fetch_broker(requests.clone()).await;
        let conn = BrokerConnection::new(vec![addr]).await.unwrap();

        let (gone, answer) = waiter(0, 0);
        drop(answer);
        let rounds = FetchRounds::default();
        rounds.lock().await.insert(
            1,
            FetchRound {
                conn: Some(conn),
                waiting: vec![gone],
                in_flight: true,
            },
        );

        run_fetch_rounds(rounds.clone(), 1, "test".to_owned(), FetchParams::default()).await;
        assert_eq!(requests.load(Ordering::SeqCst), 0);
        assert!(!rounds.lock().await[&1].in_flight);
    }

    #[test]
    fn assignments_round_trip_through_the_consumer_protocol() {
        let partitions = TopicPartitions::from([
            ("b".to_owned(), vec![1]),
            ("a".to_owned(), vec![0, 2]),
            ("empty".to_owned(), vec![]),
        ]);

        let assignment = to_member_assignment(&partitions);
        assert_eq!(assignment.topics[0].topic, "a");
        assert_eq!(assignment.topics[1].topic, "b");
        assert_eq!(assignment.partition_count(), 3);

        let back = from_member_assignment(assignment);
        assert_eq!(back.len(), 2);
        assert_eq!(back["a"], vec![0, 2]);
    }

    #[test]
    fn null_key_and_value_become_empty() {
        let claim = TopicPartition::new("t", 3);
        let record = Record::from_fetched(
            &claim,
            records::Record {
                offset: 7,
                timestamp: 11,
                key: None,
                value: Some(Bytes::from_static(b"v")),
                headers: vec![],
            },
        );
        assert_eq!(record.topic_partition(), claim);
        assert_eq!(record.offset, 7);
        assert!(record.key.is_empty());
        assert_eq!(record.value, Bytes::from_static(b"v"));
    }

    #[test]
    fn leader_is_the_member_named_leader() {
        let outcome = JoinOutcome {
            generation_id: 1,
            member_id: "m1".to_owned(),
            leader_id: "m1".to_owned(),
            protocol: "roundrobin".to_owned(),
            members: vec![],
        };
        assert!(outcome.is_leader());
        assert!(!JoinOutcome {
            leader_id: "m2".to_owned(),
            ..outcome
        }
        .is_leader());
    }
}
