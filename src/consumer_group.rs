//! Consumer which cooperates with others to consume data.
//!
//! [`GroupClient::run`] loops over generations. Each generation joins the
//! group, lets the elected leader assign partitions, syncs, and then runs
//! one fetcher and one claim processor per assigned partition next to a
//! heartbeat and a committer. The generation ends when the coordinator
//! revokes it, when a processor fails, or when the client is cancelled;
//! everything started for it is torn down before the next join.
use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{sync::mpsc, task::JoinSet, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    assignor::BalanceStrategy,
    broker::{Generation, GroupBroker, PartitionOffsets, TopicPartition, TopicPartitions},
    consumer_group_builder::GroupConfig,
    error::{Error, KafkaCode, Result},
    processor::ClaimHandler,
    session::{self, GroupSession, PartitionClaim},
};

const LEAVE_TIMEOUT: Duration = Duration::from_secs(5);

/// A member of one consumer group.
#[derive(Debug)]
pub struct GroupClient<B: GroupBroker> {
    config: GroupConfig,
    broker: Arc<B>,
    member_id: String,
    generation: Option<Generation>,
}

impl<B: GroupBroker> GroupClient<B> {
    pub(crate) fn new(config: GroupConfig, broker: Arc<B>) -> Self {
        Self {
            config,
            broker,
            member_id: String::new(),
            generation: None,
        }
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// Id the coordinator gave this member, empty before the first join.
    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    /// Consume `topics` with `handler` until `token` is cancelled.
    ///
    /// Failed generations are logged and joined again as the retry policy
    /// allows; once it gives up the last error is returned. On cancellation
    /// the member leaves the group so the others rebalance right away.
    pub async fn run<H: ClaimHandler>(
        &mut self,
        topics: Vec<String>,
        handler: Arc<H>,
        token: CancellationToken,
    ) -> Result<()> {
        let mut failures = 0u32;
        let outcome = loop {
            if token.is_cancelled() {
                break Ok(());
            }

            let result = self.run_generation(&topics, &handler, &token).await;
            if token.is_cancelled() {
                break Ok(());
            }

            match result {
                Ok(()) => {
                    failures = 0;
                    tracing::info!("Member {:?} | Generation ended, rejoining", self.member_id);
                }
                Err(err) => {
                    failures += 1;
                    tracing::error!(
                        "Member {:?} | Consume error {:?} ({} in a row)",
                        self.member_id,
                        err,
                        failures
                    );
                    if !self.config.retry.allows(failures) {
                        break Err(err);
                    }
                    if !self.config.retry.delay.is_zero() {
                        tokio::select! {
                            _ = token.cancelled() => break Ok(()),
                            _ = tokio::time::sleep(self.config.retry.delay) => {}
                        }
                    }
                }
            }
        };

        self.leave().await;
        outcome
    }

    /// Release the broker connections. Safe to call more than once.
    pub async fn close(&self) {
        self.broker.close().await;
    }

    async fn run_generation<H: ClaimHandler>(
        &mut self,
        topics: &[String],
        handler: &Arc<H>,
        token: &CancellationToken,
    ) -> Result<()> {
        let (generation, claims) = tokio::select! {
            joined = self.join_and_sync(topics) => joined?,
            _ = token.cancelled() => return Err(Error::Cancelled),
        };

        let generation_token = token.child_token();
        let (session, marks) =
            GroupSession::new(generation.clone(), claims.clone(), generation_token.clone());

        let offsets = tokio::select! {
            offsets = session::start_offsets(
                self.broker.as_ref(),
                &generation.group_id,
                &claims,
                self.config.initial_offset,
            ) => offsets?,
            _ = generation_token.cancelled() => return Err(Error::Cancelled),
        };
        let starts = claim_starts(&claims, &offsets)?;

        handler.setup(&session).await?;

        let stop_committer = CancellationToken::new();
        let committer = tokio::spawn(session::run_committer(
            self.broker.clone(),
            session.clone(),
            marks,
            self.config.commit_interval,
            self.config.commit_timeout,
            stop_committer.clone(),
        ));
        let heartbeat = tokio::spawn(heartbeat_loop(
            self.broker.clone(),
            session.clone(),
            self.config.heartbeat_interval,
        ));

        let mut fetchers = JoinSet::new();
        let mut processors = JoinSet::new();
        for (tp, offset) in starts {
            let (tx, rx) = mpsc::channel(self.config.claim_buffer);

            fetchers.spawn(session::run_fetcher(
                self.broker.clone(),
                tp.clone(),
                offset,
                self.config.initial_offset,
                tx,
                generation_token.clone(),
            ));

            let claim = PartitionClaim::new(tp, offset, rx, generation_token.clone());
            let handler = handler.clone();
            let session = session.clone();
            processors.spawn(async move { handler.consume_claim(&session, claim).await });
        }

        let outcome = wait_for_end(&session, &mut processors).await;

        // teardown, claims first so nothing is marked past this point
        session.end();
        while let Some(joined) = processors.join_next().await {
            if let Some(err) = task_error(joined) {
                tracing::warn!("Member {:?} | Claim failed during teardown {:?}", self.member_id, err);
            }
        }
        while fetchers.join_next().await.is_some() {}
        if let Err(err) = heartbeat.await {
            tracing::warn!("Member {:?} | Heartbeat task failed {:?}", self.member_id, err);
        }

        stop_committer.cancel();
        match committer.await {
            Ok(committed) => tracing::debug!(
                "Member {:?} | Generation {} committed {:?}",
                self.member_id,
                generation.generation_id,
                committed
            ),
            Err(err) => tracing::warn!("Member {:?} | Committer task failed {:?}", self.member_id, err),
        }

        if let Err(err) = handler.cleanup(&session).await {
            tracing::warn!("Member {:?} | Cleanup failed {:?}", self.member_id, err);
        }
        tracing::info!(
            "Member {:?} | Generation {} of group {} is over",
            self.member_id,
            generation.generation_id,
            generation.group_id
        );
        outcome
    }

    async fn join_and_sync(&mut self, topics: &[String]) -> Result<(Generation, TopicPartitions)> {
        tracing::info!(
            "Member {:?} | Joining group {} for topics {:?}",
            self.member_id,
            self.config.group_id,
            topics
        );
        let joined = self
            .broker
            .join_group(&self.config.group_id, &self.member_id, topics, self.config.strategy)
            .await;
        let outcome = match joined {
            Err(Error::KafkaError(KafkaCode::UnknownMemberId)) => {
                tracing::info!("Member {:?} | Unknown to the coordinator, joining as new", self.member_id);
                self.member_id.clear();
                self.generation = None;
                return Err(Error::KafkaError(KafkaCode::UnknownMemberId));
            }
            joined => joined?,
        };

        self.member_id = outcome.member_id.clone();
        let generation = Generation {
            group_id: self.config.group_id.clone(),
            member_id: outcome.member_id.clone(),
            generation_id: outcome.generation_id,
        };
        tracing::info!(
            "Member {:?} | Joined generation {} with leader {:?} and protocol {}",
            self.member_id,
            generation.generation_id,
            outcome.leader_id,
            outcome.protocol
        );

        let assignments = if outcome.is_leader() {
            let strategy = BalanceStrategy::from_name(&outcome.protocol)?;
            let mut group_topics: Vec<String> = outcome
                .members
                .iter()
                .flat_map(|member| member.topics.iter().cloned())
                .collect();
            group_topics.sort();
            group_topics.dedup();

            let partitions = self.broker.partitions_for(&group_topics).await?;
            let assignments = strategy.assign(&outcome.members, &partitions);
            tracing::info!(
                "Member {:?} | Leading {} members, assignment {:?}",
                self.member_id,
                outcome.members.len(),
                assignments
            );
            assignments
        } else {
            HashMap::new()
        };

        let claims = self.broker.sync_group(&generation, &assignments).await?;
        tracing::info!("Member {:?} | Assigned {:?}", self.member_id, claims);
        self.generation = Some(generation.clone());
        Ok((generation, claims))
    }

    async fn leave(&mut self) {
        let Some(generation) = self.generation.take() else {
            return;
        };
        match tokio::time::timeout(LEAVE_TIMEOUT, self.broker.leave_group(&generation)).await {
            Ok(Ok(())) => tracing::info!("Member {:?} | Left group {}", self.member_id, generation.group_id),
            Ok(Err(err)) => tracing::warn!("Member {:?} | Leaving failed {:?}", self.member_id, err),
            Err(_) => tracing::warn!("Member {:?} | Leaving timed out", self.member_id),
        }
        self.member_id.clear();
    }
}

/// Pair every claim with its start offset. A claim the broker gave no
/// offset for is an error, its leader is unknown.
fn claim_starts(
    claims: &TopicPartitions,
    offsets: &PartitionOffsets,
) -> Result<Vec<(TopicPartition, i64)>> {
    let mut starts = Vec::new();
    for (topic, partitions) in claims {
        for partition in partitions {
            let tp = TopicPartition::new(topic, *partition);
            let offset = offsets
                .get(&tp)
                .copied()
                .ok_or_else(|| Error::NoLeaderForTopicPartition(topic.clone(), *partition))?;
            starts.push((tp, offset));
        }
    }
    Ok(starts)
}

/// Wait until the generation is over. A claim that fails ends it early.
async fn wait_for_end(session: &GroupSession, processors: &mut JoinSet<Result<()>>) -> Result<()> {
    loop {
        tokio::select! {
            _ = session.ended() => return Ok(()),
            joined = processors.join_next() => match joined {
                // every claim returned on its own, hold the assignment until revoked
                None => {
                    session.ended().await;
                    return Ok(());
                }
                Some(joined) => {
                    if let Some(err) = task_error(joined) {
                        session.end();
                        return Err(err);
                    }
                }
            },
        }
    }
}

fn task_error(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Option<Error> {
    match joined {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err),
        Err(err) => Some(Error::TaskFailed(err.to_string())),
    }
}

/// Keep the membership alive; a rebalance answer ends the generation.
async fn heartbeat_loop<B: GroupBroker>(broker: Arc<B>, session: Arc<GroupSession>, interval: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    loop {
        let beat = tokio::select! {
            _ = session.ended() => return,
            _ = ticker.tick() => tokio::select! {
                _ = session.ended() => return,
                beat = broker.heartbeat(session.generation()) => beat,
            },
        };
        match beat {
            Ok(()) => tracing::trace!("Member {:?} | Heartbeat", session.member_id()),
            Err(Error::KafkaError(code)) if code.is_rebalance() => {
                tracing::info!(
                    "Member {:?} | Heartbeat answered {:?}, generation {} is over",
                    session.member_id(),
                    code,
                    session.generation().generation_id
                );
                session.end();
                return;
            }
            Err(err) => tracing::warn!("Member {:?} | Heartbeat failed {:?}", session.member_id(), err),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_claim_needs_a_start_offset() {
        let claims = TopicPartitions::from([("t".to_owned(), vec![0, 1])]);
        let mut offsets = PartitionOffsets::from([(TopicPartition::new("t", 0), 4)]);

        assert_eq!(
            claim_starts(&claims, &offsets),
            Err(Error::NoLeaderForTopicPartition("t".to_owned(), 1))
        );

        offsets.insert(TopicPartition::new("t", 1), 0);
        let mut starts = claim_starts(&claims, &offsets).unwrap();
        starts.sort();
        assert_eq!(
            starts,
            vec![(TopicPartition::new("t", 0), 4), (TopicPartition::new("t", 1), 0)]
        );
    }
}
