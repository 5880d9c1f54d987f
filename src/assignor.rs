//! Partition assignment, computed by the elected group leader.
use std::collections::HashMap;

use crate::{
    broker::{GroupMember, TopicPartition, TopicPartitions},
    error::{Error, Result},
};

pub const ROUND_ROBIN_PROTOCOL: &str = "roundrobin";
pub const RANGE_PROTOCOL: &str = "range";

/// How the leader spreads partitions over the members of a generation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BalanceStrategy {
    #[default]
    RoundRobin,
    Range,
}

impl BalanceStrategy {
    /// Protocol name announced in JoinGroup.
    pub fn name(&self) -> &'static str {
        match self {
            BalanceStrategy::RoundRobin => ROUND_ROBIN_PROTOCOL,
            BalanceStrategy::Range => RANGE_PROTOCOL,
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            ROUND_ROBIN_PROTOCOL => Ok(BalanceStrategy::RoundRobin),
            RANGE_PROTOCOL => Ok(BalanceStrategy::Range),
            _ => Err(Error::AssignmentStrategyNotSupported(name.to_owned())),
        }
    }

    /// Assign `partitions` to `members`, given in join order.
    ///
    /// Every member gets an entry, possibly empty. Only topics a member
    /// subscribes to are handed to it.
    pub fn assign(
        &self,
        members: &[GroupMember],
        partitions: &TopicPartitions,
    ) -> HashMap<String, TopicPartitions> {
        let mut assignments: HashMap<String, TopicPartitions> = members
            .iter()
            .map(|m| (m.member_id.clone(), TopicPartitions::new()))
            .collect();

        let placed = match self {
            BalanceStrategy::RoundRobin => round_robin(members, partitions),
            BalanceStrategy::Range => range(members, partitions),
        };
        for (member_index, tp) in placed {
            if let Some(assignment) = assignments.get_mut(&members[member_index].member_id) {
                assignment.entry(tp.topic).or_default().push(tp.partition);
            }
        }
        for assignment in assignments.values_mut() {
            for partitions in assignment.values_mut() {
                partitions.sort_unstable();
            }
        }
        assignments
    }
}

/// Lays out every topic partition in (topic, partition) order and deals
/// them to the members one by one. With identical subscriptions partition
/// `i` lands on member `i % M`, so ownership counts are within one of each
/// other. A member that does not subscribe to a topic is passed over.
fn round_robin(members: &[GroupMember], partitions: &TopicPartitions) -> Vec<(usize, TopicPartition)> {
    let mut all: Vec<TopicPartition> = partitions
        .iter()
        .flat_map(|(topic, ids)| ids.iter().map(move |p| TopicPartition::new(topic, *p)))
        .collect();
    all.sort();

    let mut placed = Vec::with_capacity(all.len());
    if members.is_empty() {
        return placed;
    }

    let mut cursor = 0;
    for tp in all {
        let owner = (0..members.len())
            .map(|step| (cursor + step) % members.len())
            .find(|&i| members[i].subscribes_to(&tp.topic));
        if let Some(owner) = owner {
            cursor = owner + 1;
            placed.push((owner, tp));
        }
    }
    placed
}

/// Per topic, hands each subscribed member a contiguous range of
/// partitions; the first `P % M` members take one extra.
fn range(members: &[GroupMember], partitions: &TopicPartitions) -> Vec<(usize, TopicPartition)> {
    let mut topics: Vec<&String> = partitions.keys().collect();
    topics.sort();

    let mut placed = vec![];
    for topic in topics {
        let subscribed: Vec<usize> = (0..members.len())
            .filter(|&i| members[i].subscribes_to(topic))
            .collect();
        if subscribed.is_empty() {
            continue;
        }

        let mut ids = partitions[topic].clone();
        ids.sort_unstable();
        let per_member = ids.len() / subscribed.len();
        let extra = ids.len() % subscribed.len();

        let mut ids = ids.into_iter();
        for (n, &member) in subscribed.iter().enumerate() {
            let take = per_member + usize::from(n < extra);
            for partition in ids.by_ref().take(take) {
                placed.push((member, TopicPartition::new(topic, partition)));
            }
        }
    }
    placed
}
