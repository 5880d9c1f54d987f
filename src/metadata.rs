//! Cluster metadata: which brokers exist and who leads each partition.
use std::collections::BTreeMap;

use tracing::instrument;

use crate::{
    error::{Error, Result},
    network::BrokerConnection,
    protocol::{self, metadata::response::*},
};

#[derive(Clone, Debug, Default)]
pub struct ClusterMetadata {
    pub brokers: Vec<Broker>,
    pub topics: Vec<Topic>,
}

impl ClusterMetadata {
    /// Ask `conn` for the current layout of `topics`. An empty list asks
    /// for every topic in the cluster.
    ///
    /// A topic the cluster does not know is an error; partitions without a
    /// leader surface later, when something is routed to them.
    #[instrument(name = "metadata-fetch", level = "debug", skip(conn, client_id))]
    pub async fn fetch(
        conn: &BrokerConnection,
        client_id: &str,
        topics: &[String],
    ) -> Result<ClusterMetadata> {
        tracing::debug!("Fetching metadata");
        let response_bytes = conn
            .request(|correlation_id| {
                protocol::MetadataRequest::new(correlation_id, client_id, topics)
            })
            .await?;
        let response = protocol::MetadataResponse::try_from(response_bytes)?;
        response.is_error()?;

        tracing::debug!(
            "Metadata lists {} brokers and {} topics",
            response.brokers.len(),
            response.topics.len()
        );
        Ok(ClusterMetadata {
            brokers: response.brokers,
            topics: response.topics,
        })
    }

    pub fn get_broker_by_id(&self, id: i32) -> Option<&Broker> {
        self.brokers.iter().find(|b| b.node_id == id)
    }

    fn topic(&self, topic_name: &str) -> Option<&Topic> {
        self.topics
            .iter()
            .find(|t| t.name.as_ref() == topic_name.as_bytes())
    }

    /// Partition ids of a topic, ascending.
    pub fn partitions_for(&self, topic_name: &str) -> Result<Vec<i32>> {
        let topic = self
            .topic(topic_name)
            .ok_or_else(|| Error::MetadataNeedsSync(topic_name.to_owned()))?;
        let mut partitions: Vec<i32> = topic
            .partitions
            .iter()
            .map(|p| p.partition_index)
            .collect();
        partitions.sort_unstable();
        Ok(partitions)
    }

    pub fn get_leader_for_topic_partition(&self, topic_name: &str, partition_id: i32) -> Result<i32> {
        let no_leader = || Error::NoLeaderForTopicPartition(topic_name.to_owned(), partition_id);
        let partition = self
            .topic(topic_name)
            .and_then(|t| t.partitions.iter().find(|p| p.partition_index == partition_id))
            .ok_or_else(no_leader)?;
        // -1 while an election is in progress
        let leader = self
            .get_broker_by_id(partition.leader_id)
            .ok_or_else(no_leader)?;
        tracing::trace!(
            "Leader is {} for topic {} and partition {}",
            leader.node_id,
            topic_name,
            partition_id
        );
        Ok(leader.node_id)
    }

    pub fn broker_addr(&self, node_id: i32) -> Result<String> {
        self.get_broker_by_id(node_id)
            .ok_or(Error::NoConnectionForBroker(node_id))?
            .addr()
    }

    /// Group partitions by the broker leading them.
    pub fn partitions_by_leader<'a, I>(&self, partitions: I) -> Result<BTreeMap<i32, Vec<(&'a str, i32)>>>
    where
        I: IntoIterator<Item = (&'a str, i32)>,
    {
        let mut by_leader: BTreeMap<i32, Vec<(&'a str, i32)>> = BTreeMap::new();
        for (topic, partition) in partitions {
            let leader = self.get_leader_for_topic_partition(topic, partition)?;
            by_leader.entry(leader).or_default().push((topic, partition));
        }
        Ok(by_leader)
    }
}
