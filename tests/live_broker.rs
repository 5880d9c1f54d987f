//! Runs against a real cluster when KAFKA_BROKERS and KAFKA_TOPIC are set.
mod testsupport;

use std::{sync::Arc, time::Duration};

use testsupport::*;
use txgroup::prelude::*;

const CLIENT_ID: &str = "live-test";

#[tokio::test]
async fn metadata_lists_the_topic() -> Result<()> {
    let (skip, brokers, topic) = get_brokers_and_topic()?;
    if skip {
        return Ok(());
    }
    let conn = BrokerConnection::new(brokers).await?;
    let metadata = ClusterMetadata::fetch(&conn, CLIENT_ID, &[topic.clone()]).await?;

    let partitions = metadata.partitions_for(&topic)?;
    assert!(!partitions.is_empty());
    for partition in partitions {
        let leader = metadata.get_leader_for_topic_partition(&topic, partition)?;
        assert!(metadata.get_broker_by_id(leader).is_some());
    }
    conn.close().await;
    Ok(())
}

#[tokio::test]
async fn group_member_joins_and_leaves() -> Result<()> {
    let (skip, brokers, topic) = get_brokers_and_topic()?;
    if skip {
        return Ok(());
    }
    let mut client = GroupClientBuilder::new(brokers, "txgroup-live-test".to_string())
        .client_id(CLIENT_ID.to_string())
        .build()
        .await?;

    let shutdown = ShutdownCoordinator::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        trigger.trigger();
    });

    let handler = Arc::new(ClaimProcessor::new(TransactionCodec, RecordingSink::default()));
    client.run(vec![topic], handler, shutdown.token()).await?;
    assert_eq!(client.member_id(), "");
    client.close().await;
    client.close().await;
    Ok(())
}
