//! # txgroup
//! Rust-native Kafka consumer group member for transaction updates.
//!
//! A member joins a named consumer group, receives its share of the
//! subscribed topics' partitions from the group coordinator, fetches the
//! records of those partitions, decodes each value as a protobuf transaction
//! update and commits its read position back to the group. When the group
//! rebalances the member joins again and carries on with its new share.
//!
//! Everything down to the wire protocol is implemented here on top of
//! Tokio and Nom, no librdkafka involved.
//!
//! ## Table of contents
//! - [Getting started](#getting-started)
//! - [Generations](#generations)
//! - [Resources](#resources)
//!
//! ## Getting started
//! Build a [`GroupClient`](prelude::GroupClient) with a
//! [`GroupClientBuilder`](prelude::GroupClientBuilder), hand it a
//! [`ClaimHandler`](prelude::ClaimHandler) and a cancellation token, and
//! let it run until the token is cancelled.
//! ```no_run
//! use std::sync::Arc;
//! use txgroup::prelude::*;
//!
//! # async fn run() -> Result<()> {
//! let bootstrap_addrs = vec!["127.0.0.1:9092".to_string()];
//! let mut client = GroupClientBuilder::new(bootstrap_addrs, "my-consumer-group".to_string())
//!     .strategy(BalanceStrategy::RoundRobin)
//!     .initial_offset(InitialOffset::Newest)
//!     .build()
//!     .await?;
//!
//! let shutdown = ShutdownCoordinator::new();
//! tokio::spawn(shutdown.clone().listen());
//!
//! let handler = Arc::new(ClaimProcessor::new(TransactionCodec, ConsoleSink));
//! client
//!     .run(vec!["test-topic".to_string()], handler, shutdown.token())
//!     .await?;
//! client.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Generations
//! Each successful join and sync starts a generation. For its lifetime the
//! member holds a [`GroupSession`](prelude::GroupSession) and one
//! [`PartitionClaim`](prelude::PartitionClaim) per assigned partition.
//! Records are processed in log order within a claim and marked with
//! [`GroupSession::mark_processed`](prelude::GroupSession::mark_processed);
//! marks are committed in the background. The generation ends when the
//! coordinator rebalances, and with it every claim.
//!
//! Delivery is at least once: records processed but not yet committed
//! when a generation ends are read again by whoever owns the partition
//! next. Records that fail to decode are reported and then skipped.
//!
//! ## Resources
//! - [Kafka Protocol Spec](https://kafka.apache.org/protocol.html)
//! - [Consumer rebalance protocol](https://cwiki.apache.org/confluence/display/KAFKA/Kafka+Client-side+Assignment+Proposal)

use std::io::{self, IsTerminal};

use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

mod assignor;
mod broker;
mod codec;
mod consumer_group;
mod consumer_group_builder;
mod encode;
mod error;
mod metadata;
mod network;
mod parser;
mod processor;
mod protocol;
mod session;
mod shutdown;
mod sink;

const DEFAULT_CORRELATION_ID: i32 = 1;
const DEFAULT_CLIENT_ID: &str = "txgroup";

/// Log to stdout at INFO unless `RUST_LOG` says otherwise. Colors only
/// when attached to a terminal.
pub fn setup_tracing() -> std::result::Result<(), TryInitError> {
    let is_atty = io::stdout().is_terminal() && io::stderr().is_terminal();
    let io_layer = tracing_subscriber::fmt::layer()
        .with_ansi(is_atty)
        .with_target(false);
    let level_layer = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(io_layer)
        .with(level_layer)
        .try_init()
}

pub mod prelude {
    //! Main export of various structures and methods
    //!
    //! # Group membership
    //! [`GroupClientBuilder`] configures and builds a [`GroupClient`].
    //! [`GroupClient::run`] drives [`ClaimHandler`] callbacks for every
    //! generation until its token is cancelled, which
    //! [`ShutdownCoordinator`] does on SIGINT or SIGTERM.
    //!
    //! # Processing
    //! [`ClaimProcessor`] is the provided handler: it decodes each record
    //! with a [`Codec`] such as [`TransactionCodec`], passes the outcome to
    //! a [`Sink`] such as [`ConsoleSink`] and marks the record.
    //!
    //! # Brokers
    //! [`GroupBroker`] is everything the group runtime needs from the
    //! cluster, [`KafkaBroker`] implements it over the wire protocol using
    //! [`BrokerConnection`] and [`ClusterMetadata`]. For those looking to
    //! handle the requests and responses themselves, visit the [protocol module].
    //!
    //! [protocol module]: protocol
    pub use crate::assignor::{BalanceStrategy, RANGE_PROTOCOL, ROUND_ROBIN_PROTOCOL};
    pub use crate::broker::{
        Generation, GroupBroker, GroupMember, JoinOutcome, KafkaBroker, PartitionOffsets,
        Record, TopicPartition, TopicPartitions,
    };
    pub use crate::codec::{
        Codec, DecodeError, DecodedTransaction, SubscribeUpdateTransactionInfo, TransactionCodec,
    };
    pub use crate::consumer_group::GroupClient;
    pub use crate::consumer_group_builder::{
        FetchParams, GroupClientBuilder, GroupConfig, InitialOffset, RetryPolicy,
    };
    pub use crate::error::{Error, KafkaCode, Result};
    pub use crate::metadata::ClusterMetadata;
    pub use crate::network::BrokerConnection;
    pub use crate::processor::{ClaimHandler, ClaimProcessor};
    pub use crate::session::{GroupSession, PartitionClaim};
    pub use crate::shutdown::ShutdownCoordinator;
    pub use crate::sink::{ConsoleSink, Sink};

    pub use bytes;

    pub mod encode {
        pub use crate::encode::*;
    }

    pub mod protocol {
        pub use crate::protocol::*;
    }
}
