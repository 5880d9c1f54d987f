use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use txgroup::prelude::*;

/// Join a consumer group and print every transaction update it is assigned.
#[derive(Parser, Debug, Clone)]
#[command(name = "consumer_group")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Bootstrap brokers as host:port, comma separated
    #[arg(long, env = "KAFKA_BROKERS", value_delimiter = ',', default_value = "localhost:9092")]
    brokers: Vec<String>,

    /// Consumer group to join
    #[arg(long, env = "KAFKA_GROUP", default_value = "my-consumer-group")]
    group: String,

    /// Topic to consume, repeat or comma separate for several
    #[arg(long = "topic", env = "KAFKA_TOPICS", value_delimiter = ',', default_value = "test-topic")]
    topics: Vec<String>,

    /// Partition assignment strategy (roundrobin, range)
    #[arg(long, default_value = ROUND_ROBIN_PROTOCOL, value_parser = BalanceStrategy::from_name)]
    strategy: BalanceStrategy,

    /// Start partitions without a committed offset from the oldest record
    /// instead of the newest
    #[arg(long)]
    oldest: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = txgroup::setup_tracing() {
        eprintln!("could not set up logging: {err}");
    }
    let args = Args::parse();

    let initial_offset = if args.oldest {
        InitialOffset::Oldest
    } else {
        InitialOffset::Newest
    };
    let client = GroupClientBuilder::new(args.brokers, args.group)
        .strategy(args.strategy)
        .initial_offset(initial_offset)
        .build()
        .await;
    let mut client = match client {
        Ok(client) => client,
        Err(err) => {
            tracing::error!("Error creating consumer group: {:?}", err);
            return ExitCode::FAILURE;
        }
    };

    let shutdown = ShutdownCoordinator::new();
    let listener = tokio::spawn(shutdown.clone().listen());

    let handler = Arc::new(ClaimProcessor::new(TransactionCodec, ConsoleSink));
    let token = shutdown.token();
    let topics = args.topics;
    let consumer = tokio::spawn(async move {
        let result = client.run(topics, handler, token).await;
        client.close().await;
        result
    });
    tracing::info!("Kafka consumer is running...");

    let code = match consumer.await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(err)) => {
            tracing::error!("Consumer gave up: {:?}", err);
            ExitCode::FAILURE
        }
        Err(err) => {
            tracing::error!("Consumer task failed: {:?}", err);
            ExitCode::FAILURE
        }
    };

    // the listener also returns once the token is cancelled
    shutdown.trigger();
    match listener.await {
        Ok(Err(err)) => tracing::warn!("Signal listener failed: {:?}", err),
        Err(err) => tracing::warn!("Signal listener task failed: {:?}", err),
        Ok(Ok(())) => {}
    }
    tracing::info!("Consumer stopped");
    code
}
