use std::{sync::Arc, time::Duration};

use crate::{
    assignor::BalanceStrategy,
    broker::{GroupBroker, KafkaBroker},
    consumer_group::GroupClient,
    error::Result,
    protocol::list_offsets::{EARLIEST_TIMESTAMP, LATEST_TIMESTAMP},
    DEFAULT_CLIENT_ID,
};

const DEFAULT_RETENTION_TIME_MS: i64 = -1;
const DEFAULT_SESSION_TIMEOUT_MS: i32 = 10000;
const DEFAULT_REBALANCE_TIMEOUT_MS: i32 = 10000;
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);
const DEFAULT_COMMIT_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CLAIM_BUFFER: usize = 256;

const DEFAULT_MAX_WAIT_MS: i32 = 500;
const DEFAULT_MIN_BYTES: i32 = 1;
const DEFAULT_MAX_BYTES: i32 = 52428800;
const DEFAULT_MAX_PARTITION_BYTES: i32 = 1048576;
const DEFAULT_ISOLATION_LEVEL: i8 = 0;

/// Where a claim starts when the group never committed an offset for it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InitialOffset {
    /// Only records produced from now on.
    #[default]
    Newest,
    /// Everything still retained in the partition.
    Oldest,
}

impl InitialOffset {
    /// ListOffsets timestamp that resolves this policy.
    pub fn timestamp(&self) -> i64 {
        match self {
            InitialOffset::Newest => LATEST_TIMESTAMP,
            InitialOffset::Oldest => EARLIEST_TIMESTAMP,
        }
    }
}

/// How often the client tries to join again after a generation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Whether a retry is allowed after `failures` consecutive failed generations.
    pub fn allows(&self, failures: u32) -> bool {
        self.max_attempts.map_or(true, |max| failures < max)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchParams {
    pub max_wait_ms: i32,
    pub min_bytes: i32,
    pub max_bytes: i32,
    pub max_partition_bytes: i32,
    pub isolation_level: i8,
}

impl Default for FetchParams {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchParams {
    pub fn new() -> Self {
        Self {
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
            min_bytes: DEFAULT_MIN_BYTES,
            max_bytes: DEFAULT_MAX_BYTES,
            max_partition_bytes: DEFAULT_MAX_PARTITION_BYTES,
            isolation_level: DEFAULT_ISOLATION_LEVEL,
        }
    }
}

/// Everything a [`GroupClient`] and its [`KafkaBroker`] are configured with.
#[derive(Clone, Debug)]
pub struct GroupConfig {
    pub bootstrap_addrs: Vec<String>,
    pub group_id: String,
    pub client_id: String,
    pub session_timeout_ms: i32,
    pub rebalance_timeout_ms: i32,
    pub heartbeat_interval: Duration,
    pub commit_interval: Duration,
    /// Upper bound on the last commit of a generation, so teardown ends
    /// even when the coordinator stops answering.
    pub commit_timeout: Duration,
    pub retention_time_ms: i64,
    pub strategy: BalanceStrategy,
    pub initial_offset: InitialOffset,
    pub retry: RetryPolicy,
    pub fetch_params: FetchParams,
    /// Records buffered between a claim's fetcher and its processor.
    pub claim_buffer: usize,
}

#[derive(Clone, Debug)]
pub struct GroupClientBuilder {
    config: GroupConfig,
}

impl GroupClientBuilder {
    /// Start a group client builder. To complete, use the [`build`](Self::build) method.
    pub fn new(bootstrap_addrs: Vec<String>, group_id: String) -> Self {
        Self {
            config: GroupConfig {
                bootstrap_addrs,
                group_id,
                client_id: DEFAULT_CLIENT_ID.to_owned(),
                session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
                rebalance_timeout_ms: DEFAULT_REBALANCE_TIMEOUT_MS,
                heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
                commit_interval: DEFAULT_COMMIT_INTERVAL,
                commit_timeout: DEFAULT_COMMIT_TIMEOUT,
                retention_time_ms: DEFAULT_RETENTION_TIME_MS,
                strategy: BalanceStrategy::default(),
                initial_offset: InitialOffset::default(),
                retry: RetryPolicy::default(),
                fetch_params: FetchParams::new(),
                claim_buffer: DEFAULT_CLAIM_BUFFER,
            },
        }
    }

    pub fn client_id(mut self, client_id: String) -> Self {
        self.config.client_id = client_id;
        self
    }

    pub fn session_timeout_ms(mut self, session_timeout_ms: i32) -> Self {
        self.config.session_timeout_ms = session_timeout_ms;
        self
    }

    pub fn rebalance_timeout_ms(mut self, rebalance_timeout_ms: i32) -> Self {
        self.config.rebalance_timeout_ms = rebalance_timeout_ms;
        self
    }

    /// Should stay well under the session timeout, a third is customary.
    pub fn heartbeat_interval(mut self, heartbeat_interval: Duration) -> Self {
        self.config.heartbeat_interval = heartbeat_interval;
        self
    }

    /// How often marked offsets are flushed to the coordinator.
    pub fn commit_interval(mut self, commit_interval: Duration) -> Self {
        self.config.commit_interval = commit_interval;
        self
    }

    /// How long the final commit of a generation may take before its
    /// offsets are given up.
    pub fn commit_timeout(mut self, commit_timeout: Duration) -> Self {
        self.config.commit_timeout = commit_timeout;
        self
    }

    /// How long the broker keeps committed offsets, -1 for its own default.
    pub fn retention_time_ms(mut self, retention_time_ms: i64) -> Self {
        self.config.retention_time_ms = retention_time_ms;
        self
    }

    pub fn strategy(mut self, strategy: BalanceStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn initial_offset(mut self, initial_offset: InitialOffset) -> Self {
        self.config.initial_offset = initial_offset;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// The maximum time in milliseconds to wait for the response.
    pub fn max_wait_ms(mut self, max_wait_ms: i32) -> Self {
        self.config.fetch_params.max_wait_ms = max_wait_ms;
        self
    }

    /// The minimum bytes to accumulate in the response.
    pub fn min_bytes(mut self, min_bytes: i32) -> Self {
        self.config.fetch_params.min_bytes = min_bytes;
        self
    }

    /// The maximum bytes to fetch. See KIP-74 for cases where this limit may not be honored.
    pub fn max_bytes(mut self, max_bytes: i32) -> Self {
        self.config.fetch_params.max_bytes = max_bytes;
        self
    }

    /// The maximum bytes to fetch from one partition. See KIP-74 for cases where this limit may not be honored.
    pub fn max_partition_bytes(mut self, max_partition_bytes: i32) -> Self {
        self.config.fetch_params.max_partition_bytes = max_partition_bytes;
        self
    }

    /// READ_UNCOMMITTED (0) makes all records visible. READ_COMMITTED (1)
    /// stops at the last stable offset so open transactions are not read.
    pub fn isolation_level(mut self, isolation_level: i8) -> Self {
        self.config.fetch_params.isolation_level = isolation_level;
        self
    }

    pub fn claim_buffer(mut self, claim_buffer: usize) -> Self {
        self.config.claim_buffer = claim_buffer.max(1);
        self
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// Connect to the cluster. Fails when no bootstrap broker answers a
    /// metadata request.
    pub async fn build(self) -> Result<GroupClient<KafkaBroker>> {
        let broker = KafkaBroker::connect(&self.config).await?;
        Ok(self.with_broker(Arc::new(broker)))
    }

    /// Use an already constructed broker instead of connecting. The caller
    /// may keep its own handle on it.
    pub fn with_broker<B: GroupBroker>(self, broker: Arc<B>) -> GroupClient<B> {
        GroupClient::new(self.config, broker)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let builder = GroupClientBuilder::new(vec!["localhost:9092".to_owned()], "g".to_owned());
        let config = builder.config();
        assert_eq!(config.client_id, "txgroup");
        assert_eq!(config.session_timeout_ms, 10000);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(3));
        assert_eq!(config.commit_interval, Duration::from_secs(1));
        assert_eq!(config.commit_timeout, Duration::from_secs(5));
        assert_eq!(config.retention_time_ms, -1);
        assert_eq!(config.strategy, BalanceStrategy::RoundRobin);
        assert_eq!(config.initial_offset, InitialOffset::Newest);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.fetch_params.max_wait_ms, 500);
        assert_eq!(config.fetch_params.max_bytes, 50 * 1024 * 1024);
        assert_eq!(config.fetch_params.max_partition_bytes, 1024 * 1024);
    }

    #[test]
    fn setters() {
        let config = GroupClientBuilder::new(vec![], "g".to_owned())
            .strategy(BalanceStrategy::Range)
            .initial_offset(InitialOffset::Oldest)
            .max_wait_ms(100)
            .isolation_level(1)
            .claim_buffer(0)
            .commit_timeout(Duration::from_millis(200))
            .config()
            .clone();
        assert_eq!(config.strategy, BalanceStrategy::Range);
        assert_eq!(config.initial_offset.timestamp(), -2);
        assert_eq!(config.fetch_params.max_wait_ms, 100);
        assert_eq!(config.fetch_params.isolation_level, 1);
        assert_eq!(config.claim_buffer, 1);
        assert_eq!(config.commit_timeout, Duration::from_millis(200));
    }

    #[test]
    fn retry_policy() {
        assert!(RetryPolicy::default().allows(u32::MAX - 1));
        let bounded = RetryPolicy {
            max_attempts: Some(2),
            delay: Duration::ZERO,
        };
        assert!(bounded.allows(0));
        assert!(bounded.allows(1));
        assert!(!bounded.allows(2));
    }
}
