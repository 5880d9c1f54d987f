//! Turning process signals into a cancellation of the group client.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Owns the token shared with the group client. Triggering it more than
/// once has the same effect as once.
#[derive(Clone, Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    triggered: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The token to hand to [`GroupClient::run`](crate::consumer_group::GroupClient::run).
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Request shutdown. Returns false when it was already requested.
    pub fn trigger(&self) -> bool {
        if self.triggered.swap(true, Ordering::AcqRel) {
            tracing::debug!("Shutdown already requested");
            return false;
        }
        tracing::info!("Shutting down consumer");
        self.token.cancel();
        true
    }

    /// Wait for SIGINT or SIGTERM and trigger. Also returns when someone
    /// else triggered first.
    pub async fn listen(self) -> Result<()> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => tracing::info!("Received SIGINT"),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
            _ = self.token.cancelled() => return Ok(()),
        };
        self.trigger();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    #[test]
    fn triggering_twice_is_triggering_once() {
        let shutdown = ShutdownCoordinator::new();
        let token = shutdown.token();
        assert!(!token.is_cancelled());

        assert!(shutdown.trigger());
        assert!(!shutdown.clone().trigger());
        assert!(token.is_cancelled());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn listener_returns_after_a_manual_trigger() {
        let shutdown = ShutdownCoordinator::new();
        let listener = tokio::spawn(shutdown.clone().listen());
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), listener)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
