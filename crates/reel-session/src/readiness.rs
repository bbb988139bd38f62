//! DHT readiness gate.
//!
//! # Design
//! - Backed by a `watch` channel so waiters re-check the predicate on every change.
//! - The high-water mark keeps a threshold satisfied once it has been met.
//! - Bootstrap completion bumps a generation counter; it releases the waiters blocked at that
//!   moment, while later waits still need the node threshold.
//! - `release` wakes waiters on shutdown without reporting readiness.

use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Readiness {
    nodes: u32,
    peak_nodes: u32,
    bootstraps: u64,
    released: bool,
}

impl Readiness {
    const fn satisfies(&self, threshold: u32, bootstraps_seen: u64) -> bool {
        self.released || self.bootstraps > bootstraps_seen || self.peak_nodes >= threshold
    }
}

/// Blocks callers until peer discovery has enough nodes to resolve descriptors.
#[derive(Debug)]
pub struct ReadinessGate {
    state: watch::Sender<Readiness>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    /// Gate with no nodes reported.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(Readiness::default()),
        }
    }

    /// Record the latest node count and wake waiters.
    pub fn report_node_count(&self, nodes: u32) {
        self.state.send_modify(|state| {
            state.nodes = nodes;
            state.peak_nodes = state.peak_nodes.max(nodes);
        });
        debug!(dht_nodes = nodes, "dht node count reported");
    }

    /// Release every waiter currently blocked in [`wait`](Self::wait).
    pub fn report_bootstrap_complete(&self) {
        let mut generation = 0;
        self.state.send_modify(|state| {
            state.bootstraps += 1;
            generation = state.bootstraps;
        });
        info!(generation, "dht bootstrap complete");
    }

    /// Wake every waiter without marking the gate ready; used on shutdown.
    pub(crate) fn release(&self) {
        self.state.send_modify(|state| state.released = true);
    }

    /// Most recently reported node count.
    #[must_use]
    pub fn node_count(&self) -> u32 {
        self.state.borrow().nodes
    }

    /// Whether a wait for `threshold` would return immediately.
    #[must_use]
    pub fn is_ready(&self, threshold: u32) -> bool {
        self.state.borrow().peak_nodes >= threshold
    }

    /// Wait until `threshold` nodes have been observed or a bootstrap completes meanwhile.
    pub async fn wait(&self, threshold: u32) {
        let mut receiver = self.state.subscribe();
        let bootstraps_seen = receiver.borrow_and_update().bootstraps;
        // The sender lives in `self`, so the channel cannot close while we wait.
        if receiver
            .wait_for(|state| state.satisfies(threshold, bootstraps_seen))
            .await
            .is_err()
        {
            debug!(threshold, "readiness gate closed while waiting");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn wait_returns_immediately_after_threshold_reported() -> anyhow::Result<()> {
        let gate = ReadinessGate::new();
        gate.report_node_count(12);
        timeout(WAIT, gate.wait(10)).await?;
        assert_eq!(gate.node_count(), 12);
        Ok(())
    }

    #[tokio::test]
    async fn bootstrap_releases_waiter_without_nodes() -> anyhow::Result<()> {
        let gate = Arc::new(ReadinessGate::new());
        let waiter = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.wait(10).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        gate.report_bootstrap_complete();
        timeout(WAIT, waiter).await??;
        assert!(!gate.is_ready(10));
        Ok(())
    }

    #[tokio::test]
    async fn earlier_bootstrap_does_not_release_later_waits() -> anyhow::Result<()> {
        let gate = Arc::new(ReadinessGate::new());
        gate.report_bootstrap_complete();

        let waiter = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.wait(10).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        gate.report_node_count(10);
        timeout(WAIT, waiter).await??;
        Ok(())
    }

    #[tokio::test]
    async fn waiter_wakes_once_enough_nodes_arrive() -> anyhow::Result<()> {
        let gate = Arc::new(ReadinessGate::new());
        let waiter = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move { gate.wait(10).await }
        });

        gate.report_node_count(4);
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        gate.report_node_count(10);
        timeout(WAIT, waiter).await??;
        Ok(())
    }

    #[tokio::test]
    async fn high_water_mark_keeps_threshold_satisfied() -> anyhow::Result<()> {
        let gate = ReadinessGate::new();
        gate.report_node_count(15);
        gate.report_node_count(2);

        assert_eq!(gate.node_count(), 2);
        assert!(gate.is_ready(15));
        assert!(!gate.is_ready(16));
        timeout(WAIT, gate.wait(15)).await?;
        Ok(())
    }

    #[tokio::test]
    async fn release_unblocks_waiters_without_readiness() -> anyhow::Result<()> {
        let gate = ReadinessGate::new();
        gate.release();
        timeout(WAIT, gate.wait(10)).await?;
        assert!(!gate.is_ready(10));
        Ok(())
    }
}
