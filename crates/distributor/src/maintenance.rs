// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The client-pool maintenance loop.
//!
//! Construction does not start anything: a caller explicitly calls
//! `start()` to get a handle, and `stop()` on that handle to tear the
//! background task down. Teardown is idempotent, the same shape as the
//! reference router's own shutdown handle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::metrics::DistributorMetrics;
use crate::pool::{ClientFactory, ClientPool};
use crate::ring::RingView;

/// Periodically prunes the client pool against the ring's live address set.
pub struct MaintenanceLoop<R, F>
where
    R: RingView,
    F: ClientFactory,
{
    pool: Arc<ClientPool<F>>,
    ring: Arc<R>,
    metrics: Arc<DistributorMetrics>,
    period: Duration,
}

impl<R, F> MaintenanceLoop<R, F>
where
    R: RingView + 'static,
    F: ClientFactory + 'static,
{
    pub fn new(
        pool: Arc<ClientPool<F>>,
        ring: Arc<R>,
        metrics: Arc<DistributorMetrics>,
        period: Duration,
    ) -> Self {
        Self {
            pool,
            ring,
            metrics,
            period,
        }
    }

    /// Spawns the background task and returns a handle to stop it.
    pub fn start(self) -> MaintenanceHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            // The first tick fires immediately; skip it so the loop's
            // first real prune happens after one full period.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.ring.get_all().await {
                            Ok(members) => {
                                let addresses = members.into_iter().map(|m| m.address).collect();
                                self.pool.prune_absent(&addresses).await;
                                debug!("maintenance tick: pruned client pool");
                            }
                            Err(e) => warn!(error = %e, "maintenance tick: ring lookup failed"),
                        }
                        self.metrics.ingester_clients.set(self.pool.client_count().await as i64);
                    }
                    _ = shutdown_rx.changed() => {
                        break;
                    }
                }
            }
            let _ = done_tx.send(true);
        });

        MaintenanceHandle {
            shutdown_tx,
            done_rx,
        }
    }
}

/// Handle to a running [`MaintenanceLoop`].
pub struct MaintenanceHandle {
    shutdown_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl MaintenanceHandle {
    /// Signals shutdown and waits for the task to acknowledge it. Calling
    /// this more than once is harmless: the second call observes the
    /// already-true `done` state and returns immediately.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let mut done_rx = self.done_rx.clone();
        let _ = done_rx.wait_for(|done| *done).await;
    }
}
