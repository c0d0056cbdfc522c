// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The ingester client pool.
//!
//! Caches one long-lived connection per ingester address. A client lives
//! from first use of an address present in the ring until the address
//! disappears from the ring for one maintenance tick, at which point its
//! connection is closed off-lock (see [`ClientPool::prune_absent`]).

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::DistributorError;
use crate::rpc::IngesterRpc;

/// Builds a new [`IngesterRpc`] handle for an address on a pool miss.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn dial(
        &self,
        address: &str,
        remote_timeout: Duration,
    ) -> Result<Arc<dyn IngesterRpc>, DistributorError>;
}

/// At most one pooled client exists per ingester address at any time.
pub struct ClientPool<F: ClientFactory> {
    factory: F,
    remote_timeout: Duration,
    clients: RwLock<HashMap<String, Arc<dyn IngesterRpc>>>,
}

impl<F: ClientFactory> ClientPool<F> {
    pub fn new(factory: F, remote_timeout: Duration) -> Self {
        Self {
            factory,
            remote_timeout,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a pooled client for `address`, dialing on a miss.
    ///
    /// Concurrent misses for the same address dial at most once: the fast
    /// path takes a read lock, and a miss re-checks under a write lock
    /// before dialing (the double-check that makes the dial itself
    /// exclusive across callers).
    pub async fn get(&self, address: &str) -> Result<Arc<dyn IngesterRpc>, DistributorError> {
        if let Some(client) = self.clients.read().await.get(address) {
            return Ok(client.clone());
        }

        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get(address) {
            return Ok(client.clone());
        }

        let client = self.factory.dial(address, self.remote_timeout).await?;
        clients.insert(address.to_string(), client.clone());
        Ok(client)
    }

    /// Removes any pooled entry whose address is not in `live_addresses`.
    ///
    /// Connection close is dispatched on a spawned task so it cannot block
    /// the pool lock.
    pub async fn prune_absent(&self, live_addresses: &HashSet<String>) {
        let evicted: Vec<Arc<dyn IngesterRpc>> = {
            let mut clients = self.clients.write().await;
            let stale: Vec<String> = clients
                .keys()
                .filter(|addr| !live_addresses.contains(*addr))
                .cloned()
                .collect();
            stale
                .into_iter()
                .filter_map(|addr| clients.remove(&addr))
                .collect()
        };

        for client in evicted {
            tokio::spawn(async move {
                client.close().await;
            });
        }
    }

    /// Number of pooled clients, backing the `ingester_clients` gauge.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}
