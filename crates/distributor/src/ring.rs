// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The ring membership service.
//!
//! Ring membership and gossip are delegated entirely outside this crate
//! (see the crate-level Non-goals); this module only defines the contract
//! the write/read coordinators consume, plus an in-memory test double used
//! throughout the rest of the test suite.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::DistributorError;
use crate::types::{IngesterDescriptor, Operation, ReplicaSet};

/// Replica lookup, ring enumeration, and liveness metadata.
#[async_trait]
pub trait RingView: Send + Sync {
    /// Replica set owning `token` for `op`, ring order, length ≤ `n`.
    async fn get(&self, token: u32, n: usize, op: Operation) -> Result<ReplicaSet, DistributorError>;

    /// Batched form of [`RingView::get`], one replica set per input token.
    async fn batch_get(
        &self,
        tokens: &[u32],
        n: usize,
        op: Operation,
    ) -> Result<Vec<ReplicaSet>, DistributorError>;

    /// All ingesters currently known to the ring.
    async fn get_all(&self) -> Result<Vec<IngesterDescriptor>, DistributorError>;
}

/// A fixed-membership ring used by tests.
///
/// It has no consistent-hash logic of its own: every lookup returns the
/// first `n` members of a fixed, caller-supplied list. That is sufficient
/// to exercise the write/read coordination core, which never depends on
/// *which* ring algorithm placed a token, only on the replica set it gets
/// back.
#[derive(Debug)]
pub struct StaticRing {
    members: RwLock<Vec<IngesterDescriptor>>,
}

impl StaticRing {
    pub fn new(members: Vec<IngesterDescriptor>) -> Self {
        Self {
            members: RwLock::new(members),
        }
    }

    /// Replace the member list, e.g. to simulate an ingester leaving.
    pub async fn set_members(&self, members: Vec<IngesterDescriptor>) {
        *self.members.write().await = members;
    }
}

#[async_trait]
impl RingView for StaticRing {
    async fn get(&self, _token: u32, n: usize, _op: Operation) -> Result<ReplicaSet, DistributorError> {
        let members = self.members.read().await;
        Ok(members.iter().take(n).cloned().collect())
    }

    async fn batch_get(
        &self,
        tokens: &[u32],
        n: usize,
        op: Operation,
    ) -> Result<Vec<ReplicaSet>, DistributorError> {
        let mut out = Vec::with_capacity(tokens.len());
        for &token in tokens {
            out.push(self.get(token, n, op).await?);
        }
        Ok(out)
    }

    async fn get_all(&self) -> Result<Vec<IngesterDescriptor>, DistributorError> {
        Ok(self.members.read().await.clone())
    }
}
