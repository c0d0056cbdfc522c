// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-tenant ingestion admission control.
//!
//! Each tenant gets its own token bucket (rate = samples/sec, burst =
//! samples). The bucket is created lazily on first write and, per the
//! documented limitation in the design notes, is never evicted here — a
//! churning tenant population grows this registry without bound. A future
//! reimplementation should attach a last-access time and prune it from the
//! maintenance loop; this crate does not change the admission semantics to
//! work around that.

use dashmap::DashMap;
use governor::{Quota, RateLimiter as GovernorLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectLimiter = GovernorLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Registry of per-tenant token buckets.
pub struct RateLimiterRegistry {
    rate: NonZeroU32,
    burst: NonZeroU32,
    buckets: DashMap<String, Arc<DirectLimiter>>,
}

impl RateLimiterRegistry {
    pub fn new(rate_per_sec: u32, burst: u32) -> Self {
        Self {
            rate: NonZeroU32::new(rate_per_sec.max(1)).expect("clamped to at least 1"),
            burst: NonZeroU32::new(burst.max(1)).expect("clamped to at least 1"),
            buckets: DashMap::new(),
        }
    }

    fn bucket_for(&self, tenant_id: &str) -> Arc<DirectLimiter> {
        self.buckets
            .entry(tenant_id.to_string())
            .or_insert_with(|| {
                let quota = Quota::per_second(self.rate).allow_burst(self.burst);
                Arc::new(GovernorLimiter::direct(quota))
            })
            .clone()
    }

    /// Atomically checks out `n` tokens for `tenant_id`. All-or-nothing: a
    /// denial leaves the bucket untouched.
    pub fn admit(&self, tenant_id: &str, n: u32) -> bool {
        let Some(n) = NonZeroU32::new(n) else {
            return true; // zero samples always admitted
        };
        matches!(self.bucket_for(tenant_id).check_n(n), Ok(Ok(())))
    }

    /// Number of tenants with a bucket in the registry.
    pub fn tenant_count(&self) -> usize {
        self.buckets.len()
    }
}
