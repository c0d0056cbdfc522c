// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The write coordinator: the central algorithm of this crate.
//!
//! Flattens a request into per-sample trackers, looks up replica sets,
//! gates on the rate limiter, and fans out one worker per `(ingester,
//! sub-batch)` pair. Quorum is tracked per sample with atomic
//! fetch-and-add counters; exactly one worker crosses each per-sample and
//! per-request threshold, which is what lets the done/error signals be
//! single-use without a coordinating lock between workers (see the design
//! notes on the atomic-crossing-threshold pattern).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use tokio::sync::oneshot;

use crate::clock::Clock;
use crate::config::DistributorConfig;
use crate::error::DistributorError;
use crate::hashing::token_for_labels;
use crate::limiter::RateLimiterRegistry;
use crate::metrics::DistributorMetrics;
use crate::pool::{ClientFactory, ClientPool};
use crate::ring::RingView;
use crate::tenant::RequestContext;
use crate::types::{min_success, LabelPair, Operation, Sample, TimeSeries, WriteRequest};

struct SampleTracker {
    labels: Vec<LabelPair>,
    sample: Sample,
    min_success: usize,
    max_failures: usize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

struct PushTracker {
    samples_pending: AtomicUsize,
    samples_failed: AtomicUsize,
    done_tx: StdMutex<Option<oneshot::Sender<()>>>,
    err_tx: StdMutex<Option<oneshot::Sender<DistributorError>>>,
}

impl PushTracker {
    /// Applies the failure rule to every tracker in a sub-batch. Exactly
    /// one worker, across the whole request, will find
    /// `samples_failed` crossing from 0 to 1 and send the error.
    fn record_failure(&self, subbatch: &[Arc<SampleTracker>], err: &DistributorError) {
        for tracker in subbatch {
            let failed = tracker.failed.fetch_add(1, Ordering::SeqCst) + 1;
            if failed > tracker.max_failures {
                let crossed = self.samples_failed.fetch_add(1, Ordering::SeqCst) + 1;
                if crossed == 1 {
                    if let Some(tx) = self.err_tx.lock().unwrap().take() {
                        let _ = tx.send(err.clone());
                    }
                }
            }
        }
    }

    /// Applies the success rule to every tracker in a sub-batch. Exactly
    /// one worker finds `samples_pending` reaching zero and sends `done`.
    fn record_success(&self, subbatch: &[Arc<SampleTracker>]) {
        for tracker in subbatch {
            let succeeded = tracker.succeeded.fetch_add(1, Ordering::SeqCst) + 1;
            if succeeded == tracker.min_success {
                let remaining = self.samples_pending.fetch_sub(1, Ordering::SeqCst) - 1;
                if remaining == 0 {
                    if let Some(tx) = self.done_tx.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                }
            }
        }
    }
}

/// Flattens a write request and dispatches it via quorum-tracked fan-out.
pub struct WriteCoordinator<R, F>
where
    R: RingView,
    F: ClientFactory,
{
    config: DistributorConfig,
    ring: Arc<R>,
    pool: Arc<ClientPool<F>>,
    limiter: Arc<RateLimiterRegistry>,
    metrics: Arc<DistributorMetrics>,
    clock: Arc<dyn Clock>,
}

impl<R, F> WriteCoordinator<R, F>
where
    R: RingView + 'static,
    F: ClientFactory + 'static,
{
    pub fn new(
        config: DistributorConfig,
        ring: Arc<R>,
        pool: Arc<ClientPool<F>>,
        limiter: Arc<RateLimiterRegistry>,
        metrics: Arc<DistributorMetrics>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            ring,
            pool,
            limiter,
            metrics,
            clock,
        }
    }

    pub async fn push(
        &self,
        ctx: &RequestContext,
        request: WriteRequest,
    ) -> Result<(), DistributorError> {
        // Stage 1: tenant extraction.
        let tenant = ctx.tenant()?;

        // Stage 2: flatten & tokenize.
        let mut trackers: Vec<Arc<SampleTracker>> = Vec::new();
        let mut keys: Vec<u32> = Vec::new();
        for series in &request.timeseries {
            let token = token_for_labels(tenant.as_bytes(), &series.labels)?;
            for &sample in &series.samples {
                trackers.push(Arc::new(SampleTracker {
                    labels: series.labels.clone(),
                    sample,
                    min_success: 0,
                    max_failures: 0,
                    succeeded: AtomicUsize::new(0),
                    failed: AtomicUsize::new(0),
                }));
                keys.push(token);
            }
        }

        self.metrics
            .received_samples_total
            .inc_by(trackers.len() as u64);

        if trackers.is_empty() {
            return Ok(());
        }

        // Stage 3: admission. All-or-nothing over the whole request.
        if !self.limiter.admit(tenant.as_str(), trackers.len() as u32) {
            return Err(DistributorError::RateLimited {
                tenant: tenant.to_string(),
            });
        }

        // Stage 4: replica lookup.
        let lookup_started = Instant::now();
        let replica_sets = self
            .ring
            .batch_get(&keys, self.config.replication_factor, Operation::Write)
            .await;
        let status = if replica_sets.is_ok() { "success" } else { "error" };
        self.metrics
            .query_duration_seconds
            .with_label_values(&["ring-lookup", status])
            .observe(lookup_started.elapsed().as_secs_f64());
        let replica_sets = replica_sets?;

        // Stage 5: per-sample thresholds and liveness filter.
        let now = self.clock.now_unix_secs();
        let heartbeat_timeout = self.config.heartbeat_timeout();
        let mut pivot: HashMap<String, Vec<Arc<SampleTracker>>> = HashMap::new();

        for (tracker, replica_set) in trackers.iter().zip(replica_sets.iter()) {
            let n = replica_set.len();
            let min_s = min_success(n);
            let max_f = n - min_s;

            // Thresholds are computed from the unfiltered replica-set size
            // (dead-replica accounting: a stale replica counts as a
            // failure, not as absent) and baked into a fresh tracker below
            // — the stub pushed in stage 2 carried no threshold yet.
            let live: Vec<_> = replica_set
                .iter()
                .filter(|d| d.is_live(now, heartbeat_timeout))
                .collect();

            if live.len() < min_s {
                return Err(DistributorError::InsufficientReplicas {
                    needed: min_s,
                    available: live.len(),
                });
            }

            let finalized = Arc::new(SampleTracker {
                labels: tracker.labels.clone(),
                sample: tracker.sample,
                min_success: min_s,
                max_failures: max_f,
                succeeded: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
            });

            for replica in live {
                pivot
                    .entry(replica.address.clone())
                    .or_default()
                    .push(finalized.clone());
            }
        }

        // Stage 7: dispatch.
        let (done_tx, mut done_rx) = oneshot::channel();
        let (err_tx, mut err_rx) = oneshot::channel();
        let push_tracker = Arc::new(PushTracker {
            samples_pending: AtomicUsize::new(trackers.len()),
            samples_failed: AtomicUsize::new(0),
            done_tx: StdMutex::new(Some(done_tx)),
            err_tx: StdMutex::new(Some(err_tx)),
        });

        for (address, subbatch) in pivot {
            let pool = self.pool.clone();
            let metrics = self.metrics.clone();
            let push_tracker = push_tracker.clone();
            tokio::spawn(async move {
                dispatch_subbatch(pool, metrics, push_tracker, address, subbatch).await;
            });
        }

        // Stage 8: result selection. Whichever fires first wins; late
        // workers may still run, but their updates touch already-decided
        // trackers and nobody reads those counters again. A dead replica
        // plus a live-replica error can leave a sample permanently short of
        // both `min_success` and `max_failures` — quorum becomes
        // unreachable but nothing ever signals that, so the cancellation
        // arm is what keeps this from hanging forever on that input.
        tokio::select! {
            res = &mut done_rx => match res {
                Ok(()) => Ok(()),
                Err(_) => Ok(()),
            },
            res = &mut err_rx => match res {
                Ok(err) => Err(err),
                Err(_) => Ok(()),
            },
            _ = ctx.cancelled() => Err(DistributorError::Cancelled),
        }
    }
}

async fn dispatch_subbatch<F: ClientFactory>(
    pool: Arc<ClientPool<F>>,
    metrics: Arc<DistributorMetrics>,
    push_tracker: Arc<PushTracker>,
    address: String,
    subbatch: Vec<Arc<SampleTracker>>,
) {
    metrics
        .ingester_appends_total
        .with_label_values(&[&address])
        .inc();

    let client = match pool.get(&address).await {
        Ok(client) => client,
        Err(e) => {
            metrics
                .ingester_append_failures_total
                .with_label_values(&[&address])
                .inc();
            push_tracker.record_failure(&subbatch, &e);
            return;
        }
    };

    // Each sample travels with its own label list: the sub-batch is not
    // re-grouped by label set.
    let wire_request = WriteRequest {
        timeseries: subbatch
            .iter()
            .map(|t| TimeSeries {
                labels: t.labels.clone(),
                samples: vec![t.sample],
            })
            .collect(),
    };

    let started = Instant::now();
    let result = client.push(wire_request).await;
    let status = if result.is_ok() { "success" } else { "error" };
    metrics
        .send_duration_seconds
        .with_label_values(&["Push", status])
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(()) => push_tracker.record_success(&subbatch),
        Err(e) => {
            metrics
                .ingester_append_failures_total
                .with_label_values(&[&address])
                .inc();
            push_tracker.record_failure(&subbatch, &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{IngesterRpc, QueryRequest, UserStats};
    use crate::tenant::{FixedTenant, TenantId};
    use crate::types::{IngesterDescriptor, Matrix};
    use async_trait::async_trait;
    use prometheus::Registry;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::time::Duration;

    struct ScriptedClient {
        address: String,
        outcomes: Arc<HashMap<String, DistributorError>>,
    }

    #[async_trait]
    impl IngesterRpc for ScriptedClient {
        async fn push(&self, _request: WriteRequest) -> Result<(), DistributorError> {
            match self.outcomes.get(&self.address) {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
        async fn query(&self, _request: QueryRequest) -> Result<Matrix, DistributorError> {
            Ok(Matrix::default())
        }
        async fn label_values(&self, _label_name: &str) -> Result<Vec<String>, DistributorError> {
            Ok(Vec::new())
        }
        async fn metrics_for_label_matchers(
            &self,
            _request: QueryRequest,
        ) -> Result<Matrix, DistributorError> {
            Ok(Matrix::default())
        }
        async fn user_stats(&self) -> Result<UserStats, DistributorError> {
            Ok(UserStats::default())
        }
    }

    struct ScriptedFactory {
        outcomes: Arc<HashMap<String, DistributorError>>,
        dial_count: Arc<StdAtomicUsize>,
    }

    #[async_trait]
    impl ClientFactory for ScriptedFactory {
        async fn dial(
            &self,
            address: &str,
            _remote_timeout: Duration,
        ) -> Result<Arc<dyn IngesterRpc>, DistributorError> {
            self.dial_count.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(ScriptedClient {
                address: address.to_string(),
                outcomes: self.outcomes.clone(),
            }))
        }
    }

    struct Harness {
        coordinator: WriteCoordinator<StaticRing, ScriptedFactory>,
        metrics: Arc<DistributorMetrics>,
        dial_count: Arc<StdAtomicUsize>,
    }

    use crate::ring::StaticRing;

    fn build(
        members: Vec<(&str, i64)>,
        outcomes: HashMap<String, DistributorError>,
        config: DistributorConfig,
    ) -> Harness {
        let descriptors = members
            .into_iter()
            .map(|(addr, heartbeat)| IngesterDescriptor::new(addr, heartbeat))
            .collect();
        let ring = Arc::new(StaticRing::new(descriptors));
        let dial_count = Arc::new(StdAtomicUsize::new(0));
        let factory = ScriptedFactory {
            outcomes: Arc::new(outcomes),
            dial_count: dial_count.clone(),
        };
        let pool = Arc::new(ClientPool::new(factory, Duration::from_secs(1)));
        let limiter = Arc::new(RateLimiterRegistry::new(
            config.ingestion_rate_limit,
            config.ingestion_burst_size,
        ));
        let metrics = Arc::new(DistributorMetrics::register(&Registry::new()).unwrap());
        let coordinator = WriteCoordinator::new(
            config,
            ring,
            pool,
            limiter,
            metrics.clone(),
            Arc::new(crate::clock::FixedClock(0)),
        );
        Harness {
            coordinator,
            metrics,
            dial_count,
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::fixed(Arc::new(FixedTenant(TenantId("tenant-a".into()))))
    }

    fn request_with_samples(series_count: usize, samples_per_series: usize) -> WriteRequest {
        WriteRequest {
            timeseries: (0..series_count)
                .map(|i| TimeSeries {
                    labels: vec![LabelPair::new("__name__", format!("metric_{i}"))],
                    samples: (0..samples_per_series)
                        .map(|j| Sample {
                            timestamp_ms: j as i64,
                            value: j as f64,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn s1_happy_path_all_replicas_ack() {
        let harness = build(
            vec![("a", 0), ("b", 0), ("c", 0)],
            HashMap::new(),
            DistributorConfig::default(),
        );
        let request = request_with_samples(2, 1);
        harness.coordinator.push(&ctx(), request).await.unwrap();

        assert_eq!(harness.metrics.received_samples_total.get(), 2);
        for addr in ["a", "b", "c"] {
            assert_eq!(
                harness
                    .metrics
                    .ingester_appends_total
                    .with_label_values(&[addr])
                    .get(),
                1
            );
        }
    }

    #[tokio::test]
    async fn s2_one_replica_down_quorum_from_unfiltered_size() {
        // C's heartbeat is far in the past: stale relative to the default
        // 60s timeout under FixedClock(0).
        let harness = build(
            vec![("a", 0), ("b", 0), ("c", -1000)],
            HashMap::new(),
            DistributorConfig::default(),
        );
        let request = request_with_samples(1, 1);
        harness.coordinator.push(&ctx(), request).await.unwrap();

        assert_eq!(
            harness
                .metrics
                .ingester_appends_total
                .with_label_values(&["c"])
                .get(),
            0
        );
    }

    #[tokio::test]
    async fn s3_two_replicas_down_fails_with_no_rpcs() {
        let harness = build(
            vec![("a", 0), ("b", -1000), ("c", -1000)],
            HashMap::new(),
            DistributorConfig::default(),
        );
        let request = request_with_samples(1, 1);
        let err = harness.coordinator.push(&ctx(), request).await.unwrap_err();
        assert!(matches!(err, DistributorError::InsufficientReplicas { .. }));
        assert_eq!(harness.dial_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn s4_one_replica_errors_quorum_still_reached() {
        let mut outcomes = HashMap::new();
        outcomes.insert(
            "c".to_string(),
            DistributorError::UpstreamRpcError {
                address: "c".into(),
                message: "boom".into(),
            },
        );
        let harness = build(
            vec![("a", 0), ("b", 0), ("c", 0)],
            outcomes,
            DistributorConfig::default(),
        );
        let request = request_with_samples(1, 1);
        harness.coordinator.push(&ctx(), request).await.unwrap();

        assert_eq!(
            harness
                .metrics
                .ingester_append_failures_total
                .with_label_values(&["c"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn s5_quorum_loss_returns_exactly_one_error() {
        let mut outcomes = HashMap::new();
        for addr in ["b", "c"] {
            outcomes.insert(
                addr.to_string(),
                DistributorError::UpstreamRpcError {
                    address: addr.into(),
                    message: "boom".into(),
                },
            );
        }
        let harness = build(
            vec![("a", 0), ("b", 0), ("c", 0)],
            outcomes,
            DistributorConfig::default(),
        );
        let request = request_with_samples(1, 1);
        let err = harness.coordinator.push(&ctx(), request).await.unwrap_err();
        assert!(matches!(err, DistributorError::UpstreamRpcError { .. }));

        assert_eq!(
            harness
                .metrics
                .ingester_append_failures_total
                .with_label_values(&["b"])
                .get()
                + harness
                    .metrics
                    .ingester_append_failures_total
                    .with_label_values(&["c"])
                    .get(),
            2
        );
    }

    #[tokio::test]
    async fn one_error_property_all_ingesters_fail_exactly_once() {
        let mut outcomes = HashMap::new();
        for addr in ["a", "b", "c"] {
            outcomes.insert(
                addr.to_string(),
                DistributorError::UpstreamRpcError {
                    address: addr.into(),
                    message: "boom".into(),
                },
            );
        }
        let harness = build(
            vec![("a", 0), ("b", 0), ("c", 0)],
            outcomes,
            DistributorConfig::default(),
        );
        let request = request_with_samples(1, 1);
        let err = harness.coordinator.push(&ctx(), request).await.unwrap_err();
        assert!(matches!(err, DistributorError::UpstreamRpcError { .. }));
    }

    #[tokio::test]
    async fn s6_rate_limit_rejects_before_any_rpc() {
        let config = DistributorConfig {
            ingestion_rate_limit: 10,
            ingestion_burst_size: 10,
            ..Default::default()
        };
        let harness = build(vec![("a", 0), ("b", 0), ("c", 0)], HashMap::new(), config);
        let request = request_with_samples(1, 11);
        let err = harness.coordinator.push(&ctx(), request).await.unwrap_err();
        assert!(matches!(err, DistributorError::RateLimited { .. }));
        assert_eq!(harness.dial_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_replica_plus_live_replica_error_is_unblocked_by_cancellation() {
        // RF=3, C stale: live={A,B}, min_success=2, max_failures=1 (both
        // computed from the unfiltered n=3). A acks, B errors: succeeded
        // stalls at 1 (< 2) and failed stalls at 1 (not > 1) — quorum can
        // no longer be reached either way. Without the cancellation arm
        // this never resolves; a cancelled context must still unblock it.
        let mut outcomes = HashMap::new();
        outcomes.insert(
            "b".to_string(),
            DistributorError::UpstreamRpcError {
                address: "b".into(),
                message: "boom".into(),
            },
        );
        let harness = build(
            vec![("a", 0), ("b", 0), ("c", -1000)],
            outcomes,
            DistributorConfig::default(),
        );
        let (ctx, canceller) = RequestContext::new(Arc::new(FixedTenant(TenantId("tenant-a".into()))));
        canceller.cancel();

        let request = request_with_samples(1, 1);
        let err = harness.coordinator.push(&ctx, request).await.unwrap_err();
        assert!(matches!(err, DistributorError::Cancelled));
    }

    fn run_quorum_case(rf: usize, failing: usize) -> Result<(), DistributorError> {
        let names: Vec<String> = (0..rf).map(|i| format!("n{i}")).collect();
        let members: Vec<(&str, i64)> = names.iter().map(|s| (s.as_str(), 0)).collect();
        let mut outcomes = HashMap::new();
        for &(addr, _) in members.iter().take(failing) {
            outcomes.insert(
                addr.to_string(),
                DistributorError::UpstreamRpcError {
                    address: addr.to_string(),
                    message: "boom".into(),
                },
            );
        }
        let harness = build(members, outcomes, DistributorConfig::default());
        let request = request_with_samples(1, 1);
        tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(harness.coordinator.push(&ctx(), request))
    }

    proptest::proptest! {
        #[test]
        fn quorum_correctness_property(rf in 1usize..=8, failing_fraction in 0.0f64..=1.0) {
            let failing = ((rf as f64) * failing_fraction).floor() as usize;
            let max_failures = rf - min_success(rf);
            let result = run_quorum_case(rf, failing);
            if failing <= max_failures {
                proptest::prop_assert!(result.is_ok());
            } else {
                proptest::prop_assert!(result.is_err());
            }
        }
    }
}
