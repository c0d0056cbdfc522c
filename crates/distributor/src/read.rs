// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The read coordinator: single-key queries and broadcast reads.
//!
//! Unlike the write path, every fan-out here drains into exactly one
//! consumer loop (the awaiting caller's task), so the per-replica error
//! count and success count are plain local counters rather than atomics —
//! there is only ever one reader, so there is nothing to race.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::config::DistributorConfig;
use crate::error::DistributorError;
use crate::hashing::token_for;
use crate::merge::merge_samples;
use crate::metrics::DistributorMetrics;
use crate::pool::{ClientFactory, ClientPool};
use crate::ring::RingView;
use crate::rpc::{extract_metric_name_from_matchers, sum_user_stats, Matcher, QueryRequest, UserStats};
use crate::tenant::RequestContext;
use crate::types::{min_success, Matrix, Operation, SampleStream};

pub struct ReadCoordinator<R, F>
where
    R: RingView,
    F: ClientFactory,
{
    config: DistributorConfig,
    ring: Arc<R>,
    pool: Arc<ClientPool<F>>,
    metrics: Arc<DistributorMetrics>,
}

impl<R, F> ReadCoordinator<R, F>
where
    R: RingView + 'static,
    F: ClientFactory + 'static,
{
    pub fn new(
        config: DistributorConfig,
        ring: Arc<R>,
        pool: Arc<ClientPool<F>>,
        metrics: Arc<DistributorMetrics>,
    ) -> Self {
        Self {
            config,
            ring,
            pool,
            metrics,
        }
    }

    /// Single-key query: fan out to the token's replica set, merge the
    /// first `minSuccess` successful responses by series fingerprint.
    pub async fn query(
        &self,
        ctx: &RequestContext,
        from_ms: i64,
        to_ms: i64,
        matchers: Vec<Matcher>,
    ) -> Result<Matrix, DistributorError> {
        let tenant = ctx.tenant()?;
        let metric_name = extract_metric_name_from_matchers(&matchers)
            .ok_or(DistributorError::MissingMetricName)?;
        let token = token_for(tenant.as_bytes(), metric_name);

        let lookup_started = Instant::now();
        let replicas = self
            .ring
            .get(token, self.config.replication_factor, Operation::Read)
            .await;
        let status = if replicas.is_ok() { "success" } else { "error" };
        self.metrics
            .query_duration_seconds
            .with_label_values(&["ring-lookup", status])
            .observe(lookup_started.elapsed().as_secs_f64());
        let replicas = replicas?;

        let n = replicas.len();
        let min_s = min_success(n);
        if n < min_s {
            return Err(DistributorError::InsufficientReplicas {
                needed: min_s,
                available: n,
            });
        }
        let max_errs = n - min_s;

        let (tx, mut rx) = mpsc::unbounded_channel::<Result<Matrix, DistributorError>>();
        for replica in &replicas {
            let pool = self.pool.clone();
            let metrics = self.metrics.clone();
            let tx = tx.clone();
            let request = QueryRequest {
                from_ms,
                to_ms,
                matchers: matchers.clone(),
            };
            let address = replica.address.clone();
            tokio::spawn(async move {
                metrics
                    .ingester_queries_total
                    .with_label_values(&[&address])
                    .inc();
                let started = Instant::now();
                let outcome = match pool.get(&address).await {
                    Ok(client) => client.query(request).await,
                    Err(e) => Err(e),
                };
                let status = if outcome.is_ok() { "success" } else { "error" };
                metrics
                    .send_duration_seconds
                    .with_label_values(&["Query", status])
                    .observe(started.elapsed().as_secs_f64());
                if outcome.is_err() {
                    metrics
                        .ingester_query_failures_total
                        .with_label_values(&[&address])
                        .inc();
                }
                let _ = tx.send(outcome);
            });
        }
        drop(tx);

        let mut merged: HashMap<u64, SampleStream> = HashMap::new();
        let mut received = 0usize;
        let mut err_count = 0usize;

        while received < min_s {
            let msg = tokio::select! {
                _ = ctx.cancelled() => return Err(DistributorError::Cancelled),
                msg = rx.recv() => msg,
            };
            match msg {
                Some(Ok(matrix)) => {
                    received += 1;
                    for stream in matrix.streams {
                        match merged.get_mut(&stream.fingerprint) {
                            Some(existing) => merge_samples(&mut existing.samples, &stream.samples),
                            None => {
                                merged.insert(stream.fingerprint, stream);
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    err_count += 1;
                    // The (max_errs + 1)-th error aborts the wait; results
                    // arriving after this point are never read.
                    if err_count > max_errs {
                        return Err(e);
                    }
                }
                None => break,
            }
        }

        if received < min_s {
            return Err(DistributorError::InsufficientReplicas {
                needed: min_s,
                available: received,
            });
        }

        Ok(Matrix {
            streams: merged.into_values().collect(),
        })
    }

    fn broadcast_tolerance(&self) -> usize {
        self.config.replication_factor / 2
    }

    /// Union of string sets returned by every ring member, tolerating up
    /// to `⌊RF/2⌋` errors.
    pub async fn label_values(
        &self,
        ctx: &RequestContext,
        label_name: &str,
    ) -> Result<Vec<String>, DistributorError> {
        let _tenant = ctx.tenant()?;
        let members = self.ring.get_all().await?;
        let max_errs = self.broadcast_tolerance();

        let (tx, mut rx) = mpsc::unbounded_channel::<Result<Vec<String>, DistributorError>>();
        for member in &members {
            let pool = self.pool.clone();
            let metrics = self.metrics.clone();
            let tx = tx.clone();
            let address = member.address.clone();
            let label_name = label_name.to_string();
            tokio::spawn(async move {
                metrics
                    .ingester_queries_total
                    .with_label_values(&[&address])
                    .inc();
                let outcome = match pool.get(&address).await {
                    Ok(client) => client.label_values(&label_name).await,
                    Err(e) => Err(e),
                };
                if outcome.is_err() {
                    metrics
                        .ingester_query_failures_total
                        .with_label_values(&[&address])
                        .inc();
                }
                let _ = tx.send(outcome);
            });
        }
        drop(tx);

        let mut union: BTreeSet<String> = BTreeSet::new();
        drain_broadcast(ctx, members.len(), max_errs, &mut rx, |values| union.extend(values)).await?;
        Ok(union.into_iter().collect())
    }

    /// Union of metrics (keyed by series fingerprint, last-writer-wins on
    /// collision) returned by every ring member.
    pub async fn metrics_for_label_matchers(
        &self,
        ctx: &RequestContext,
        from_ms: i64,
        to_ms: i64,
        matchers: Vec<Matcher>,
    ) -> Result<Matrix, DistributorError> {
        let _tenant = ctx.tenant()?;
        let members = self.ring.get_all().await?;
        let max_errs = self.broadcast_tolerance();

        let (tx, mut rx) = mpsc::unbounded_channel::<Result<Matrix, DistributorError>>();
        for member in &members {
            let pool = self.pool.clone();
            let metrics = self.metrics.clone();
            let tx = tx.clone();
            let request = QueryRequest {
                from_ms,
                to_ms,
                matchers: matchers.clone(),
            };
            let address = member.address.clone();
            tokio::spawn(async move {
                metrics
                    .ingester_queries_total
                    .with_label_values(&[&address])
                    .inc();
                let outcome = match pool.get(&address).await {
                    Ok(client) => client.metrics_for_label_matchers(request).await,
                    Err(e) => Err(e),
                };
                if outcome.is_err() {
                    metrics
                        .ingester_query_failures_total
                        .with_label_values(&[&address])
                        .inc();
                }
                let _ = tx.send(outcome);
            });
        }
        drop(tx);

        let mut by_fingerprint: HashMap<u64, SampleStream> = HashMap::new();
        drain_broadcast(ctx, members.len(), max_errs, &mut rx, |matrix: Matrix| {
            for stream in matrix.streams {
                by_fingerprint.insert(stream.fingerprint, stream);
            }
        })
        .await?;

        Ok(Matrix {
            streams: by_fingerprint.into_values().collect(),
        })
    }

    /// Componentwise sum of per-ingester stats, divided by the
    /// replication factor to recover the per-tenant estimate.
    pub async fn user_stats(&self, ctx: &RequestContext) -> Result<UserStats, DistributorError> {
        let _tenant = ctx.tenant()?;
        let members = self.ring.get_all().await?;
        let max_errs = self.broadcast_tolerance();

        let (tx, mut rx) = mpsc::unbounded_channel::<Result<UserStats, DistributorError>>();
        for member in &members {
            let pool = self.pool.clone();
            let metrics = self.metrics.clone();
            let tx = tx.clone();
            let address = member.address.clone();
            tokio::spawn(async move {
                metrics
                    .ingester_queries_total
                    .with_label_values(&[&address])
                    .inc();
                let outcome = match pool.get(&address).await {
                    Ok(client) => client.user_stats().await,
                    Err(e) => Err(e),
                };
                if outcome.is_err() {
                    metrics
                        .ingester_query_failures_total
                        .with_label_values(&[&address])
                        .inc();
                }
                let _ = tx.send(outcome);
            });
        }
        drop(tx);

        let mut collected: Vec<UserStats> = Vec::with_capacity(members.len());
        drain_broadcast(ctx, members.len(), max_errs, &mut rx, |stats| collected.push(stats)).await?;
        Ok(sum_user_stats(&collected, self.config.replication_factor))
    }
}

/// Drains a broadcast fan-out's result channel, applying `accumulate` to
/// every success and tolerating up to `max_errs` failures. Returns the
/// `(max_errs + 1)`-th error if the tolerance is exceeded, or
/// [`DistributorError::Cancelled`] if `ctx` is cancelled before the fan-out
/// finishes.
async fn drain_broadcast<T>(
    ctx: &RequestContext,
    total: usize,
    max_errs: usize,
    rx: &mut mpsc::UnboundedReceiver<Result<T, DistributorError>>,
    mut accumulate: impl FnMut(T),
) -> Result<(), DistributorError> {
    let mut received = 0usize;
    let mut err_count = 0usize;
    while received + err_count < total {
        let msg = tokio::select! {
            _ = ctx.cancelled() => return Err(DistributorError::Cancelled),
            msg = rx.recv() => msg,
        };
        match msg {
            Some(Ok(value)) => {
                received += 1;
                accumulate(value);
            }
            Some(Err(e)) => {
                err_count += 1;
                if err_count > max_errs {
                    return Err(e);
                }
            }
            None => break,
        }
    }
    Ok(())
}
