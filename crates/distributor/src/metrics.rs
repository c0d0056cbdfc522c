// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The exported metrics surface.
//!
//! Names, labels, and kinds here are a stable surface (see the
//! configuration/metrics section of the design doc) — do not rename them
//! in a routine refactor.

use prometheus::{HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

use crate::error::DistributorError;

pub struct DistributorMetrics {
    pub query_duration_seconds: HistogramVec,
    pub received_samples_total: IntCounter,
    pub send_duration_seconds: HistogramVec,
    pub ingester_appends_total: IntCounterVec,
    pub ingester_append_failures_total: IntCounterVec,
    pub ingester_queries_total: IntCounterVec,
    pub ingester_query_failures_total: IntCounterVec,
    pub ingester_clients: IntGauge,
}

impl DistributorMetrics {
    /// Registers every distributor metric against `registry`.
    pub fn register(registry: &Registry) -> Result<Self, DistributorError> {
        let query_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "cortex_distributor_query_duration_seconds",
                "Time spent executing one distributor query.",
            ),
            &["method", "status_code"],
        )
        .map_err(wrap)?;

        let received_samples_total = IntCounter::new(
            "cortex_distributor_received_samples_total",
            "Samples received by the distributor, before replication.",
        )
        .map_err(wrap)?;

        let send_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "cortex_distributor_send_duration_seconds",
                "Time spent sending one sub-batch to an ingester.",
            ),
            &["method", "status_code"],
        )
        .map_err(wrap)?;

        let ingester_appends_total = IntCounterVec::new(
            Opts::new(
                "cortex_distributor_ingester_appends_total",
                "Attempted sub-batch sends, one per (ingester, sub-batch).",
            ),
            &["ingester"],
        )
        .map_err(wrap)?;

        let ingester_append_failures_total = IntCounterVec::new(
            Opts::new(
                "cortex_distributor_ingester_append_failures_total",
                "Sub-batch sends that returned an error.",
            ),
            &["ingester"],
        )
        .map_err(wrap)?;

        let ingester_queries_total = IntCounterVec::new(
            Opts::new(
                "cortex_distributor_ingester_queries_total",
                "Attempted per-replica queries.",
            ),
            &["ingester"],
        )
        .map_err(wrap)?;

        let ingester_query_failures_total = IntCounterVec::new(
            Opts::new(
                "cortex_distributor_ingester_query_failures_total",
                "Per-replica queries that returned an error.",
            ),
            &["ingester"],
        )
        .map_err(wrap)?;

        let ingester_clients = IntGauge::new(
            "cortex_distributor_ingester_clients",
            "Pooled ingester client connections, computed on scrape.",
        )
        .map_err(wrap)?;

        registry
            .register(Box::new(query_duration_seconds.clone()))
            .map_err(wrap)?;
        registry
            .register(Box::new(received_samples_total.clone()))
            .map_err(wrap)?;
        registry
            .register(Box::new(send_duration_seconds.clone()))
            .map_err(wrap)?;
        registry
            .register(Box::new(ingester_appends_total.clone()))
            .map_err(wrap)?;
        registry
            .register(Box::new(ingester_append_failures_total.clone()))
            .map_err(wrap)?;
        registry
            .register(Box::new(ingester_queries_total.clone()))
            .map_err(wrap)?;
        registry
            .register(Box::new(ingester_query_failures_total.clone()))
            .map_err(wrap)?;
        registry
            .register(Box::new(ingester_clients.clone()))
            .map_err(wrap)?;

        Ok(Self {
            query_duration_seconds,
            received_samples_total,
            send_duration_seconds,
            ingester_appends_total,
            ingester_append_failures_total,
            ingester_queries_total,
            ingester_query_failures_total,
            ingester_clients,
        })
    }
}

fn wrap(err: prometheus::Error) -> DistributorError {
    DistributorError::ConfigInvalid(format!("metrics registration failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_every_metric_without_name_collisions() {
        let registry = Registry::new();
        let metrics = DistributorMetrics::register(&registry).unwrap();
        metrics.received_samples_total.inc_by(3);
        assert_eq!(metrics.received_samples_total.get(), 3);

        metrics
            .ingester_appends_total
            .with_label_values(&["10.0.0.1:9095"])
            .inc();
        assert_eq!(
            metrics
                .ingester_appends_total
                .with_label_values(&["10.0.0.1:9095"])
                .get(),
            1
        );
    }

    #[test]
    fn two_independent_registries_do_not_collide() {
        let a = Registry::new();
        let b = Registry::new();
        assert!(DistributorMetrics::register(&a).is_ok());
        assert!(DistributorMetrics::register(&b).is_ok());
    }
}
