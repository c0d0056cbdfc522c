// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Distributor error taxonomy.
//!
//! Every variant here is surfaced to the caller as-is: this crate never
//! retries a failed operation internally (see the write/read coordinators).

use thiserror::Error;

/// Errors produced by the write and read coordination core.
#[derive(Debug, Error, Clone)]
pub enum DistributorError {
    #[error("no tenant on the call context")]
    Unauthenticated,

    #[error("series is missing the metric name label")]
    MissingMetricName,

    #[error("tenant {tenant} exceeded its ingestion rate limit")]
    RateLimited { tenant: String },

    #[error("insufficient replicas: needed {needed}, had {available} live")]
    InsufficientReplicas { needed: usize, available: usize },

    #[error("ring lookup failed: {0}")]
    RingLookupFailed(String),

    #[error("ingester {address} returned an error: {message}")]
    UpstreamRpcError { address: String, message: String },

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("request cancelled before quorum was reached")]
    Cancelled,
}
