// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Distributor — stateless write/read router for a sharded, multi-tenant
//! time-series store.
//!
//! Routes incoming samples to the ingesters that own them by consistent
//! hashing on `(tenant, metric name)`, waits for write quorum across each
//! sample's replica set, and merges read quorum responses by series
//! fingerprint. Ring membership, the wire schema, and persistent storage
//! are all owned by other components; this crate is the stateless
//! coordination layer between them.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use distributor::clock::SystemClock;
//! use distributor::config::DistributorConfig;
//! use distributor::limiter::RateLimiterRegistry;
//! use distributor::metrics::DistributorMetrics;
//! use distributor::pool::ClientPool;
//! use distributor::ring::StaticRing;
//! use distributor::write::WriteCoordinator;
//!
//! # fn build<F: distributor::pool::ClientFactory + 'static>(factory: F) {
//! let config = DistributorConfig::default();
//! let ring = Arc::new(StaticRing::new(Vec::new()));
//! let pool = Arc::new(ClientPool::new(factory, config.remote_timeout()));
//! let limiter = Arc::new(RateLimiterRegistry::new(
//!     config.ingestion_rate_limit,
//!     config.ingestion_burst_size,
//! ));
//! let metrics = Arc::new(DistributorMetrics::register(&prometheus::Registry::new()).unwrap());
//! let _write = WriteCoordinator::new(config, ring, pool, limiter, metrics, Arc::new(SystemClock));
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod hashing;
pub mod limiter;
pub mod maintenance;
pub mod merge;
pub mod metrics;
pub mod pool;
pub mod read;
pub mod ring;
pub mod rpc;
pub mod tenant;
pub mod types;
pub mod write;

pub use config::DistributorConfig;
pub use error::DistributorError;
pub use maintenance::{MaintenanceHandle, MaintenanceLoop};
pub use read::ReadCoordinator;
pub use write::WriteCoordinator;
