// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The outgoing ingester RPC surface.
//!
//! The wire schema itself is externally defined and immutable (see the
//! crate-level Non-goals); this module only types the four unary calls the
//! write/read coordinators issue against a pooled client.

use async_trait::async_trait;

use crate::error::DistributorError;
use crate::types::{Matrix, WriteRequest};

/// How a [`Matcher`] compares a label's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    Equal,
    NotEqual,
    RegexMatch,
    RegexNoMatch,
}

/// One label matcher in a query.
#[derive(Debug, Clone)]
pub struct Matcher {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
    pub op: MatchOp,
}

impl Matcher {
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into().into_bytes(),
            value: value.into().into_bytes(),
            op: MatchOp::Equal,
        }
    }
}

/// Finds the equality matcher on the metric name label, if any.
pub fn extract_metric_name_from_matchers(matchers: &[Matcher]) -> Option<&[u8]> {
    matchers
        .iter()
        .find(|m| m.name == crate::hashing::METRIC_NAME_LABEL && m.op == MatchOp::Equal)
        .map(|m| m.value.as_slice())
}

/// A single-key query against one replica set.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub from_ms: i64,
    pub to_ms: i64,
    pub matchers: Vec<Matcher>,
}

/// Per-tenant usage estimate, already divided by replication factor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UserStats {
    pub ingestion_rate: f64,
    pub num_series: u64,
}

impl UserStats {
    fn add(&self, other: &UserStats) -> UserStats {
        UserStats {
            ingestion_rate: self.ingestion_rate + other.ingestion_rate,
            num_series: self.num_series + other.num_series,
        }
    }
}

/// Componentwise sum of per-ingester stats, then scaled by `1 / replication_factor`.
///
/// Undefined when `replication_factor == 0`; callers must reject that
/// configuration at construction (enforced by `DistributorConfig::validate`).
pub fn sum_user_stats(stats: &[UserStats], replication_factor: usize) -> UserStats {
    let summed = stats
        .iter()
        .fold(UserStats::default(), |acc, s| acc.add(s));
    let rf = replication_factor as f64;
    UserStats {
        ingestion_rate: summed.ingestion_rate / rf,
        num_series: (summed.num_series as f64 / rf) as u64,
    }
}

/// The four unary calls the distributor issues against one ingester.
///
/// A real implementation wraps a gRPC/RPC handle; the wire schema itself is
/// out of scope here (see the crate-level Non-goals).
#[async_trait]
pub trait IngesterRpc: Send + Sync {
    async fn push(&self, request: WriteRequest) -> Result<(), DistributorError>;

    async fn query(&self, request: QueryRequest) -> Result<Matrix, DistributorError>;

    async fn label_values(&self, label_name: &str) -> Result<Vec<String>, DistributorError>;

    async fn metrics_for_label_matchers(
        &self,
        request: QueryRequest,
    ) -> Result<Matrix, DistributorError>;

    async fn user_stats(&self) -> Result<UserStats, DistributorError>;

    /// Closes the underlying connection. Dispatched asynchronously by the
    /// pool so it never blocks the pool lock.
    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_equality_matcher_on_metric_name() {
        let matchers = vec![
            Matcher::equal("job", "api"),
            Matcher::equal("__name__", "http_requests"),
        ];
        assert_eq!(
            extract_metric_name_from_matchers(&matchers),
            Some(b"http_requests".as_slice())
        );
    }

    #[test]
    fn non_equality_matcher_on_metric_name_does_not_count() {
        let matchers = vec![Matcher {
            name: b"__name__".to_vec(),
            value: b"http.*".to_vec(),
            op: MatchOp::RegexMatch,
        }];
        assert_eq!(extract_metric_name_from_matchers(&matchers), None);
    }

    #[test]
    fn sum_user_stats_divides_by_replication_factor() {
        let stats = vec![
            UserStats {
                ingestion_rate: 300.0,
                num_series: 30,
            },
            UserStats {
                ingestion_rate: 300.0,
                num_series: 30,
            },
            UserStats {
                ingestion_rate: 300.0,
                num_series: 30,
            },
        ];
        let result = sum_user_stats(&stats, 3);
        assert_eq!(result.ingestion_rate, 300.0);
        assert_eq!(result.num_series, 30);
    }
}
