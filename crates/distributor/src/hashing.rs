// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Consistent-hash token derivation.
//!
//! The FNV-1a-32 hash with no separator between tenant and metric name is
//! wire-observable: it determines which ingester owns which series. Do not
//! change it, and in particular do not introduce a separator.

use crate::error::DistributorError;
use crate::types::LabelPair;

/// Well-known label key carrying a series' metric name.
pub const METRIC_NAME_LABEL: &[u8] = b"__name__";

const FNV_OFFSET_BASIS_32: u32 = 0x811c_9dc5;
const FNV_PRIME_32: u32 = 0x0100_0193;

/// 32-bit FNV-1a over `bytes`.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS_32;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(FNV_PRIME_32);
    }
    hash
}

const FNV_OFFSET_BASIS_64: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME_64: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a, used only for the (opaque, process-local) series fingerprint.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS_64;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME_64);
    }
    hash
}

/// Ring token for a `(tenant, metric name)` pair.
///
/// Two series sharing a tenant and metric name always collide onto the same
/// token, which is what co-locates a metric's series on one replica set.
pub fn token_for(tenant_id: &[u8], metric_name: &[u8]) -> u32 {
    let mut buf = Vec::with_capacity(tenant_id.len() + metric_name.len());
    buf.extend_from_slice(tenant_id);
    buf.extend_from_slice(metric_name);
    fnv1a_32(&buf)
}

/// Scans `labels` for the metric name label and derives its token.
pub fn token_for_labels(tenant_id: &[u8], labels: &[LabelPair]) -> Result<u32, DistributorError> {
    labels
        .iter()
        .find(|l| l.name == METRIC_NAME_LABEL)
        .map(|l| token_for(tenant_id, &l.value))
        .ok_or(DistributorError::MissingMetricName)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_32_matches_known_vectors() {
        // FNV-1a-32 of the empty string is the offset basis.
        assert_eq!(fnv1a_32(b""), 0x811c_9dc5);
        // FNV-1a-32("a") is a well known test vector.
        assert_eq!(fnv1a_32(b"a"), 0xe40c_292c);
    }

    #[test]
    fn token_for_is_stable_across_calls() {
        let a = token_for(b"tenantA", b"metric");
        let b = token_for(b"tenantA", b"metric");
        assert_eq!(a, b);
        // Fixed historical value: must never change without a migration.
        assert_eq!(a, fnv1a_32(b"tenantAmetric"));
    }

    #[test]
    fn colocation_same_tenant_and_metric_share_a_token() {
        let labels_a = vec![
            LabelPair::new("__name__", "http_requests"),
            LabelPair::new("job", "api"),
        ];
        let labels_b = vec![
            LabelPair::new("__name__", "http_requests"),
            LabelPair::new("job", "worker"),
        ];
        let t_a = token_for_labels(b"tenant-1", &labels_a).unwrap();
        let t_b = token_for_labels(b"tenant-1", &labels_b).unwrap();
        assert_eq!(t_a, t_b);
    }

    #[test]
    fn no_separator_between_tenant_and_metric() {
        // "ab" + "c" must hash identically to "a" + "bc": this is the
        // deliberate, compatibility-relevant absence of a separator.
        assert_eq!(token_for(b"ab", b"c"), token_for(b"a", b"bc"));
    }

    #[test]
    fn missing_metric_name_label_is_an_error() {
        let labels = vec![LabelPair::new("job", "api")];
        let err = token_for_labels(b"tenant-1", &labels).unwrap_err();
        assert!(matches!(err, DistributorError::MissingMetricName));
    }
}
