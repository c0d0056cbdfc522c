// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sample-stream merge utility shared by single-key and broadcast reads.
//!
//! Merging two streams for the same fingerprint concatenates their sample
//! lists in timestamp order, deduplicating on identical `(timestamp, value)`
//! pairs. Samples with the same timestamp but a different value resolve to
//! the first one seen. This tie-break is a documented, load-bearing
//! behavior and must be preserved exactly.

use crate::types::Sample;

/// Merges `incoming` into `target`, preserving `target`'s first-seen-wins
/// semantics on timestamp collisions.
pub fn merge_samples(target: &mut Vec<Sample>, incoming: &[Sample]) {
    for &sample in incoming {
        match target.binary_search_by_key(&sample.timestamp_ms, |s| s.timestamp_ms) {
            Ok(_) => {
                // A sample at this timestamp was already seen (from `target`
                // itself or an earlier call) — first one seen wins.
            }
            Err(pos) => target.insert(pos, sample),
        }
    }
}
