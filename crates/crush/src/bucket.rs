//! Bucket selection algorithms.

use crate::hash::{hash3, ln_fixed, low16, LN_UNITY};
use crate::hierarchy::{Bucket, Hierarchy};
use crate::types::{BucketAlg, NodeId};

/// Pick one child of `bucket` for input `x` and attempt `r`, using the
/// bucket's algorithm. `None` only for a childless bucket, which the
/// parser rejects; callers treat it as a failed attempt.
pub fn bucket_choose(hierarchy: &Hierarchy, bucket: &Bucket, x: i64, r: u32) -> Option<NodeId> {
    if bucket.children.is_empty() {
        return None;
    }
    match bucket.alg {
        BucketAlg::Uniform => uniform_choose(bucket, x, r),
        BucketAlg::Straw2 => straw2_choose(hierarchy, bucket, x, r),
    }
}

/// Uniform selection: hash-mod over the child list. All children are
/// assumed equally weighted.
fn uniform_choose(bucket: &Bucket, x: i64, r: u32) -> Option<NodeId> {
    let h = hash3(x, i64::from(bucket.id.unsigned_abs()), i64::from(r));
    let index = (h % bucket.children.len() as u64) as usize;
    Some(bucket.children[index])
}

/// straw2 selection: each child draws from an exponential distribution
/// scaled by its weight; the longest straw wins. Stable under
/// incremental weight changes elsewhere in the bucket.
fn straw2_choose(hierarchy: &Hierarchy, bucket: &Bucket, x: i64, r: u32) -> Option<NodeId> {
    let mut high = 0usize;
    let mut high_draw = i64::MIN;

    for (i, &child) in bucket.children.iter().enumerate() {
        let weight = hierarchy.node_weight(child).ok()?;
        let draw = if weight.is_out_of_cluster() {
            i64::MIN
        } else {
            let u = low16(hash3(x, i64::from(child.unsigned_abs()), i64::from(r)));
            // ln_fixed maps [0, 0xffff] onto [0, 2^48]; shifting by
            // LN_UNITY makes draws <= 0 so a larger weight divides a
            // negative number towards zero.
            (ln_fixed(u) as i64 - LN_UNITY) / i64::from(weight.raw())
        };
        // strict comparison: ties go to the lowest index
        if i == 0 || draw > high_draw {
            high = i;
            high_draw = draw;
        }
    }

    Some(bucket.children[high])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{Bucket, Device, Hierarchy};
    use crate::types::{BucketAlg, NodeType, Weight};
    use std::collections::{BTreeMap, HashMap};

    fn flat(alg: BucketAlg, weights: &[f64]) -> Hierarchy {
        let mut buckets = HashMap::new();
        let children: Vec<i32> = (1..=weights.len() as i32).collect();
        buckets.insert(
            -1,
            Bucket {
                id: -1,
                name: "default".to_string(),
                kind: NodeType::Root,
                alg,
                weight: Weight::OUT_OF_CLUSTER,
                children,
                parent: None,
            },
        );
        let mut devices = BTreeMap::new();
        for (i, &w) in weights.iter().enumerate() {
            let id = i as i32 + 1;
            devices.insert(
                id,
                Device {
                    id,
                    class: None,
                    weight: Weight::from_f64(w),
                    parent: -1,
                },
            );
        }
        let mut h = Hierarchy::from_parts(-1, buckets, devices).unwrap();
        h.recompute_subtree_weights();
        h
    }

    #[test]
    fn choose_is_deterministic() {
        let h = flat(BucketAlg::Straw2, &[1.0, 1.0, 1.0]);
        let b = h.root();
        for x in 0..32 {
            let a = bucket_choose(&h, b, x, 0);
            assert_eq!(a, bucket_choose(&h, b, x, 0));
            assert!(a.is_some());
        }
    }

    #[test]
    fn uniform_covers_children() {
        let h = flat(BucketAlg::Uniform, &[1.0, 1.0, 1.0]);
        let b = h.root();
        let mut seen = [false; 3];
        for x in 0..64 {
            let c = bucket_choose(&h, b, x, 0).unwrap();
            seen[(c - 1) as usize] = true;
        }
        assert_eq!(seen, [true, true, true]);
    }

    #[test]
    fn straw2_never_picks_zero_weight() {
        let h = flat(BucketAlg::Straw2, &[1.0, 0.0, 1.0]);
        let b = h.root();
        for x in 0..256 {
            for r in 0..4 {
                assert_ne!(bucket_choose(&h, b, x, r), Some(2));
            }
        }
    }

    #[test]
    fn straw2_all_zero_falls_back_to_first_child() {
        let h = flat(BucketAlg::Straw2, &[0.0, 0.0]);
        let b = h.root();
        assert_eq!(bucket_choose(&h, b, 7, 0), Some(1));
    }

    #[test]
    fn straw2_retry_changes_selection_eventually() {
        let h = flat(BucketAlg::Straw2, &[1.0, 1.0, 1.0]);
        let b = h.root();
        let first = bucket_choose(&h, b, 11, 0);
        let differs = (1..16).any(|r| bucket_choose(&h, b, 11, r) != first);
        assert!(differs, "retries never moved off the first pick");
    }
}
