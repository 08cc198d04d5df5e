//! Rule execution: firstn replica descent with collision, out and
//! overload retries.

use tracing::debug;

use crate::bucket::bucket_choose;
use crate::error::{CrushError, EmittedBuckets, Result};
use crate::hash::{hash2, low16};
use crate::hierarchy::Hierarchy;
use crate::types::{BucketId, ChooseKind, DeviceId, NodeId, NodeType, Rule, Step, Tunables, Weight};

/// Whether a device refuses selection for input `x`.
///
/// Fully weighted devices are always in, out-of-cluster devices always
/// out. A fractional weight admits the device for that fraction of the
/// hash space, which is how reweighted devices shed load.
pub fn is_out(weight: Weight, device: DeviceId, x: i64) -> bool {
    if weight >= Weight::UNIT {
        return false;
    }
    if weight == Weight::OUT_OF_CLUSTER {
        return true;
    }
    low16(hash2(x, i64::from(device))) >= weight.raw()
}

fn is_collision(out: &[NodeId], outpos: usize, id: NodeId) -> bool {
    out[..outpos].contains(&id)
}

/// Select up to `num_replicas` nodes of `target` type from the subtree
/// under `cur`, appending to `out` from `outpos`. With
/// `recurse_to_leaf`, each selected bucket is descended to a single
/// device which lands in `out2`. Returns the new `outpos`; a slot that
/// exhausts its retry budget is skipped, not filled.
#[allow(clippy::too_many_arguments)]
fn choose_firstn(
    hierarchy: &Hierarchy,
    x: i64,
    cur: BucketId,
    target: NodeType,
    num_replicas: i32,
    max_replicas: i32,
    tries: u32,
    recursive_tries: u32,
    recurse_to_leaf: bool,
    out: &mut Vec<NodeId>,
    out2: &mut Vec<NodeId>,
    outpos: usize,
) -> Result<usize> {
    let cur_bucket = hierarchy.bucket(cur)?;
    let num_replicas = if num_replicas == 0 {
        cur_bucket.children.len() as i32
    } else if num_replicas < 0 {
        max_replicas + num_replicas
    } else {
        num_replicas
    };

    let mut outpos = outpos;
    for rep in 0..num_replicas.max(0) as u32 {
        let mut ftotal = 0u32;
        let mut skip_rep = false;

        // descent: restart from `cur` with a bumped r after a rejection
        'descent: loop {
            let mut item = cur_bucket;
            let mut repeat_descent = false;
            let r = rep + ftotal;

            // walk down until a node of the target type appears
            loop {
                let mut repeat_bucket = false;
                let Some(bd) = bucket_choose(hierarchy, item, x, r) else {
                    if ftotal >= tries {
                        skip_rep = true;
                    } else {
                        ftotal += 1;
                        repeat_descent = true;
                    }
                    break;
                };

                if bd < 0 {
                    let bucket = hierarchy.bucket(bd)?;
                    if bucket.kind != target {
                        item = bucket;
                        repeat_bucket = true;
                        continue;
                    }

                    if is_collision(out, outpos, bucket.id) {
                        if ftotal >= tries {
                            skip_rep = true;
                        } else {
                            ftotal += 1;
                            repeat_descent = true;
                        }
                        break;
                    }

                    if recurse_to_leaf {
                        let reached = choose_firstn(
                            hierarchy,
                            x,
                            bucket.id,
                            NodeType::Osd,
                            1,
                            0,
                            recursive_tries,
                            0,
                            false,
                            out2,
                            &mut Vec::new(),
                            outpos,
                        )?;
                        if reached <= outpos {
                            // no live device below this bucket
                            skip_rep = true;
                            break;
                        }
                    }
                    out.push(bd);
                    outpos += 1;
                } else {
                    let device = hierarchy.device(bd)?;
                    if target != NodeType::Osd
                        || is_collision(out, outpos, bd)
                        || is_out(device.weight, device.id, x)
                    {
                        if ftotal >= tries {
                            skip_rep = true;
                        } else {
                            ftotal += 1;
                            repeat_descent = true;
                        }
                        break;
                    }
                    out.push(bd);
                    outpos += 1;
                    if recurse_to_leaf {
                        out2.push(bd);
                    }
                }

                if !repeat_bucket {
                    break;
                }
            }

            if !repeat_descent {
                break 'descent;
            }
        }

        if skip_rep {
            debug!(
                x,
                rep, ftotal, "replica slot skipped after exhausting retries"
            );
            continue;
        }
    }

    Ok(outpos)
}

/// Execute `rule` for input `x` against the hierarchy, producing the
/// ordered device list. Position 0 is the primary.
pub fn apply(
    hierarchy: &Hierarchy,
    x: i64,
    rule: &Rule,
    pool_replicas: i32,
    tunables: &Tunables,
) -> Result<Vec<DeviceId>> {
    let mut work: Vec<NodeId> = vec![hierarchy.root_id()];
    let mut output: Vec<DeviceId> = Vec::new();

    for (index, step) in rule.steps.iter().enumerate() {
        let mut next: Vec<NodeId> = Vec::new();
        match step {
            Step::Take { name, .. } => {
                for &item in &work {
                    if let Some(found) = hierarchy.find_descendant(item, name) {
                        next.push(found);
                    }
                }
            }
            Step::Choose { kind, n, target } => {
                for &item in &work {
                    if item > 0 {
                        // devices survive a chooseleaf step untouched;
                        // a plain choose drops them
                        if *kind == ChooseKind::ChooseLeaf {
                            next.push(item);
                        }
                        continue;
                    }
                    match kind {
                        ChooseKind::ChooseLeaf => {
                            let mut out = Vec::new();
                            let mut out2 = Vec::new();
                            choose_firstn(
                                hierarchy,
                                x,
                                item,
                                *target,
                                *n,
                                pool_replicas,
                                tunables.choose_total_tries,
                                tunables.choose_total_tries,
                                true,
                                &mut out,
                                &mut out2,
                                0,
                            )?;
                            next.extend(out2);
                        }
                        ChooseKind::Choose => {
                            let mut out = Vec::new();
                            choose_firstn(
                                hierarchy,
                                x,
                                item,
                                *target,
                                *n,
                                pool_replicas,
                                tunables.choose_total_tries,
                                tunables.choose_total_tries,
                                false,
                                &mut out,
                                &mut Vec::new(),
                                0,
                            )?;
                            next.extend(out);
                        }
                    }
                }
            }
            Step::Emit => {
                let mut leftover = Vec::new();
                for &item in &work {
                    if item < 0 {
                        leftover.push((item, hierarchy.bucket(item)?.name.clone()));
                    }
                }
                if !leftover.is_empty() {
                    return Err(CrushError::BucketAtEmit {
                        step: index,
                        buckets: EmittedBuckets(leftover),
                    });
                }
                output.extend(work.iter().copied());
            }
        }
        work = next;
    }

    Ok(output)
}
