//! The storage topology: a tree of buckets with devices at the leaves.
//!
//! Nodes are keyed by signed id (buckets `< 0`, devices `> 0`). Devices
//! carry a parent back-reference so a weight change costs one walk to
//! the root; outside an in-progress update every bucket's weight equals
//! the sum of its children's.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::error::{CrushError, Result};
use crate::types::{BucketAlg, BucketId, DeviceId, NodeId, NodeType, Weight};

/// A storage device (leaf).
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: DeviceId,
    pub class: Option<String>,
    pub weight: Weight,
    pub parent: BucketId,
}

impl Device {
    /// Display name, `osd.<id>`.
    pub fn name(&self) -> String {
        format!("osd.{}", self.id)
    }
}

/// An interior node grouping buckets and devices.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub id: BucketId,
    pub name: String,
    pub kind: NodeType,
    pub alg: BucketAlg,
    pub weight: Weight,
    pub children: Vec<NodeId>,
    pub parent: Option<BucketId>,
}

#[derive(Debug, Clone)]
pub struct Hierarchy {
    root: BucketId,
    buckets: HashMap<BucketId, Bucket>,
    devices: BTreeMap<DeviceId, Device>,
}

impl Hierarchy {
    /// Assemble a hierarchy from parsed parts. The caller (the parser)
    /// is responsible for id signs, uniqueness and parent pointers.
    pub fn from_parts(
        root: BucketId,
        buckets: HashMap<BucketId, Bucket>,
        devices: BTreeMap<DeviceId, Device>,
    ) -> Result<Hierarchy> {
        if !buckets.contains_key(&root) {
            return Err(CrushError::BucketNotFound(root));
        }
        Ok(Hierarchy {
            root,
            buckets,
            devices,
        })
    }

    pub fn root_id(&self) -> BucketId {
        self.root
    }

    pub fn root(&self) -> &Bucket {
        // the constructor guarantees the root bucket exists
        &self.buckets[&self.root]
    }

    pub fn bucket(&self, id: BucketId) -> Result<&Bucket> {
        self.buckets.get(&id).ok_or(CrushError::BucketNotFound(id))
    }

    pub fn device(&self, id: DeviceId) -> Result<&Device> {
        self.devices.get(&id).ok_or(CrushError::DeviceNotFound(id))
    }

    pub fn contains_device(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    /// Devices in ascending id order.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Weight of any node, bucket or device.
    pub fn node_weight(&self, id: NodeId) -> Result<Weight> {
        if id < 0 {
            Ok(self.bucket(id)?.weight)
        } else {
            Ok(self.device(id)?.weight)
        }
    }

    /// Exact name lookup across the whole tree. Devices match
    /// `osd.<id>`.
    pub fn lookup_by_name(&self, name: &str) -> Option<NodeId> {
        if let Some(rest) = name.strip_prefix("osd.") {
            if let Ok(id) = rest.parse::<DeviceId>() {
                if self.devices.contains_key(&id) {
                    return Some(id);
                }
            }
        }
        self.buckets
            .values()
            .find(|b| b.name == name)
            .map(|b| b.id)
    }

    /// Search the subtree under `from` (inclusive) for a node named
    /// `name`.
    pub fn find_descendant(&self, from: NodeId, name: &str) -> Option<NodeId> {
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        queue.push_back(from);
        while let Some(id) = queue.pop_front() {
            if id < 0 {
                if let Some(bucket) = self.buckets.get(&id) {
                    if bucket.name == name {
                        return Some(id);
                    }
                    queue.extend(bucket.children.iter().copied());
                }
            } else if let Some(device) = self.devices.get(&id) {
                if device.name() == name {
                    return Some(id);
                }
            }
        }
        None
    }

    /// Set a device's weight and propagate the delta to every ancestor.
    /// O(tree height).
    pub fn update_device_weight(&mut self, id: DeviceId, weight: Weight) -> Result<()> {
        let (delta, mut parent) = {
            let device = self
                .devices
                .get_mut(&id)
                .ok_or(CrushError::DeviceNotFound(id))?;
            let delta = weight.delta_from(device.weight);
            device.weight = weight;
            (delta, Some(device.parent))
        };
        if delta == 0 {
            return Ok(());
        }
        while let Some(pid) = parent {
            let bucket = self
                .buckets
                .get_mut(&pid)
                .ok_or(CrushError::BucketNotFound(pid))?;
            bucket.weight = bucket.weight.add_delta(delta);
            parent = bucket.parent;
        }
        Ok(())
    }

    /// Recompute every bucket weight bottom-up from the leaves. Used
    /// once after parsing.
    pub fn recompute_subtree_weights(&mut self) {
        let order = self.postorder_buckets();
        for id in order {
            let Some(children) = self.buckets.get(&id).map(|b| b.children.clone()) else {
                continue;
            };
            let mut sum = Weight::OUT_OF_CLUSTER;
            for child in children {
                let w = if child < 0 {
                    self.buckets.get(&child).map(|b| b.weight)
                } else {
                    self.devices.get(&child).map(|d| d.weight)
                };
                if let Some(w) = w {
                    sum = sum.add_delta(w.delta_from(Weight::OUT_OF_CLUSTER));
                }
            }
            if let Some(bucket) = self.buckets.get_mut(&id) {
                bucket.weight = sum;
            }
        }
    }

    /// Bucket ids with children ordered before parents.
    fn postorder_buckets(&self) -> Vec<BucketId> {
        let mut order = Vec::with_capacity(self.buckets.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(bucket) = self.buckets.get(&id) {
                stack.extend(bucket.children.iter().filter(|&&c| c < 0));
            }
        }
        order.reverse();
        order
    }
}
