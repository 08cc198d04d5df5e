use std::fmt;

use serde::Serialize;

/// Signed node id. Buckets are strictly negative, devices strictly
/// positive; both live in one space so rule output collision checks are
/// plain integer comparisons.
pub type NodeId = i32;
/// A node id known to be a device (`> 0`).
pub type DeviceId = i32;
/// A node id known to be a bucket (`< 0`).
pub type BucketId = i32;

/// 16.16 fixed-point weight.
///
/// Aggregation over the hierarchy is exact integer arithmetic, and the
/// overload check compares the low 16 hash bits directly against the
/// raw value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Weight(u32);

impl Weight {
    /// One unit of capacity (1.0).
    pub const UNIT: Weight = Weight(0x10000);
    /// Structurally present but never chosen (0.0).
    pub const OUT_OF_CLUSTER: Weight = Weight(0);

    pub fn from_f64(w: f64) -> Weight {
        Weight((w * 65536.0).round() as u32)
    }

    pub fn to_f64(self) -> f64 {
        f64::from(self.0) / 65536.0
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_out_of_cluster(self) -> bool {
        self.0 == 0
    }

    /// Signed difference `self - old`, used for ancestor updates.
    pub fn delta_from(self, old: Weight) -> i64 {
        i64::from(self.0) - i64::from(old.0)
    }

    pub(crate) fn add_delta(self, delta: i64) -> Weight {
        Weight((i64::from(self.0) + delta) as u32)
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.to_f64())
    }
}

/// Topology levels, ordered from leaf to root. A bucket's type is
/// strictly greater than every child's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Osd,
    Host,
    Chassis,
    Rack,
    Row,
    Pdu,
    Pod,
    Room,
    Datacenter,
    Region,
    Root,
}

impl NodeType {
    /// Every level a bucket may be declared at (`osd` is devices only).
    pub const BUCKET_TYPES: [NodeType; 10] = [
        NodeType::Host,
        NodeType::Chassis,
        NodeType::Rack,
        NodeType::Row,
        NodeType::Pdu,
        NodeType::Pod,
        NodeType::Room,
        NodeType::Datacenter,
        NodeType::Region,
        NodeType::Root,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Osd => "osd",
            NodeType::Host => "host",
            NodeType::Chassis => "chassis",
            NodeType::Rack => "rack",
            NodeType::Row => "row",
            NodeType::Pdu => "pdu",
            NodeType::Pod => "pod",
            NodeType::Room => "room",
            NodeType::Datacenter => "datacenter",
            NodeType::Region => "region",
            NodeType::Root => "root",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket selection algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketAlg {
    Uniform,
    Straw2,
}

impl fmt::Display for BucketAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketAlg::Uniform => f.write_str("uniform"),
            BucketAlg::Straw2 => f.write_str("straw2"),
        }
    }
}

/// `choose` descends to buckets of the target type; `chooseleaf` keeps
/// descending from each of them to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChooseKind {
    Choose,
    ChooseLeaf,
}

/// One step of a placement rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Take {
        name: String,
        /// Parsed and carried for display; does not filter the descent.
        class: Option<String>,
    },
    Choose {
        kind: ChooseKind,
        n: i32,
        target: NodeType,
    },
    Emit,
}

/// A placement rule: a small take/choose/emit program.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub id: u32,
    pub min_size: u32,
    pub max_size: u32,
    pub steps: Vec<Step>,
}

/// The only tunable the engine honors. The retry budget for collision,
/// out and overload rejections inside `choose_firstn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunables {
    pub choose_total_tries: u32,
}

impl Default for Tunables {
    fn default() -> Self {
        Tunables {
            choose_total_tries: 5,
        }
    }
}
