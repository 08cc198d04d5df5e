pub mod bucket;
pub mod error;
pub mod hash;
pub mod hierarchy;
pub mod mapper;
pub mod types;

pub use error::{CrushError, Result};
pub use hierarchy::{Bucket, Device, Hierarchy};
pub use mapper::{apply, is_out};
pub use types::{
    BucketAlg, BucketId, ChooseKind, DeviceId, NodeId, NodeType, Rule, Step, Tunables, Weight,
};
