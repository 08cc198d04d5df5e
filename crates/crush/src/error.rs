use std::fmt;

use thiserror::Error;

use crate::types::BucketId;

/// Buckets left in the working set when a rule step expected devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedBuckets(pub Vec<(BucketId, String)>);

impl fmt::Display for EmittedBuckets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (id, name)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "[{}] {}", id, name)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum CrushError {
    #[error("bucket not found: {0}")]
    BucketNotFound(BucketId),

    #[error("device not found: osd.{0}")]
    DeviceNotFound(i32),

    #[error("rule step {step} emitted buckets where devices were expected: {buckets}")]
    BucketAtEmit {
        step: usize,
        buckets: EmittedBuckets,
    },
}

pub type Result<T> = std::result::Result<T, CrushError>;
