use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    /// Rule evaluation failed. A bucket surviving to emit means the
    /// parser let a malformed rule through; this is not recoverable at
    /// runtime.
    #[error("placement failed: {0}")]
    Crush(#[from] crush::CrushError),

    #[error("the map defines no rules")]
    NoRules,
}

pub type Result<T> = std::result::Result<T, SimError>;
