use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("level mismatch: {left} != {right}")]
    LevelMismatch { left: usize, right: usize },

    #[error("scale mismatch: {left} != {right}")]
    ScaleMismatch { left: f64, right: f64 },

    #[error("degenerate scale: {0}")]
    DegenerateScale(f64),

    #[error("multiplicative depth exhausted at level {level}")]
    DepthExhausted { level: usize },

    #[error("key not available: {0}")]
    MissingKey(String),

    #[error("no decryptor in this evaluation context")]
    MissingDecryptor,

    #[error("no bootstrapper in this evaluation context")]
    MissingBootstrapper,

    #[error("value must be a power of 2, got {0}")]
    NotPowerOfTwo(usize),

    #[error("rotation by {target} is not reachable with the available keys")]
    RotationUnreachable { target: i64 },

    #[error("filter {index} out of range (filter count {count})")]
    FilterOutOfRange { index: usize, count: usize },

    #[error("backend failure: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
