//! # Errors
//!
//! The single error type shared by every fallible operation of the engine.
//!
//! Contract violations that the caller can reasonably build wrongly (bad
//! weights, oversized signatures, invalid block ids, inconsistent configuration)
//! are returned as `Err` immediately. Cache read problems are recovered inside
//! the cache and never reach the caller as errors.

use thiserror::Error;

/// Errors produced by the obfuscation engine.
#[derive(Debug, Error)]
pub enum ObfuscationError {
    #[error("weighted list must contain at least one entry")]
    EmptyWeightedList,

    #[error("invalid weight {weight} at index {index}: weights must be finite and positive")]
    InvalidWeight { index: usize, weight: f64 },

    #[error("signature payload of {len} bytes exceeds the {max} byte limit")]
    SignatureTooLong { len: usize, max: usize },

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown chunk modifier '{0}'")]
    UnknownModifier(String),

    #[error("corrupt cache record: {0}")]
    CorruptCache(String),

    #[error("unsupported cache format version {found} (expected {expected})")]
    UnsupportedCacheVersion { found: u32, expected: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using `ObfuscationError`.
pub type Result<T> = std::result::Result<T, ObfuscationError>;
