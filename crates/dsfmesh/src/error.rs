//! Error types for the DSF codec and editing engine.
//!
//! Only structural problems surface as errors: a file that is not a valid
//! container, an archive that cannot be unwrapped, or an update that cannot
//! be fully applied. Recoverable anomalies (unknown atoms, quantization
//! clamps, geometric degeneracies, unknown opcodes) are logged and handled
//! locally instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DsfError {
    /// The file is not a valid DSF container (bad magic, wrong version,
    /// truncated atom, missing mandatory atom).
    #[error("not a valid DSF container: {0}")]
    Format(String),

    /// The outer 7z wrapper could not be unwrapped.
    #[error("archive error: {0}")]
    Archive(String),

    /// I/O failure while reading or writing the container.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The allocator would need more pools than the index width allows.
    /// Aborts the whole update.
    #[error("pool table exhausted: would need {pools} pools (limit {limit})")]
    PoolExhausted { pools: usize, limit: usize },

    /// The update could not be fully applied.
    #[error("update could not be fully applied: {0}")]
    UpdateFailed(String),
}

pub type DsfResult<T> = Result<T, DsfError>;
