pub type Result<T> = std::result::Result<T, PowerSgdError>;

#[derive(Debug, thiserror::Error)]
pub enum PowerSgdError {
    #[error("invalid config: {field} {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },

    #[error("rank {rank} exceeds min({rows}, {cols}) for parameter {index}")]
    InvalidRank {
        index: usize,
        rank: usize,
        rows: usize,
        cols: usize,
    },

    #[error("shape mismatch for parameter {index}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        index: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("expected {expected} gradient buffers, got {actual}")]
    ParameterCountMismatch { expected: usize, actual: usize },

    #[error("buffer size mismatch: expected {expected} elements, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("{operation} failed at rank {rank}: {reason}")]
    CollectiveFailed {
        operation: &'static str,
        rank: usize,
        reason: String,
    },

    #[error("tokio runtime: {0}")]
    Runtime(String),

    #[error("aggregator poisoned by an earlier collective failure")]
    Poisoned,

    #[error("reshape failed: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl PowerSgdError {
    /// Create an `InvalidConfig` error for `field`.
    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// Create a `CollectiveFailed` error.
    pub fn collective(operation: &'static str, rank: usize, reason: impl Into<String>) -> Self {
        Self::CollectiveFailed {
            operation,
            rank,
            reason: reason.into(),
        }
    }

    /// True for errors raised by the reduction primitive, after which
    /// warm-start state can no longer be trusted.
    pub fn is_collective(&self) -> bool {
        matches!(
            self,
            Self::CollectiveFailed { .. } | Self::BufferSizeMismatch { .. } | Self::Runtime(_)
        )
    }
}
