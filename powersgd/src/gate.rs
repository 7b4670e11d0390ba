//! Per-parameter decision whether low-rank compression is worth it.
//!
//! Evaluated once per tracked parameter when the compressor is built and
//! never revisited.

use crate::config::Config;
use crate::error::{PowerSgdError, Result};

/// Layout of one tracked parameter, fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamLayout {
    /// Original tensor shape.
    pub shape: Vec<usize>,
    /// `(n, m)` matrix view: first dimension by the product of the rest.
    /// `None` for scalars and vectors.
    pub matrix_shape: Option<(usize, usize)>,
    /// Whether the parameter goes through the low-rank path.
    pub compress: bool,
}

impl ParamLayout {
    /// Elements of the full tensor.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Elements exchanged per refinement when compressed: `rank * (n + m)`.
    pub fn compressed_numel(&self, rank: usize) -> usize {
        match self.matrix_shape {
            Some((n, m)) if self.compress => rank * (n + m),
            _ => self.numel(),
        }
    }
}

/// `(n, m)` view used for factorization, or `None` for tensors of rank <= 1.
pub fn matrix_shape(shape: &[usize]) -> Option<(usize, usize)> {
    match shape {
        [] | [_] => None,
        [n, rest @ ..] => Some((*n, rest.iter().product())),
    }
}

/// Decide whether the parameter at `index` with `shape` is compressed.
///
/// Fails with `InvalidRank` when a matrix-shaped parameter has a side
/// shorter than the configured rank.
pub fn evaluate(index: usize, shape: &[usize], config: &Config) -> Result<ParamLayout> {
    let matrix_shape = matrix_shape(shape);

    let compress = match matrix_shape {
        // Empty tensors carry nothing worth factoring.
        Some((n, m)) if n > 0 && m > 0 => {
            if config.rank > n.min(m) {
                return Err(PowerSgdError::InvalidRank {
                    index,
                    rank: config.rank,
                    rows: n,
                    cols: m,
                });
            }
            let compressed = (config.rank * (n + m)) as f64;
            compressed * config.min_compression_rate < (n * m) as f64
        }
        _ => false,
    };

    Ok(ParamLayout {
        shape: shape.to_vec(),
        matrix_shape,
        compress,
    })
}
