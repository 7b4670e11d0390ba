//! Error-feedback residual kept in the caller's gradient buffer.
//!
//! On entry to a step the buffer holds the new gradient accumulated on top of
//! the previous residual; on exit it holds only what the low-rank
//! approximation failed to capture. Nothing sent is ever lost: the next step
//! adds it back.

use ndarray::{Array2, ArrayD, ArrayView, Dimension, IxDyn};

use crate::error::Result;
use crate::types::Scalar;

/// Exclusive view of one parameter's gradient buffer as residual storage.
pub struct ResidualBuffer<'a, T> {
    buf: &'a mut ArrayD<T>,
}

impl<'a, T: Scalar> ResidualBuffer<'a, T> {
    pub fn new(buf: &'a mut ArrayD<T>) -> Self {
        Self { buf }
    }

    /// `buf += gradient`, for callers that compute a fresh gradient
    /// separately instead of accumulating into the buffer.
    pub fn accumulate<D: Dimension>(&mut self, gradient: &ArrayView<'_, T, D>) -> Result<()> {
        let gradient = gradient.to_shape(self.buf.shape())?;
        self.buf.zip_mut_with(&gradient, |r, g| *r = *r + *g);
        Ok(())
    }

    /// The residual-augmented gradient `M` as an `n×m` matrix.
    pub fn combine(&self, rows: usize, cols: usize) -> Result<Array2<T>> {
        Ok(self.buf.to_shape((rows, cols))?.into_owned())
    }

    /// `buf ← M − A`.
    pub fn update(&mut self, m: &Array2<T>, approx: &Array2<T>) -> Result<()> {
        let residual = reshape_owned(m - approx, self.buf.shape())?;
        self.buf.assign(&residual);
        Ok(())
    }

    /// `buf ← 0`. Used whenever the full gradient was sent exactly.
    pub fn clear(&mut self) {
        self.buf.fill(T::zero());
    }
}

/// Reshape an owned matrix into `shape`, copying only when its layout is not
/// row-major contiguous.
pub(crate) fn reshape_owned<T: Scalar>(matrix: Array2<T>, shape: &[usize]) -> Result<ArrayD<T>> {
    let matrix = if matrix.is_standard_layout() {
        matrix
    } else {
        matrix.as_standard_layout().into_owned()
    };
    Ok(matrix.into_shape_with_order(IxDyn(shape))?)
}
