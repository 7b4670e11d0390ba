//! Cross-worker reduction boundary.
//!
//! The compressor only needs one primitive: a blocking, in-place average of
//! a contiguous buffer across all workers. [`Reducer`] is that contract.
//! [`SingleWorker`] is the trivial group of one; [`BlockingRing`] runs a ring
//! all-reduce between in-process workers.

mod blocking;
mod helpers;
mod ring;

pub use blocking::BlockingRing;
pub use ring::RingMember;

use std::sync::Arc;

use ndarray::{Array, Dimension};

use crate::error::Result;
use crate::types::Scalar;

/// Blocking cross-worker average.
///
/// Every worker must call `all_reduce_mean` for the same logical tensors in
/// the same order; the call returns only once all workers contributed.
pub trait Reducer<T> {
    /// Replace `buf` with the element-wise average of every worker's `buf`.
    fn all_reduce_mean(&self, buf: &mut [T]) -> Result<()>;

    /// Number of participating workers.
    fn world_size(&self) -> usize;

    /// This worker's index (0-based).
    fn rank(&self) -> usize {
        0
    }
}

impl<T, R: Reducer<T> + ?Sized> Reducer<T> for &R {
    fn all_reduce_mean(&self, buf: &mut [T]) -> Result<()> {
        (**self).all_reduce_mean(buf)
    }

    fn world_size(&self) -> usize {
        (**self).world_size()
    }

    fn rank(&self) -> usize {
        (**self).rank()
    }
}

impl<T, R: Reducer<T> + ?Sized> Reducer<T> for Arc<R> {
    fn all_reduce_mean(&self, buf: &mut [T]) -> Result<()> {
        (**self).all_reduce_mean(buf)
    }

    fn world_size(&self) -> usize {
        (**self).world_size()
    }

    fn rank(&self) -> usize {
        (**self).rank()
    }
}

impl<T, R: Reducer<T> + ?Sized> Reducer<T> for Box<R> {
    fn all_reduce_mean(&self, buf: &mut [T]) -> Result<()> {
        (**self).all_reduce_mean(buf)
    }

    fn world_size(&self) -> usize {
        (**self).world_size()
    }

    fn rank(&self) -> usize {
        (**self).rank()
    }
}

/// A group of one: the average of a single contribution is itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleWorker;

impl<T> Reducer<T> for SingleWorker {
    fn all_reduce_mean(&self, _buf: &mut [T]) -> Result<()> {
        Ok(())
    }

    fn world_size(&self) -> usize {
        1
    }
}

/// Average an owned array across workers in place, whatever its memory
/// layout.
pub fn all_reduce_array<T, D, R>(reducer: &R, array: &mut Array<T, D>) -> Result<()>
where
    T: Scalar,
    D: Dimension,
    R: Reducer<T> + ?Sized,
{
    if let Some(slice) = array.as_slice_mut() {
        return reducer.all_reduce_mean(slice);
    }
    let mut contiguous = array.as_standard_layout().into_owned();
    if let Some(slice) = contiguous.as_slice_mut() {
        reducer.all_reduce_mean(slice)?;
    }
    array.assign(&contiguous);
    Ok(())
}
