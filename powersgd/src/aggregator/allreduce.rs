use ndarray::ArrayD;

use super::Aggregator;
use crate::collective::{Reducer, all_reduce_array};
use crate::compression::ResidualBuffer;
use crate::error::Result;
use crate::types::Scalar;

/// Uncompressed baseline: average every tensor, zero every buffer.
pub struct AllReduce<R> {
    reducer: R,
}

impl<R> AllReduce<R> {
    pub fn new(reducer: R) -> Self {
        Self { reducer }
    }

    pub fn reducer(&self) -> &R {
        &self.reducer
    }
}

impl<T: Scalar, R: Reducer<T>> Aggregator<T> for AllReduce<R> {
    fn aggregate(&mut self, gradients: &mut [ArrayD<T>]) -> Result<Vec<ArrayD<T>>> {
        gradients
            .iter_mut()
            .map(|grad| average_full(&self.reducer, grad))
            .collect()
    }
}

/// Average the full tensor across workers and clear its buffer.
pub(crate) fn average_full<T, R>(reducer: &R, grad: &mut ArrayD<T>) -> Result<ArrayD<T>>
where
    T: Scalar,
    R: Reducer<T> + ?Sized,
{
    let mut averaged = grad.as_standard_layout().into_owned();
    all_reduce_array(reducer, &mut averaged)?;
    ResidualBuffer::new(grad).clear();
    Ok(averaged)
}
