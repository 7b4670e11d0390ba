//! Gradient aggregators.
//!
//! An aggregator takes one gradient buffer per tracked parameter, returns the
//! cross-worker aggregate of each, and leaves in every buffer whatever still
//! has to be sent later (zero for exact aggregators).

mod allreduce;
mod powersgd;

pub use allreduce::AllReduce;
pub use powersgd::{Phase, PowerSgd};

use ndarray::ArrayD;

use crate::error::Result;

/// Cross-worker gradient aggregation with in-place residual hand-back.
pub trait Aggregator<T> {
    /// Aggregate `gradients` across workers.
    ///
    /// Returns one tensor per input, same order and shape. Each buffer in
    /// `gradients` is overwritten with the residual left for the next call.
    fn aggregate(&mut self, gradients: &mut [ArrayD<T>]) -> Result<Vec<ArrayD<T>>>;
}

/// Communication summary of one `aggregate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    /// Step counter value the call ran at (before increment).
    pub step: u64,
    /// Whether the low-rank path was active.
    pub compressing: bool,
    /// Elements handed to the reducer.
    pub elements_sent: usize,
    /// Elements the reducer would have seen without compression.
    pub elements_uncompressed: usize,
}

impl StepReport {
    /// Ratio of uncompressed to sent elements (1.0 when nothing was sent).
    pub fn compression_rate(&self) -> f64 {
        if self.elements_sent == 0 {
            return 1.0;
        }
        self.elements_uncompressed as f64 / self.elements_sent as f64
    }
}
