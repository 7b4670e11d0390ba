//! The compressor: gating, warmup state machine and per-parameter dispatch.

use ndarray::ArrayD;

use super::allreduce::average_full;
use super::{Aggregator, StepReport};
use crate::collective::Reducer;
use crate::compression::residual::reshape_owned;
use crate::compression::{ResidualBuffer, SubspaceIterator, param_seed};
use crate::config::Config;
use crate::error::{PowerSgdError, Result};
use crate::gate::{self, ParamLayout};
use crate::types::Scalar;

/// Activation state, derived from the step counter on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Gradients are averaged in full; no factors are touched.
    WarmupPassthrough,
    /// Gated parameters go through the low-rank path.
    Compressing,
}

enum TrackedParam<T> {
    Bypass,
    Compressed(SubspaceIterator<T>),
}

struct Slot<T> {
    layout: ParamLayout,
    state: TrackedParam<T>,
}

/// PowerSGD gradient compressor for a fixed, ordered set of parameters.
///
/// Each call to [`aggregate`](PowerSgd::aggregate) averages the gradients
/// across workers through `R`. Parameters that pass the gate are sent as
/// rank-`r` factors once warmup is over; everything else is sent in full.
///
/// The gradient buffers double as error-feedback storage: after a call
/// each holds the residual `M − P·Qᵗ` (or zero when sent in full), and the
/// caller is expected to accumulate the next gradient on top of it.
pub struct PowerSgd<T, R> {
    config: Config,
    reducer: R,
    params: Vec<Slot<T>>,
    step_counter: u64,
    poisoned: bool,
    last_report: Option<StepReport>,
}

impl<T: Scalar, R: Reducer<T>> PowerSgd<T, R> {
    /// Track parameters with the given shapes, in order.
    ///
    /// Fails with `InvalidConfig` or `InvalidRank` before any state exists.
    pub fn new<S: AsRef<[usize]>>(shapes: &[S], config: Config, reducer: R) -> Result<Self> {
        config.validate()?;

        let mut params = Vec::with_capacity(shapes.len());
        for (index, shape) in shapes.iter().enumerate() {
            let layout = gate::evaluate(index, shape.as_ref(), &config)?;
            let state = match layout.matrix_shape {
                Some((n, m)) if layout.compress => TrackedParam::Compressed(SubspaceIterator::new(
                    n,
                    m,
                    config.rank,
                    config.num_iters_per_step,
                    param_seed(config.seed, index),
                )),
                _ => TrackedParam::Bypass,
            };
            params.push(Slot { layout, state });
        }

        let compressed = params
            .iter()
            .filter(|s| matches!(s.state, TrackedParam::Compressed(_)))
            .count();
        tracing::info!(
            params = params.len(),
            compressed,
            bypass = params.len() - compressed,
            rank = config.rank,
            dtype = %T::DTYPE,
            world_size = reducer.world_size(),
            "powersgd: tracking parameters"
        );

        Ok(Self {
            config,
            reducer,
            params,
            step_counter: 0,
            poisoned: false,
            last_report: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn reducer(&self) -> &R {
        &self.reducer
    }

    /// Number of successful `aggregate` calls so far.
    pub fn step_counter(&self) -> u64 {
        self.step_counter
    }

    /// Phase the next call will run in.
    pub fn phase(&self) -> Phase {
        if self.step_counter < self.config.start_compressing_after_num_steps {
            Phase::WarmupPassthrough
        } else {
            Phase::Compressing
        }
    }

    /// Number of tracked parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn layout(&self, index: usize) -> Option<&ParamLayout> {
        self.params.get(index).map(|s| &s.layout)
    }

    /// Whether the parameter at `index` passed the gate.
    pub fn is_compressed(&self, index: usize) -> bool {
        self.params
            .get(index)
            .is_some_and(|s| matches!(s.state, TrackedParam::Compressed(_)))
    }

    /// Warm-start factors of the parameter at `index`, if it is compressed.
    pub fn factors(&self, index: usize) -> Option<&SubspaceIterator<T>> {
        match &self.params.get(index)?.state {
            TrackedParam::Compressed(it) => Some(it),
            TrackedParam::Bypass => None,
        }
    }

    /// Ratio of full gradient size to elements sent per compressing step
    /// for the whole tracked set.
    pub fn compression_rate(&self) -> f64 {
        let full: usize = self.params.iter().map(|s| s.layout.numel()).sum();
        let sent: usize = self
            .params
            .iter()
            .map(|s| self.elements_sent(s, true))
            .sum();
        if sent == 0 {
            return 1.0;
        }
        full as f64 / sent as f64
    }

    pub fn last_report(&self) -> Option<&StepReport> {
        self.last_report.as_ref()
    }

    /// True after a reducer failure; the instance refuses further calls.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn elements_sent(&self, slot: &Slot<T>, compressing: bool) -> usize {
        match slot.state {
            TrackedParam::Compressed(_) if compressing => {
                slot.layout.compressed_numel(self.config.rank) * self.config.num_iters_per_step
            }
            _ => slot.layout.numel(),
        }
    }

    fn validate(&self, gradients: &[ArrayD<T>]) -> Result<()> {
        if gradients.len() != self.params.len() {
            return Err(PowerSgdError::ParameterCountMismatch {
                expected: self.params.len(),
                actual: gradients.len(),
            });
        }
        for (index, (slot, grad)) in self.params.iter().zip(gradients).enumerate() {
            if grad.shape() != slot.layout.shape.as_slice() {
                return Err(PowerSgdError::ShapeMismatch {
                    index,
                    expected: slot.layout.shape.clone(),
                    actual: grad.shape().to_vec(),
                });
            }
        }
        Ok(())
    }

    /// Aggregate one gradient per tracked parameter across workers.
    ///
    /// On success every buffer in `gradients` holds its post-call residual,
    /// so that `input == returned + buffer` element-wise for a single
    /// worker, and the step counter has advanced by one. Validation errors
    /// leave buffers, factors and counter untouched. A reducer error
    /// poisons the instance.
    pub fn aggregate(&mut self, gradients: &mut [ArrayD<T>]) -> Result<Vec<ArrayD<T>>> {
        if self.poisoned {
            return Err(PowerSgdError::Poisoned);
        }
        self.validate(gradients)?;

        let step = self.step_counter;
        let compressing = self.phase() == Phase::Compressing;
        if compressing && step == self.config.start_compressing_after_num_steps {
            tracing::info!(step, "powersgd: warmup over, compressing");
        }

        let mut aggregates = Vec::with_capacity(gradients.len());
        for (slot, grad) in self.params.iter_mut().zip(gradients.iter_mut()) {
            match aggregate_one(slot, grad, compressing, &self.reducer) {
                Ok(aggregate) => aggregates.push(aggregate),
                Err(e) => {
                    if e.is_collective() {
                        self.poisoned = true;
                        tracing::warn!(step, "powersgd: reduction failed, poisoning: {e}");
                    }
                    return Err(e);
                }
            }
        }

        let report = StepReport {
            step,
            compressing,
            elements_sent: self
                .params
                .iter()
                .map(|s| self.elements_sent(s, compressing))
                .sum(),
            elements_uncompressed: self.params.iter().map(|s| s.layout.numel()).sum(),
        };
        tracing::debug!(
            step,
            compressing,
            elements_sent = report.elements_sent,
            rate = report.compression_rate(),
            "powersgd: step aggregated"
        );
        self.last_report = Some(report);
        self.step_counter += 1;

        Ok(aggregates)
    }
}

fn aggregate_one<T, R>(
    slot: &mut Slot<T>,
    grad: &mut ArrayD<T>,
    compressing: bool,
    reducer: &R,
) -> Result<ArrayD<T>>
where
    T: Scalar,
    R: Reducer<T> + ?Sized,
{
    match &mut slot.state {
        TrackedParam::Compressed(iterator) if compressing => {
            let (n, m) = iterator.matrix_shape();
            let mut residual = ResidualBuffer::new(grad);
            let matrix = residual.combine(n, m)?;
            iterator.refine(&matrix, reducer)?;
            let approx = iterator.reconstruct();
            residual.update(&matrix, &approx)?;
            reshape_owned(approx, &slot.layout.shape)
        }
        _ => average_full(reducer, grad),
    }
}

impl<T: Scalar, R: Reducer<T>> Aggregator<T> for PowerSgd<T, R> {
    fn aggregate(&mut self, gradients: &mut [ArrayD<T>]) -> Result<Vec<ArrayD<T>>> {
        PowerSgd::aggregate(self, gradients)
    }
}
