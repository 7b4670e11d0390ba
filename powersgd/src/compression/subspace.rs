//! Warm-started power iteration for one compressed parameter.

use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

use super::orthogonalize::orthonormalize_columns;
use crate::collective::{Reducer, all_reduce_array};
use crate::error::Result;
use crate::types::Scalar;

/// Seed for the `Q` of the parameter at `index`, derived from the global
/// seed. Independent of the order in which parameters first compress.
pub fn param_seed(seed: u64, index: usize) -> u64 {
    seed ^ (index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Low-rank factors `P` (`n×r`) and `Q` (`m×r`) of one parameter, kept
/// across calls as the warm start of the next refinement.
#[derive(Debug, Clone)]
pub struct SubspaceIterator<T> {
    rows: usize,
    cols: usize,
    rank: usize,
    num_iters: usize,
    seed: u64,
    p: Array2<T>,
    q: Option<Array2<T>>,
}

impl<T: Scalar> SubspaceIterator<T> {
    pub fn new(rows: usize, cols: usize, rank: usize, num_iters: usize, seed: u64) -> Self {
        Self {
            rows,
            cols,
            rank,
            num_iters,
            seed,
            p: Array2::zeros((rows, rank)),
            q: None,
        }
    }

    /// `(n, m)` matrix shape this iterator factors.
    pub fn matrix_shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Whether `Q` has been drawn yet.
    pub fn is_initialized(&self) -> bool {
        self.q.is_some()
    }

    /// Current `P`. Meaningless before the first refinement.
    pub fn p(&self) -> &Array2<T> {
        &self.p
    }

    pub fn q(&self) -> Option<&Array2<T>> {
        self.q.as_ref()
    }

    fn initial_q(&self) -> Array2<T> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        Array2::from_shape_simple_fn((self.cols, self.rank), || {
            let sample: f64 = StandardNormal.sample(&mut rng);
            T::from_f64(sample)
        })
    }

    /// Refine `P` and `Q` against `m` (the residual-augmented gradient).
    ///
    /// Per iteration: `P ← M·Q`, average `P`, orthonormalize `P`,
    /// `Q ← Mᵗ·P`, average `Q`. `P` is averaged before orthonormalization so
    /// every worker ends up with the identical basis. `Q` is left as
    /// computed.
    pub fn refine<R>(&mut self, m: &Array2<T>, reducer: &R) -> Result<()>
    where
        R: Reducer<T> + ?Sized,
    {
        debug_assert_eq!(m.dim(), (self.rows, self.cols));

        let mut q = match self.q.take() {
            Some(q) => q,
            None => self.initial_q(),
        };
        for _ in 0..self.num_iters {
            let mut p = m.dot(&q);
            all_reduce_array(reducer, &mut p)?;
            orthonormalize_columns(&mut p);
            q = m.t().dot(&p);
            all_reduce_array(reducer, &mut q)?;
            self.p = p;
        }

        self.q = Some(q);
        Ok(())
    }

    /// `P·Qᵗ`, an `n×m` matrix of rank at most `rank`.
    pub fn reconstruct(&self) -> Array2<T> {
        match &self.q {
            Some(q) => self.p.dot(&q.t()),
            None => Array2::zeros((self.rows, self.cols)),
        }
    }
}
