//! Column orthonormalization for the `P` factor.

use ndarray::{Array2, s};

use crate::types::Scalar;

/// Orthonormalize the columns of `m` in place.
///
/// Modified Gram–Schmidt, run twice: a single pass loses orthogonality when
/// columns are nearly dependent, the second pass restores it to working
/// precision. A column is set to zero when projecting out the earlier
/// columns cancels it down to rounding noise relative to its own norm, so
/// the outcome depends on the numerical rank of `m` and not on its scale.
pub fn orthonormalize_columns<T: Scalar>(m: &mut Array2<T>) {
    gram_schmidt_pass(m);
    gram_schmidt_pass(m);
}

fn column_norm<T: Scalar>(m: &Array2<T>, j: usize) -> T {
    let col = m.column(j);
    col.dot(&col).sqrt()
}

fn gram_schmidt_pass<T: Scalar>(m: &mut Array2<T>) {
    let cols = m.ncols();
    let tolerance = T::epsilon() * T::from_usize(m.nrows().max(1));
    for j in 0..cols {
        let before = column_norm(m, j);
        for k in 0..j {
            let proj = m.column(k).dot(&m.column(j));
            let (basis, mut col) = m.multi_slice_mut((s![.., k], s![.., j]));
            col.scaled_add(-proj, &basis);
        }
        let norm = column_norm(m, j);
        let mut col = m.column_mut(j);
        if norm > tolerance * before {
            col.mapv_inplace(|v| v / norm);
        } else {
            col.fill(T::zero());
        }
    }
}
