//! Low-rank gradient compression with error feedback.
//!
//! [`SubspaceIterator`] holds the warm-started `P`/`Q` factors of one
//! parameter, [`ResidualBuffer`] carries what the approximation missed into
//! the next step.

pub mod orthogonalize;
pub mod residual;
pub mod subspace;

pub use orthogonalize::orthonormalize_columns;
pub use residual::ResidualBuffer;
pub use subspace::{SubspaceIterator, param_seed};
