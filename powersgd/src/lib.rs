//! Low-rank gradient compression with error feedback.
//!
//! [`PowerSgd`] replaces each large gradient with rank-`r` factors `P`, `Q`
//! before the cross-worker average, reconstructs `P·Qᵗ` on every worker, and
//! keeps the approximation error in the caller's gradient buffer so it is
//! sent on a later step.
//!
//! ```no_run
//! use ndarray::{ArrayD, IxDyn};
//! use powersgd::{Config, PowerSgd, SingleWorker};
//!
//! let shapes = [vec![256, 128], vec![128]];
//! let config = Config::new(4).with_start_compressing_after_num_steps(10);
//! let mut psgd = PowerSgd::<f32, _>::new(&shapes, config, SingleWorker)?;
//!
//! let mut grads: Vec<ArrayD<f32>> = shapes.iter().map(|s| ArrayD::zeros(IxDyn(s))).collect();
//! let averaged = psgd.aggregate(&mut grads)?;
//! # Ok::<(), powersgd::PowerSgdError>(())
//! ```

pub mod aggregator;
pub mod collective;
pub mod compression;
pub mod config;
pub mod error;
pub mod gate;
pub mod types;

pub use aggregator::{AllReduce, Aggregator, Phase, PowerSgd, StepReport};
pub use collective::{BlockingRing, Reducer, RingMember, SingleWorker};
pub use compression::{ResidualBuffer, SubspaceIterator};
pub use config::{Config, RingConfig};
pub use error::{PowerSgdError, Result};
pub use gate::ParamLayout;
pub use types::{DataType, Scalar};
