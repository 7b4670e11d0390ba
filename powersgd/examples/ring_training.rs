//! PowerSGD across 4 worker threads joined by an in-process ring.
//!
//! Each worker produces synthetic gradients for a small model, accumulates
//! them into its own buffers and calls `aggregate`. The first steps are plain
//! averaging, after that the matrix-shaped tensors travel as rank-4 factors.
//!
//! ```bash
//! RUST_LOG=powersgd=debug POWERSGD_START_COMPRESSING_AFTER_NUM_STEPS=3 \
//!     cargo run --example ring_training
//! ```

use ndarray::{ArrayD, IxDyn};
use powersgd::{BlockingRing, Config, PowerSgd, RingConfig};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use tracing_subscriber::EnvFilter;

const WORLD: usize = 4;
const STEPS: u64 = 8;

fn model_shapes() -> Vec<Vec<usize>> {
    vec![
        vec![64, 3, 3, 3],
        vec![64],
        vec![128, 64, 3, 3],
        vec![128],
        vec![10, 2048],
        vec![10],
    ]
}

fn fake_gradient(shape: &[usize], rng: &mut StdRng) -> ArrayD<f32> {
    ArrayD::from_shape_simple_fn(IxDyn(shape), || {
        let v: f64 = StandardNormal.sample(&mut *rng);
        v as f32
    })
}

fn squared_norm(tensors: &[ArrayD<f32>]) -> f32 {
    tensors.iter().flat_map(|t| t.iter()).map(|v| v * v).sum()
}

fn main() -> powersgd::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env(4);
    let members = BlockingRing::<f32>::group(WORLD, &RingConfig::from_env())?;

    let handles: Vec<_> = members
        .into_iter()
        .enumerate()
        .map(|(rank, ring)| {
            let config = config.clone();
            std::thread::spawn(move || -> powersgd::Result<Vec<String>> {
                let shapes = model_shapes();
                let mut psgd = PowerSgd::new(&shapes, config, ring)?;
                let mut rng = StdRng::seed_from_u64(rank as u64);
                let mut buffers: Vec<ArrayD<f32>> =
                    shapes.iter().map(|s| ArrayD::zeros(IxDyn(s))).collect();

                let mut lines = Vec::new();
                for _ in 0..STEPS {
                    // Backward pass adds into whatever residual is left over.
                    for (buf, shape) in buffers.iter_mut().zip(&shapes) {
                        *buf += &fake_gradient(shape, &mut rng);
                    }
                    let averaged = psgd.aggregate(&mut buffers)?;
                    let residual = squared_norm(&buffers);
                    let update = squared_norm(&averaged);
                    if let Some(report) = psgd.last_report() {
                        lines.push(format!(
                            "step {} compressing={} rate={:.1}x |update|={:.2} |residual|={:.2}",
                            report.step,
                            report.compressing,
                            report.compression_rate(),
                            update.sqrt(),
                            residual.sqrt(),
                        ));
                    }
                }
                Ok(lines)
            })
        })
        .collect();

    for (rank, h) in handles.into_iter().enumerate() {
        let lines = h
            .join()
            .map_err(|_| powersgd::PowerSgdError::Runtime("worker panicked".into()))??;
        if rank == 0 {
            for line in lines {
                println!("{line}");
            }
        }
    }

    Ok(())
}
