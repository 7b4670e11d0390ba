use approx::assert_abs_diff_eq;
use ndarray::{Array2, ArrayD, IxDyn};
use powersgd::compression::ResidualBuffer;
use powersgd::{Config, PowerSgd, SingleWorker};

use super::helpers::{max_rel_diff, random_gradients, resnet_like_shapes};

#[test]
fn test_error_feedback_mechanism() {
    let shapes = resnet_like_shapes();
    let config = Config::new(2)
        .with_min_compression_rate(10.0)
        .with_start_compressing_after_num_steps(0)
        .with_num_iters_per_step(3);
    let mut psgd = PowerSgd::<f64, _>::new(&shapes, config, SingleWorker).unwrap();

    let mut gradients = random_gradients::<f64>(&shapes, 7);
    let originals = gradients.clone();
    let averaged = psgd.aggregate(&mut gradients).unwrap();

    for ((orig, avg), buffer) in originals.iter().zip(&averaged).zip(&gradients) {
        let restored = avg + buffer;
        let diff = max_rel_diff(orig, &restored);
        assert!(diff < 1e-12, "conservation violated by {diff}");
    }
}

#[test]
fn test_conservation_for_any_rank_and_iterations() {
    let shapes = vec![vec![40, 30], vec![16, 8, 3, 3], vec![30]];
    for rank in 1..=4 {
        for iters in 1..=3 {
            let config = Config::new(rank)
                .with_min_compression_rate(1.0)
                .with_start_compressing_after_num_steps(0)
                .with_num_iters_per_step(iters);
            let mut psgd = PowerSgd::<f64, _>::new(&shapes, config, SingleWorker).unwrap();
            let mut buffers = random_gradients::<f64>(&shapes, 0);
            for step in 0..3u64 {
                if step > 0 {
                    // New gradient lands on top of the residual, as a backward
                    // pass into the same buffers would.
                    let fresh = random_gradients::<f64>(&shapes, 1000 + step);
                    for (buf, grad) in buffers.iter_mut().zip(&fresh) {
                        ResidualBuffer::new(buf).accumulate(&grad.view()).unwrap();
                    }
                }
                let inputs = buffers.clone();
                let averaged = psgd.aggregate(&mut buffers).unwrap();
                for ((input, avg), residual) in inputs.iter().zip(&averaged).zip(&buffers) {
                    let diff = max_rel_diff(input, &(avg + residual));
                    assert!(diff < 1e-12, "rank {rank} iters {iters} step {step}: {diff}");
                }
            }
        }
    }
}

#[test]
fn test_f32_conservation() {
    let shapes = resnet_like_shapes();
    let config = Config::new(4)
        .with_min_compression_rate(2.0)
        .with_start_compressing_after_num_steps(0);
    let mut psgd = PowerSgd::<f32, _>::new(&shapes, config, SingleWorker).unwrap();
    let mut gradients = random_gradients::<f32>(&shapes, 3);
    let originals = gradients.clone();
    let averaged = psgd.aggregate(&mut gradients).unwrap();
    for ((orig, avg), buffer) in originals.iter().zip(&averaged).zip(&gradients) {
        let diff = max_rel_diff(orig, &(avg + buffer));
        assert!(diff < 1e-5, "conservation violated by {diff}");
    }
}

#[test]
fn test_aggregate_has_bounded_rank() {
    let shapes = resnet_like_shapes();
    let rank = 2;
    let config = Config::new(rank)
        .with_min_compression_rate(2.0)
        .with_start_compressing_after_num_steps(0)
        .with_num_iters_per_step(2);
    let mut psgd = PowerSgd::<f64, _>::new(&shapes, config, SingleWorker).unwrap();
    let mut gradients = random_gradients::<f64>(&shapes, 11);
    let averaged = psgd.aggregate(&mut gradients).unwrap();

    let mut checked = 0;
    for (i, avg) in averaged.iter().enumerate() {
        let Some(factors) = psgd.factors(i) else {
            continue;
        };
        let (n, m) = factors.matrix_shape();
        let a: Array2<f64> = avg.to_shape((n, m)).unwrap().into_owned();
        let p = factors.p();
        assert_eq!(p.ncols(), rank);
        // Every column of the aggregate lies in the rank-sized span of P.
        let projected = p.dot(&p.t().dot(&a));
        let err = (&a - &projected).iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        let scale = a.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        assert!(err <= 1e-10 * (1.0 + scale), "parameter {i}: {err}");
        checked += 1;
    }
    assert!(checked > 0);
}

#[test]
fn test_running_sum_of_aggregates_tracks_gradients() {
    let shapes = vec![vec![64, 48]];
    let config = Config::new(1).with_start_compressing_after_num_steps(0);
    let mut psgd = PowerSgd::<f64, _>::new(&shapes, config, SingleWorker).unwrap();

    let mut buffer = vec![ArrayD::<f64>::zeros(IxDyn(&[64, 48]))];
    let mut sent = ArrayD::<f64>::zeros(IxDyn(&[64, 48]));
    let mut produced = ArrayD::<f64>::zeros(IxDyn(&[64, 48]));
    for step in 0..20 {
        let fresh = random_gradients::<f64>(&shapes, 500 + step).remove(0);
        produced += &fresh;
        ResidualBuffer::new(&mut buffer[0])
            .accumulate(&fresh.view())
            .unwrap();
        let averaged = psgd.aggregate(&mut buffer).unwrap();
        sent += &averaged[0];
    }
    // Everything produced was either sent or is still waiting in the buffer.
    let accounted = &sent + &buffer[0];
    assert!(max_rel_diff(&produced, &accounted) < 1e-10);
    assert_eq!(psgd.step_counter(), 20);
}

#[test]
fn test_tiny_gradients_still_compress() {
    let shapes = vec![vec![32, 32]];
    let config = Config::new(2).with_start_compressing_after_num_steps(0);
    let mut psgd = PowerSgd::<f64, _>::new(&shapes, config, SingleWorker).unwrap();
    let mut gradients = random_gradients::<f64>(&shapes, 21);
    gradients[0].mapv_inplace(|v| v * 1e-19);
    let originals = gradients.clone();

    let averaged = psgd.aggregate(&mut gradients).unwrap();

    let p = psgd.factors(0).unwrap().p();
    let gram = p.t().dot(p);
    for i in 0..2 {
        for j in 0..2 {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert_abs_diff_eq!(gram[[i, j]], expected, epsilon = 1e-12);
        }
    }
    let peak = averaged[0].iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    assert!(peak > 1e-21, "aggregate collapsed to {peak}");
    let restored = &averaged[0] + &gradients[0];
    for (a, b) in originals[0].iter().zip(restored.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-30);
    }
}
