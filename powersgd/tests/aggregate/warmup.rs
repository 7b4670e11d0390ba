use powersgd::{Config, Phase, PowerSgd, SingleWorker};

use super::helpers::{is_zero, max_rel_diff, random_gradients, resnet_like_shapes};

#[test]
fn test_no_compression_in_the_beginning() {
    let shapes = resnet_like_shapes();
    let config = Config::new(1)
        .with_min_compression_rate(10.0)
        .with_start_compressing_after_num_steps(2)
        .with_num_iters_per_step(1);
    let mut psgd = PowerSgd::<f32, _>::new(&shapes, config, SingleWorker).unwrap();

    let mut gradients = random_gradients::<f32>(&shapes, 0);
    let originals = gradients.clone();
    let averaged = psgd.aggregate(&mut gradients).unwrap();

    for grad in &gradients {
        assert!(is_zero(grad));
    }
    for (avg, orig) in averaged.iter().zip(&originals) {
        assert_eq!(avg, orig);
    }
    assert_eq!(psgd.step_counter(), 1);
}

#[test]
fn test_warmup_is_exact_for_every_call() {
    let shapes = resnet_like_shapes();
    let k = 4;
    let config = Config::new(2)
        .with_min_compression_rate(2.0)
        .with_start_compressing_after_num_steps(k);
    let mut psgd = PowerSgd::<f64, _>::new(&shapes, config, SingleWorker).unwrap();

    for call in 0..k {
        assert_eq!(psgd.phase(), Phase::WarmupPassthrough);
        let mut gradients = random_gradients::<f64>(&shapes, 100 + call);
        let originals = gradients.clone();
        let averaged = psgd.aggregate(&mut gradients).unwrap();
        for ((avg, orig), buf) in averaged.iter().zip(&originals).zip(&gradients) {
            assert_eq!(avg, orig, "call {call}");
            assert!(is_zero(buf), "call {call}");
        }
    }
    assert_eq!(psgd.phase(), Phase::Compressing);
    assert_eq!(psgd.step_counter(), k);
}

#[test]
fn test_bypass_parameters_never_compress() {
    let shapes = resnet_like_shapes();
    let config = Config::new(1)
        .with_min_compression_rate(10.0)
        .with_start_compressing_after_num_steps(0);
    let mut psgd = PowerSgd::<f64, _>::new(&shapes, config, SingleWorker).unwrap();

    let bypass: Vec<usize> = (0..shapes.len()).filter(|&i| !psgd.is_compressed(i)).collect();
    assert!(!bypass.is_empty());

    for call in 0..3 {
        let mut gradients = random_gradients::<f64>(&shapes, 200 + call);
        let originals = gradients.clone();
        let averaged = psgd.aggregate(&mut gradients).unwrap();
        for &i in &bypass {
            assert_eq!(averaged[i], originals[i]);
            assert!(is_zero(&gradients[i]));
        }
    }
}

#[test]
fn test_step_counter_counts_calls() {
    let shapes = vec![vec![30, 20], vec![20]];
    let config = Config::new(1).with_start_compressing_after_num_steps(2);
    let mut psgd = PowerSgd::<f64, _>::new(&shapes, config, SingleWorker).unwrap();
    for n in 1..=6u64 {
        let mut gradients = random_gradients::<f64>(&shapes, n);
        psgd.aggregate(&mut gradients).unwrap();
        assert_eq!(psgd.step_counter(), n);
    }
}

#[test]
fn test_first_compressed_step_after_warmup_conserves() {
    let shapes = vec![vec![48, 32]];
    let config = Config::new(2).with_start_compressing_after_num_steps(1);
    let mut psgd = PowerSgd::<f64, _>::new(&shapes, config, SingleWorker).unwrap();

    let mut gradients = random_gradients::<f64>(&shapes, 1);
    psgd.aggregate(&mut gradients).unwrap();
    assert!(!psgd.factors(0).unwrap().is_initialized());

    let mut gradients = random_gradients::<f64>(&shapes, 2);
    let originals = gradients.clone();
    let averaged = psgd.aggregate(&mut gradients).unwrap();
    assert!(psgd.factors(0).unwrap().is_initialized());
    assert_ne!(averaged[0], originals[0]);
    let restored = &averaged[0] + &gradients[0];
    assert!(max_rel_diff(&originals[0], &restored) < 1e-12);
}
