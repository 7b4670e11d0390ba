use ndarray::{Array, ArrayD, IxDyn};
use powersgd::{BlockingRing, RingConfig, Scalar};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

/// Scaled-down ResNet parameter list: convolutions, batch-norm vectors and a
/// classifier head.
pub fn resnet_like_shapes() -> Vec<Vec<usize>> {
    vec![
        vec![64, 3, 7, 7],
        vec![64],
        vec![64],
        vec![64, 64, 1, 1],
        vec![64, 64, 3, 3],
        vec![64],
        vec![256, 64, 1, 1],
        vec![256],
        vec![128, 256, 1, 1],
        vec![128, 128, 3, 3],
        vec![128],
        vec![100, 512],
        vec![100],
    ]
}

/// One standard-normal tensor per shape, reproducible from `seed`.
pub fn random_gradients<T: Scalar>(shapes: &[Vec<usize>], seed: u64) -> Vec<ArrayD<T>> {
    let mut rng = StdRng::seed_from_u64(seed);
    shapes
        .iter()
        .map(|shape| {
            let n: usize = shape.iter().product();
            let data = (0..n)
                .map(|_| {
                    let v: f64 = StandardNormal.sample(&mut rng);
                    T::from_f64(v)
                })
                .collect();
            Array::from_shape_vec(IxDyn(shape), data).unwrap()
        })
        .collect()
}

/// Largest `|a - b| / (1 + |a|)` over all elements.
pub fn max_rel_diff<T: Scalar>(a: &ArrayD<T>, b: &ArrayD<T>) -> f64 {
    assert_eq!(a.shape(), b.shape());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let x = x.to_f64().unwrap();
            let y = y.to_f64().unwrap();
            (x - y).abs() / (1.0 + x.abs())
        })
        .fold(0.0, f64::max)
}

pub fn is_zero<T: Scalar>(a: &ArrayD<T>) -> bool {
    a.iter().all(|v| *v == T::zero())
}

/// Run `f` on `world_size` OS threads, each owning one ring member, and
/// collect the results in rank order.
pub fn run_workers<T, F, Out>(world_size: usize, f: F) -> Vec<Out>
where
    T: Scalar,
    F: Fn(usize, BlockingRing<T>) -> Out + Send + Sync + 'static,
    Out: Send + 'static,
{
    let members = BlockingRing::<T>::group(world_size, &RingConfig::default()).unwrap();
    let f = std::sync::Arc::new(f);
    let handles: Vec<_> = members
        .into_iter()
        .enumerate()
        .map(|(rank, member)| {
            let f = std::sync::Arc::clone(&f);
            std::thread::spawn(move || f(rank, member))
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}
