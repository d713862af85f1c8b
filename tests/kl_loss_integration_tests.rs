//! Integration tests for the KL loss evaluator
//!
//! Covers the reference scenarios, the dense/sparse equivalence that pins the
//! block orientation, and the numeric properties of the loss and gradient.

use bwmf::synthetic;
use bwmf::{EvaluatorConfig, KlDivLoss, KlError, MatrixBlock, ParamBuffer, TrainingContext};
use ndarray::Array2;
use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn euclidean_dist(x: &[f32], y: &[f32]) -> f64 {
    if x.len() != y.len() {
        return f64::INFINITY;
    }
    x.iter()
        .zip(y)
        .map(|(a, b)| ((a - b) as f64).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn random_h(len: usize, seed: u64) -> ParamBuffer {
    let mut rng = StdRng::seed_from_u64(seed);
    let h = Array2::random_using((1, len), Uniform::new(0.2f32, 1.5), &mut rng);
    ParamBuffer::from_vec(h.iter().copied().collect())
}

/// The whole 3x2 V as one compressed-column shard: columns [0, 1, 0.5] and [1, 0, 0.5]
fn single_shard_evaluator() -> KlDivLoss {
    let v = MatrixBlock::sparse(3, 2, vec![0, 2, 4], vec![1, 2, 0, 2], vec![1.0, 0.5, 1.0, 0.5])
        .unwrap();
    let w = MatrixBlock::dense(3, 2, vec![1.0, 0.0, 0.0, 1.0, 0.5, 0.5]).unwrap();
    KlDivLoss::new(vec![v], vec![w], 3, 2, 2, 1e-6).unwrap()
}

fn two_shard_blocks(dense_v: bool) -> (Vec<MatrixBlock>, Vec<MatrixBlock>) {
    let v = if dense_v {
        vec![
            MatrixBlock::dense(2, 2, vec![0.0, 1.0, 1.0, 0.0]).unwrap(),
            MatrixBlock::dense(1, 2, vec![0.5, 0.5]).unwrap(),
        ]
    } else {
        vec![
            MatrixBlock::from_csr(2, 2, vec![0, 1, 2], vec![1, 0], vec![1.0, 1.0]).unwrap(),
            MatrixBlock::from_csr(1, 2, vec![0, 2], vec![0, 1], vec![0.5, 0.5]).unwrap(),
        ]
    };
    let w = vec![
        MatrixBlock::dense(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap(),
        MatrixBlock::dense(1, 2, vec![0.5, 0.5]).unwrap(),
    ];
    (v, w)
}

#[test]
fn test_reference_scenarios_single_shard() {
    init_logger();
    let loss = single_shard_evaluator();

    let h = ParamBuffer::from_vec(vec![1.0, 1.0, 1.0, 1.0]);
    let mut g = h.allocate_like();
    let value = loss.evaluate(&h, &mut g).unwrap();
    assert!((value - 6.0).abs() < 1e-5, "loss {}", value);
    assert!(euclidean_dist(g.data(), &[1.25, 0.25, 0.25, 1.25]) < 1e-5);

    let h = ParamBuffer::from_vec(vec![0.0, 1.0, 1.0, 0.0]);
    let value = loss.evaluate(&h, &mut g).unwrap();
    assert!((value - (3.0 - 0.5f64.ln())).abs() < 1e-5, "loss {}", value);
    assert!(euclidean_dist(g.data(), &[1.0, 0.0, 0.0, 1.0]) < 1e-5);
}

#[test]
fn test_reference_scenarios_two_shards() {
    init_logger();
    for dense_v in [true, false] {
        let (v, w) = two_shard_blocks(dense_v);
        let loss = KlDivLoss::new(v, w, 3, 2, 2, 1e-6).unwrap();

        let h = ParamBuffer::from_vec(vec![1.0, 1.0, 1.0, 1.0]);
        let mut g = h.allocate_like();
        let value = loss.evaluate(&h, &mut g).unwrap();
        assert!((value - 6.0).abs() < 1e-5);
        assert!(euclidean_dist(g.data(), &[1.25, 0.25, 0.25, 1.25]) < 1e-5);
    }
}

#[test]
fn test_repeated_calls_are_identical() {
    init_logger();
    let p = synthetic::generate(30, 7, 3, 4, 0.4, 11).unwrap();
    let loss = KlDivLoss::new(p.v_blocks, p.w_blocks, p.m, p.n, p.k, 1e-6).unwrap();
    let h = random_h(loss.param_len(), 5);

    let mut g1 = h.allocate_like();
    let mut g2 = h.allocate_like();
    let a = loss.evaluate(&h, &mut g1).unwrap();
    let b = loss.evaluate(&h, &mut g2).unwrap();
    assert_eq!(a.to_bits(), b.to_bits());
    assert_eq!(g1.data(), g2.data());
}

#[test]
fn test_prefilled_gradient_does_not_leak() {
    let loss = single_shard_evaluator();
    let h = random_h(4, 3);

    let mut fresh = h.allocate_like();
    let mut garbage = ParamBuffer::from_vec(vec![-3.5, 1e9, f32::NAN, 42.0]);
    let a = loss.evaluate(&h, &mut fresh).unwrap();
    let b = loss.evaluate(&h, &mut garbage).unwrap();
    assert_eq!(a, b);
    assert_eq!(fresh.data(), garbage.data());
}

#[test]
fn test_dense_and_sparse_v_agree() {
    let p = synthetic::generate(25, 6, 3, 3, 0.35, 21).unwrap();
    let dense_v: Vec<MatrixBlock> = p
        .v_blocks
        .iter()
        .map(|v| MatrixBlock::from_array(v.to_dense()))
        .collect();
    let sparse_v: Vec<MatrixBlock> = p
        .v_blocks
        .iter()
        .map(|v| MatrixBlock::sparse_from_dense(&v.to_dense()))
        .collect();

    let dense = KlDivLoss::new(dense_v, p.w_blocks.clone(), p.m, p.n, p.k, 1e-6).unwrap();
    let sparse = KlDivLoss::new(sparse_v, p.w_blocks, p.m, p.n, p.k, 1e-6).unwrap();

    for seed in 0..5 {
        let h = random_h(dense.param_len(), seed);
        let mut g_dense = h.allocate_like();
        let mut g_sparse = h.allocate_like();
        let a = dense.evaluate(&h, &mut g_dense).unwrap();
        let b = sparse.evaluate(&h, &mut g_sparse).unwrap();
        assert!((a - b).abs() < 1e-9 * a.abs().max(1.0));
        assert!(euclidean_dist(g_dense.data(), g_sparse.data()) < 1e-4);
    }
}

#[test]
fn test_sparse_w_blocks_accepted() {
    let p = synthetic::generate(12, 4, 2, 2, 0.5, 8).unwrap();
    let sparse_w: Vec<MatrixBlock> = p
        .w_blocks
        .iter()
        .map(|w| MatrixBlock::sparse_from_dense(&w.to_dense()))
        .collect();

    let a = KlDivLoss::new(p.v_blocks.clone(), p.w_blocks, p.m, p.n, p.k, 1e-6).unwrap();
    let b = KlDivLoss::new(p.v_blocks, sparse_w, p.m, p.n, p.k, 1e-6).unwrap();
    let h = random_h(a.param_len(), 2);
    assert_eq!(a.loss(&h).unwrap(), b.loss(&h).unwrap());
}

#[test]
fn test_loss_is_not_homogeneous_in_h() {
    let loss = single_shard_evaluator();
    let h = ParamBuffer::from_vec(vec![1.0, 1.0, 1.0, 1.0]);
    let scaled = ParamBuffer::from_vec(vec![2.0, 2.0, 2.0, 2.0]);

    let base = loss.loss(&h).unwrap();
    let doubled = loss.loss(&scaled).unwrap();
    // 12 − 3·ln 2 rather than 2 · 6
    assert!((doubled - 2.0 * base).abs() > 1.0);
    assert!((doubled - (12.0 - 3.0 * 2.0f64.ln())).abs() < 1e-4);
}

#[test]
fn test_block_order_within_tolerance() {
    let p = synthetic::generate(40, 5, 3, 5, 0.3, 99).unwrap();
    let mut v_rev = p.v_blocks.clone();
    let mut w_rev = p.w_blocks.clone();
    v_rev.reverse();
    w_rev.reverse();

    let forward = KlDivLoss::new(p.v_blocks, p.w_blocks, p.m, p.n, p.k, 1e-6).unwrap();
    let backward = KlDivLoss::new(v_rev, w_rev, p.m, p.n, p.k, 1e-6).unwrap();

    let h = random_h(forward.param_len(), 17);
    let mut g1 = h.allocate_like();
    let mut g2 = h.allocate_like();
    let a = forward.evaluate(&h, &mut g1).unwrap();
    let b = backward.evaluate(&h, &mut g2).unwrap();
    assert!((a - b).abs() < 1e-9 * a.abs().max(1.0));
    assert!(euclidean_dist(g1.data(), g2.data()) < 1e-4);
}

#[test]
fn test_gradient_matches_finite_difference() {
    let p = synthetic::generate(15, 4, 2, 3, 0.6, 5).unwrap();
    let loss = KlDivLoss::new(p.v_blocks, p.w_blocks, p.m, p.n, p.k, 1e-6).unwrap();
    let h = random_h(loss.param_len(), 9);
    let mut g = h.allocate_like();
    loss.evaluate(&h, &mut g).unwrap();

    let delta = 1e-3f32;
    for i in 0..h.len() {
        let mut plus = h.clone();
        let mut minus = h.clone();
        plus.set(i, h.get(i).unwrap() + delta).unwrap();
        minus.set(i, h.get(i).unwrap() - delta).unwrap();
        let span = f64::from(plus.get(i).unwrap()) - f64::from(minus.get(i).unwrap());
        let numeric = (loss.loss(&plus).unwrap() - loss.loss(&minus).unwrap()) / span;
        let analytic = f64::from(g.get(i).unwrap());
        assert!(
            (numeric - analytic).abs() < 1e-2 * analytic.abs().max(1.0),
            "entry {}: numeric {}, analytic {}",
            i,
            numeric,
            analytic
        );
    }
}

#[test]
fn test_fail_fast_on_bad_inputs() {
    let loss = single_shard_evaluator();

    let short = ParamBuffer::zeros(3);
    let mut g = ParamBuffer::from_vec(vec![5.0; 4]);
    assert_eq!(
        loss.evaluate(&short, &mut g),
        Err(KlError::DimensionMismatch {
            expected: 4,
            actual: 3
        })
    );
    assert_eq!(g.data(), &[5.0; 4]);

    let h = ParamBuffer::zeros(4);
    let mut long = ParamBuffer::from_vec(vec![5.0; 6]);
    assert!(loss.evaluate(&h, &mut long).is_err());
    assert_eq!(long.data(), &[5.0; 6]);

    let (v, w) = two_shard_blocks(true);
    assert!(matches!(
        KlDivLoss::new(v, w, 5, 2, 2, 1e-6),
        Err(KlError::ShapeMismatch(_))
    ));
}

#[test]
fn test_projected_gradient_lowers_loss() {
    init_logger();
    let p = synthetic::generate(30, 8, 3, 3, 0.5, 3).unwrap();
    let loss = KlDivLoss::with_config(
        p.v_blocks,
        p.w_blocks,
        p.m,
        p.n,
        p.k,
        EvaluatorConfig {
            num_threads: Some(2),
            ..Default::default()
        },
    )
    .unwrap();

    let mut ctx = TrainingContext::from_h(ParamBuffer::from_vec(vec![1.0; loss.param_len()]));
    let initial = ctx.evaluate(&loss).unwrap();
    for _ in 0..20 {
        ctx.apply_update(|h, g| {
            for (x, d) in h.data_mut().iter_mut().zip(g.data()) {
                *x = (*x - 1e-3 * d).max(0.0);
            }
        });
        ctx.evaluate(&loss).unwrap();
    }

    assert_eq!(ctx.iteration(), 21);
    let last = ctx.last_loss().unwrap();
    assert!(last < initial, "loss went from {} to {}", initial, last);
}
