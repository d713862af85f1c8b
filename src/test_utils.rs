/// Shared test fixtures for the KL loss evaluator
use crate::block::MatrixBlock;
use crate::kl_loss::KlDivLoss;
use crate::synthetic;

/// V = [[0, 1], [1, 0], [0.5, 0.5]] cut into rows 0..2 and 2..3.
/// The sparse variant stores each shard in compressed-column form.
pub fn scenario_v_blocks(sparse: bool) -> Vec<MatrixBlock> {
    if sparse {
        vec![
            MatrixBlock::sparse(2, 2, vec![0, 1, 2], vec![1, 0], vec![1.0, 1.0]).unwrap(),
            MatrixBlock::sparse(1, 2, vec![0, 1, 2], vec![0, 0], vec![0.5, 0.5]).unwrap(),
        ]
    } else {
        vec![
            MatrixBlock::dense(2, 2, vec![0.0, 1.0, 1.0, 0.0]).unwrap(),
            MatrixBlock::dense(1, 2, vec![0.5, 0.5]).unwrap(),
        ]
    }
}

/// W = [[1, 0], [0, 1], [0.5, 0.5]] with the same row cut as V.
pub fn scenario_w_blocks() -> Vec<MatrixBlock> {
    vec![
        MatrixBlock::dense(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap(),
        MatrixBlock::dense(1, 2, vec![0.5, 0.5]).unwrap(),
    ]
}

/// m = 3, n = 2, k = 2, ε = 1e-6
pub fn scenario_evaluator(sparse: bool) -> KlDivLoss {
    KlDivLoss::new(scenario_v_blocks(sparse), scenario_w_blocks(), 3, 2, 2, 1e-6).unwrap()
}

/// Random sharded problem `(v_blocks, w_blocks, m, n, k)`
pub fn random_problem(
    seed: u64,
    rows: usize,
    cols: usize,
    rank: usize,
    shards: usize,
    density: f64,
) -> (Vec<MatrixBlock>, Vec<MatrixBlock>, usize, usize, usize) {
    let p = synthetic::generate(rows, cols, rank, shards, density, seed).unwrap();
    (p.v_blocks, p.w_blocks, p.m, p.n, p.k)
}

pub fn assert_close(actual: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(actual.len(), expected.len(), "length differs");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= tol,
            "entry {} differs: actual {}, expected {} (actual {:?})",
            i,
            a,
            e,
            actual
        );
    }
}
