//! Synthetic row-sharded NMF problems for the demo driver and tests.

use ndarray::{s, Array2, Zip};
use ndarray_rand::rand::rngs::StdRng;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

use crate::block::MatrixBlock;
use crate::error::{KlError, Result};
use crate::param::ParamBuffer;

/// A planted factorization `V ≈ W · H` split into row shards
pub struct SyntheticProblem {
    pub v_blocks: Vec<MatrixBlock>,
    pub w_blocks: Vec<MatrixBlock>,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    /// The H used to plant V, flattened `k×n`
    pub h_true: ParamBuffer,
}

/// Plant `V = W · H` with uniform factors, keep each entry with probability
/// `density`, and cut rows into `shards` nearly equal blocks.
///
/// Even-numbered V shards are stored sparse, odd-numbered ones dense.
pub fn generate(
    rows: usize,
    cols: usize,
    rank: usize,
    shards: usize,
    density: f64,
    seed: u64,
) -> Result<SyntheticProblem> {
    if shards == 0 || shards > rows {
        return Err(KlError::InvalidConfiguration(format!(
            "cannot cut {} rows into {} shards",
            rows, shards
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let w = Array2::random_using((rows, rank), Uniform::new(0.0f32, 1.0), &mut rng);
    let h = Array2::random_using((rank, cols), Uniform::new(0.0f32, 1.0), &mut rng);
    let mask = Array2::random_using((rows, cols), Uniform::new(0.0f64, 1.0), &mut rng);

    let mut v = w.dot(&h);
    Zip::from(&mut v).and(&mask).for_each(|x, &keep| {
        if keep >= density {
            *x = 0.0;
        }
    });

    let base = rows / shards;
    let extra = rows % shards;
    let mut v_blocks = Vec::with_capacity(shards);
    let mut w_blocks = Vec::with_capacity(shards);
    let mut start = 0;
    for i in 0..shards {
        let end = start + base + usize::from(i < extra);
        let v_shard = v.slice(s![start..end, ..]).to_owned();
        v_blocks.push(if i % 2 == 0 {
            MatrixBlock::sparse_from_dense(&v_shard)
        } else {
            MatrixBlock::from_array(v_shard)
        });
        w_blocks.push(MatrixBlock::from_array(w.slice(s![start..end, ..]).to_owned()));
        start = end;
    }

    Ok(SyntheticProblem {
        v_blocks,
        w_blocks,
        m: rows,
        n: cols,
        k: rank,
        h_true: ParamBuffer::from_vec(h.iter().copied().collect()),
    })
}
