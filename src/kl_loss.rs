//! # KL-divergence loss and H-gradient over local shards
//!
//! For every local row-block pair `(V_i, W_i)` the evaluator reconstructs
//! `R_i = W_i · H` densely and accumulates
//!
//! ```text
//! loss += Σ r − v·ln(r + ε)
//! grad += W_iᵀ · (1 − V_i ⊘ (R_i + ε))
//! ```
//!
//! The `r` and `1` terms cover every position of the block whether or not V
//! stores a value there; only the `v`-weighted terms vanish where `v = 0`.
//!
//! Each pair yields a private `(loss, gradient)` partial. Partials are summed
//! in pair order on the calling thread, so parallel and sequential runs agree
//! exactly.

use log::{debug, info, trace};
use ndarray::{Array2, Zip};
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::block::MatrixBlock;
use crate::config::EvaluatorConfig;
use crate::error::{KlError, Result};
use crate::param::ParamBuffer;

pub struct KlDivLoss {
    v_blocks: Vec<MatrixBlock>,
    /// W shards densified once, since `W_i · H` is dense anyway
    w_blocks: Vec<Array2<f64>>,
    m: usize,
    n: usize,
    k: usize,
    /// `k * n`, checked for overflow at construction
    param_len: usize,
    config: EvaluatorConfig,
    pool: Option<ThreadPool>,
}

impl KlDivLoss {
    /// Build an evaluator with smoothing constant `epsilon` and default settings
    ///
    /// # Arguments
    /// * `v_blocks` - V shards, each `m_i × n`
    /// * `w_blocks` - W shards paired index-for-index with `v_blocks`, each `m_i × k`
    /// * `m` - total row count, the sum of all `m_i`
    /// * `n` - columns of V and of H
    /// * `k` - latent rank
    pub fn new(
        v_blocks: Vec<MatrixBlock>,
        w_blocks: Vec<MatrixBlock>,
        m: usize,
        n: usize,
        k: usize,
        epsilon: f64,
    ) -> Result<Self> {
        Self::with_config(
            v_blocks,
            w_blocks,
            m,
            n,
            k,
            EvaluatorConfig::with_epsilon(epsilon),
        )
    }

    pub fn with_config(
        v_blocks: Vec<MatrixBlock>,
        w_blocks: Vec<MatrixBlock>,
        m: usize,
        n: usize,
        k: usize,
        config: EvaluatorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Self::check_shapes(&v_blocks, &w_blocks, m, n, k)?;
        let param_len = k.checked_mul(n).ok_or_else(|| {
            KlError::ShapeMismatch(format!("parameter shape {}x{} overflows", k, n))
        })?;

        let pool = match config.num_threads {
            Some(num_threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build()
                    .map_err(|e| {
                        KlError::InvalidConfiguration(format!("Thread pool error: {}", e))
                    })?,
            ),
            None => None,
        };

        let w_blocks: Vec<Array2<f64>> = w_blocks
            .iter()
            .map(|w| w.to_dense().mapv(f64::from))
            .collect();

        info!(
            "KL loss evaluator: m={} n={} k={} eps={:e}, {} block pairs ({} sparse V)",
            m,
            n,
            k,
            config.epsilon,
            v_blocks.len(),
            v_blocks.iter().filter(|v| v.is_sparse()).count()
        );

        Ok(Self {
            v_blocks,
            w_blocks,
            m,
            n,
            k,
            param_len,
            config,
            pool,
        })
    }

    fn check_shapes(
        v_blocks: &[MatrixBlock],
        w_blocks: &[MatrixBlock],
        m: usize,
        n: usize,
        k: usize,
    ) -> Result<()> {
        if v_blocks.len() != w_blocks.len() {
            return Err(KlError::ShapeMismatch(format!(
                "{} V blocks but {} W blocks",
                v_blocks.len(),
                w_blocks.len()
            )));
        }

        let mut total_rows = 0;
        for (i, (v, w)) in v_blocks.iter().zip(w_blocks).enumerate() {
            if v.ncols() != n {
                return Err(KlError::ShapeMismatch(format!(
                    "V block {} has {} columns, expected n = {}",
                    i,
                    v.ncols(),
                    n
                )));
            }
            if w.ncols() != k {
                return Err(KlError::ShapeMismatch(format!(
                    "W block {} has {} columns, expected k = {}",
                    i,
                    w.ncols(),
                    k
                )));
            }
            if v.nrows() != w.nrows() {
                return Err(KlError::ShapeMismatch(format!(
                    "block pair {} has {} V rows but {} W rows",
                    i,
                    v.nrows(),
                    w.nrows()
                )));
            }
            total_rows += w.nrows();
        }

        if total_rows != m {
            return Err(KlError::ShapeMismatch(format!(
                "W blocks cover {} rows, expected m = {}",
                total_rows, m
            )));
        }
        Ok(())
    }

    pub fn m(&self) -> usize {
        self.m
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn epsilon(&self) -> f64 {
        self.config.epsilon
    }

    pub fn num_blocks(&self) -> usize {
        self.v_blocks.len()
    }

    /// Required length of H and gradient buffers (`k * n`)
    pub fn param_len(&self) -> usize {
        self.param_len
    }

    /// Loss of the local shards at `h`, writing `∂loss/∂H` into `gradient`
    ///
    /// `gradient` is overwritten, never accumulated onto. Both buffers must have
    /// length `k * n`; on a length error nothing is written.
    pub fn evaluate(&self, h: &ParamBuffer, gradient: &mut ParamBuffer) -> Result<f64> {
        let len = self.param_len();
        if h.len() != len {
            return Err(KlError::DimensionMismatch {
                expected: len,
                actual: h.len(),
            });
        }
        if gradient.len() != len {
            return Err(KlError::DimensionMismatch {
                expected: len,
                actual: gradient.len(),
            });
        }

        let h = h.view(self.k, self.n)?.mapv(f64::from);
        let partials = match &self.pool {
            Some(pool) => pool.install(|| self.block_partials(&h)),
            None => self.block_partials(&h),
        }?;

        let mut loss = 0.0f64;
        let mut grad_sum = Array2::<f64>::zeros((self.k, self.n));
        for (i, (block_loss, block_grad)) in partials.into_iter().enumerate() {
            trace!("block {}: partial loss {:.6}", i, block_loss);
            loss += block_loss;
            grad_sum += &block_grad;
        }

        for (out, &g) in gradient.data_mut().iter_mut().zip(grad_sum.iter()) {
            *out = g as f32;
        }

        debug!(
            "KL loss {:.6} over {} block pairs",
            loss,
            self.v_blocks.len()
        );
        Ok(loss)
    }

    /// Loss only, gradient discarded
    pub fn loss(&self, h: &ParamBuffer) -> Result<f64> {
        let mut scratch = h.allocate_like();
        self.evaluate(h, &mut scratch)
    }

    fn block_partials(&self, h: &Array2<f64>) -> Result<Vec<(f64, Array2<f64>)>> {
        if self.config.parallel {
            self.v_blocks
                .par_iter()
                .zip(self.w_blocks.par_iter())
                .map(|(v, w)| self.block_partial(v, w, h))
                .collect()
        } else {
            self.v_blocks
                .iter()
                .zip(&self.w_blocks)
                .map(|(v, w)| self.block_partial(v, w, h))
                .collect()
        }
    }

    /// `(loss_i, grad_i)` for one row-block pair
    fn block_partial(
        &self,
        v_block: &MatrixBlock,
        w: &Array2<f64>,
        h: &Array2<f64>,
    ) -> Result<(f64, Array2<f64>)> {
        let eps = self.config.epsilon;
        let recon = w.dot(h);

        // Σ r over every position, stored or not
        let mut loss = recon.sum();
        // 1 − v/(r+ε), starting from the all-ones part
        let mut residual = Array2::<f64>::ones(recon.raw_dim());

        match v_block {
            MatrixBlock::Dense(values) => {
                Zip::from(&mut residual)
                    .and(values)
                    .and(&recon)
                    .for_each(|q, &v, &r| {
                        if v != 0.0 {
                            let v = f64::from(v);
                            let denom = r + eps;
                            loss -= v * denom.ln();
                            *q -= v / denom;
                        }
                    });
            }
            MatrixBlock::Sparse(_) => {
                for col in 0..recon.ncols() {
                    for (row, v) in v_block.column_entries(col)? {
                        if v != 0.0 {
                            let v = f64::from(v);
                            let denom = recon[(row, col)] + eps;
                            loss -= v * denom.ln();
                            residual[(row, col)] -= v / denom;
                        }
                    }
                }
            }
        }

        Ok((loss, w.t().dot(&residual)))
    }
}
