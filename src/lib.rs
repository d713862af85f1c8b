//! # bwmf
//!
//! Generalized KL-divergence (I-divergence) loss and H-gradient for one
//! worker of a block-wise distributed NMF trainer. A worker owns row shards of
//! V and W and repeatedly evaluates `(loss, ∂loss/∂H)` against a shared H.
//!
//! ```
//! use bwmf::{KlDivLoss, MatrixBlock, ParamBuffer};
//!
//! let v = vec![MatrixBlock::dense(1, 2, vec![1.0, 0.0]).unwrap()];
//! let w = vec![MatrixBlock::dense(1, 1, vec![1.0]).unwrap()];
//! let loss = KlDivLoss::new(v, w, 1, 2, 1, 1e-6).unwrap();
//!
//! let h = ParamBuffer::from_vec(vec![1.0, 1.0]);
//! let mut g = h.allocate_like();
//! let value = loss.evaluate(&h, &mut g).unwrap();
//! assert!((value - 2.0).abs() < 1e-5);
//! ```

pub mod block;
pub mod config;
pub mod context;
pub mod error;
pub mod kl_loss;
pub mod param;
pub mod synthetic;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-exports for convenience
pub use block::{ColumnEntries, CscBlock, MatrixBlock};
pub use config::{DemoConfig, EvaluatorConfig};
pub use context::TrainingContext;
pub use error::{KlError, Result};
pub use kl_loss::KlDivLoss;
pub use param::ParamBuffer;
