//! Trainer-owned state carried across evaluation calls.
//!
//! The evaluator keeps no mutable state between calls. A trainer holds H and
//! the gradient buffer here and lends them to each evaluation.

use log::debug;

use crate::error::Result;
use crate::kl_loss::KlDivLoss;
use crate::param::ParamBuffer;

#[derive(Debug, Clone)]
pub struct TrainingContext {
    h: ParamBuffer,
    gradient: ParamBuffer,
    iteration: usize,
    last_loss: Option<f64>,
}

impl TrainingContext {
    /// Zero-initialized `k×n` H
    pub fn new(k: usize, n: usize) -> Self {
        Self::from_h(ParamBuffer::zeros(k * n))
    }

    pub fn from_h(h: ParamBuffer) -> Self {
        let gradient = h.allocate_like();
        Self {
            h,
            gradient,
            iteration: 0,
            last_loss: None,
        }
    }

    pub fn h(&self) -> &ParamBuffer {
        &self.h
    }

    pub fn h_mut(&mut self) -> &mut ParamBuffer {
        &mut self.h
    }

    pub fn gradient(&self) -> &ParamBuffer {
        &self.gradient
    }

    /// Number of successful evaluations so far
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn last_loss(&self) -> Option<f64> {
        self.last_loss
    }

    /// Evaluate at the current H, refreshing the stored gradient and loss
    pub fn evaluate(&mut self, evaluator: &KlDivLoss) -> Result<f64> {
        let loss = evaluator.evaluate(&self.h, &mut self.gradient)?;
        self.iteration += 1;
        self.last_loss = Some(loss);
        debug!("iteration {}: loss {:.6}", self.iteration, loss);
        Ok(loss)
    }

    /// Hand the current H and latest gradient to an update rule
    pub fn apply_update<F>(&mut self, update: F)
    where
        F: FnOnce(&mut ParamBuffer, &ParamBuffer),
    {
        update(&mut self.h, &self.gradient);
    }
}
