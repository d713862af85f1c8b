//! Configuration for the KL loss evaluator and the demo driver.

use serde::{Deserialize, Serialize};

use crate::error::{KlError, Result};

/// Settings that control how [`crate::kl_loss::KlDivLoss`] evaluates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Smoothing constant ε added before log and division
    pub epsilon: f64,
    /// Compute row-block partials on rayon
    pub parallel: bool,
    /// Size of a dedicated thread pool; `None` uses the global rayon pool
    pub num_threads: Option<usize>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-6,
            parallel: true,
            num_threads: None,
        }
    }
}

impl EvaluatorConfig {
    pub fn with_epsilon(epsilon: f64) -> Self {
        Self {
            epsilon,
            ..Default::default()
        }
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(KlError::InvalidSmoothing(self.epsilon));
        }
        if self.num_threads == Some(0) {
            return Err(KlError::InvalidConfiguration(
                "num_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Problem size and loop settings for the demo binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoConfig {
    pub rows: usize,
    pub cols: usize,
    pub rank: usize,
    pub shards: usize,
    pub iterations: usize,
    pub step: f32,
    pub evaluator: EvaluatorConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            rows: 200,
            cols: 50,
            rank: 5,
            shards: 4,
            iterations: 50,
            step: 1e-3,
            evaluator: EvaluatorConfig::default(),
        }
    }
}

impl DemoConfig {
    /// constructor
    ///
    /// # Examples
    /// ```bash
    /// $ cargo run -- 200 50 5 4 50 1e-3 1e-6
    /// ```
    /// args:
    /// 0: program name
    /// 1: rows, 2: cols, 3: rank, 4: shards, 5: iterations, 6: step, 7: epsilon
    ///
    /// Missing arguments keep their defaults.
    pub fn new(mut args: impl Iterator<Item = String>) -> Result<DemoConfig> {
        args.next();
        let mut config = DemoConfig::default();

        if let Some(arg) = args.next() {
            config.rows = parse_arg("rows", &arg)?;
        }
        if let Some(arg) = args.next() {
            config.cols = parse_arg("cols", &arg)?;
        }
        if let Some(arg) = args.next() {
            config.rank = parse_arg("rank", &arg)?;
        }
        if let Some(arg) = args.next() {
            config.shards = parse_arg("shards", &arg)?;
        }
        if let Some(arg) = args.next() {
            config.iterations = parse_arg("iterations", &arg)?;
        }
        if let Some(arg) = args.next() {
            config.step = parse_arg("step", &arg)?;
        }
        if let Some(arg) = args.next() {
            config.evaluator.epsilon = parse_arg("epsilon", &arg)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 || self.rank == 0 {
            return Err(KlError::InvalidConfiguration(
                "rows, cols and rank must be positive".to_string(),
            ));
        }
        if self.shards == 0 || self.shards > self.rows {
            return Err(KlError::InvalidConfiguration(format!(
                "shard count {} must be in 1..={}",
                self.shards, self.rows
            )));
        }
        if self.step.is_nan() || self.step <= 0.0 {
            return Err(KlError::InvalidConfiguration(format!(
                "step size {} must be positive",
                self.step
            )));
        }
        self.evaluator.validate()
    }
}

fn parse_arg<T: std::str::FromStr>(name: &str, arg: &str) -> Result<T> {
    arg.parse::<T>().map_err(|_| {
        KlError::InvalidConfiguration(format!("cannot parse {} from '{}'", name, arg))
    })
}
