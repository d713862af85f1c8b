use std::env;
use std::error::Error;
use std::time::Instant;

use chrono::Local;
use log::{info, LevelFilter};

use bwmf::{synthetic, DemoConfig, KlDivLoss, ParamBuffer, TrainingContext};

fn setup_logger() -> Result<(), Box<dyn Error>> {
    simple_logger::SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()?;
    Ok(())
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Projected gradient step on H: h ← max(0, h − step · g)
fn projected_step(h: &mut ParamBuffer, gradient: &ParamBuffer, step: f32) {
    for (x, g) in h.data_mut().iter_mut().zip(gradient.data()) {
        *x = (*x - step * g).max(0.0);
    }
}

// cargo run -- 200 50 5 4 50 1e-3
fn main() -> Result<(), Box<dyn Error>> {
    setup_logger()?;
    let config = DemoConfig::new(env::args())?;
    let method = "bwmf-kl";

    info!(
        "[method: {}] [{}] Problem: {}x{} rank {}, {} shards",
        method,
        timestamp(),
        config.rows,
        config.cols,
        config.rank,
        config.shards
    );

    let problem = synthetic::generate(
        config.rows,
        config.cols,
        config.rank,
        config.shards,
        0.3,
        42,
    )?;
    let evaluator = KlDivLoss::with_config(
        problem.v_blocks,
        problem.w_blocks,
        problem.m,
        problem.n,
        problem.k,
        config.evaluator.clone(),
    )?;

    let h = ParamBuffer::from_vec(vec![0.5; evaluator.param_len()]);
    let mut ctx = TrainingContext::from_h(h);

    let start = Instant::now();
    let initial = ctx.evaluate(&evaluator)?;
    info!(
        "[method: {}] [{}] Initial loss: {:.4}",
        method,
        timestamp(),
        initial
    );

    for iter in 1..=config.iterations {
        let step = config.step;
        ctx.apply_update(|h, g| projected_step(h, g, step));
        let loss = ctx.evaluate(&evaluator)?;
        if iter % 10 == 0 || iter == config.iterations {
            info!(
                "[method: {}] [{}] Iteration {}: loss {:.4}",
                method,
                timestamp(),
                iter,
                loss
            );
        }
    }

    info!(
        "[method: {}] [{}] {} evaluations in {:.1}ms, loss {:.4} -> {:.4}",
        method,
        timestamp(),
        ctx.iteration(),
        start.elapsed().as_secs_f64() * 1000.0,
        initial,
        ctx.last_loss().unwrap_or(initial)
    );
    Ok(())
}
