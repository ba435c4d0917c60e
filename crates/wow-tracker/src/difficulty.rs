//! The pure difficulty-adjustment function (Section 4.5 of the design).
//!
//! Fourteen additive rules, summed, then clamped to `[1, 6]`. The three
//! `avg_solve_time_ms` overshoot rules (>30s, >20s, >15s) are mutually
//! exclusive — only the rule with the highest matching threshold fires —
//! otherwise a single slow solve would double- or triple-count the same
//! signal; every other rule is independent and additive, per the design.

const MIN_DIFFICULTY: u8 = 1;
const MAX_DIFFICULTY: u8 = 6;

/// Inputs to one difficulty recomputation.
#[derive(Clone, Copy, Debug)]
pub struct Inputs {
    pub failure_rate: f64,
    pub avg_solve_time_ms: f64,
    pub reconnect_rate: f64,
    pub connection_count: u64,
    pub reputation: u32,
    pub current_difficulty: u8,
}

/// Recompute difficulty from behavior signals. Pure and total: the same
/// inputs always produce the same output, and the output always lies in
/// `[1, 6]`.
pub fn adjust(inputs: Inputs) -> u8 {
    let mut adj: i32 = 0;

    if inputs.failure_rate > 0.5 {
        adj += 2;
    }
    if inputs.failure_rate > 0.3 {
        adj += 1;
    }

    if inputs.avg_solve_time_ms > 30_000.0 {
        adj -= 3;
    } else if inputs.avg_solve_time_ms > 20_000.0 {
        adj -= 2;
    } else if inputs.avg_solve_time_ms > 15_000.0 {
        adj -= 1;
    }

    if inputs.connection_count >= 10 && inputs.failure_rate <= 0.1 && inputs.avg_solve_time_ms < 10_000.0 {
        adj += 1;
    }
    if inputs.connection_count >= 20 && inputs.failure_rate <= 0.2 {
        adj += 1;
    }
    if inputs.avg_solve_time_ms > 0.0 && inputs.avg_solve_time_ms < 100.0 {
        adj += 3;
    }
    if inputs.avg_solve_time_ms < 1_000.0 && inputs.connection_count > 50 {
        adj += 2;
    }
    if inputs.connection_count > 100 {
        adj += 2;
    }
    if inputs.reconnect_rate > 0.8 {
        adj += 2;
    }
    if inputs.connection_count >= 3
        && (10_000.0..=30_000.0).contains(&inputs.avg_solve_time_ms)
    {
        adj -= 1;
    }
    if inputs.reputation < 10 {
        adj += 1;
    }
    if inputs.reputation > 80 {
        adj -= 1;
    }

    let raw = inputs.current_difficulty as i32 + adj;
    raw.clamp(MIN_DIFFICULTY as i32, MAX_DIFFICULTY as i32) as u8
}
