//! Evolution run parameters and model price table.

/// Default number of evolution iterations (`T`).
pub const DEFAULT_ITERATIONS: u32 = 10;
/// Default number of parents selected per iteration (`k`).
pub const DEFAULT_PARENTS_PER_ITERATION: usize = 1;
/// Default failure budget when mining a parent's training mistakes.
pub const DEFAULT_MAX_FAILURES_PER_CHILD: usize = 5;
/// Default number of successful examples sent to the developer for contrast.
pub const DEFAULT_SUCCESSES_TO_SEND: usize = 2;
/// Default sigmoid midpoint α0 for parent selection.
pub const DEFAULT_SIGMOID_ALPHA0: f64 = 0.5;

/// λ is derived from the iteration budget so that short runs exploit and long
/// runs explore: λ = BASE_LAMBDA_PRODUCT / T.  10 iterations → λ = 30;
/// 5 iterations → λ = 60 (sharper preference for high scorers); 20 → λ = 15.
pub const BASE_LAMBDA_PRODUCT: f64 = 300.0;

pub const DEFAULT_TASK_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_META_MODEL: &str = "gpt-4o";

/// All knobs the evolution loop reads.  Built from CLI args in `main`;
/// constructed directly in tests.
#[derive(Debug, Clone)]
pub struct EvolutionParams {
    /// Iteration budget `T`.
    pub iterations: u32,
    /// Parents selected per iteration `k` (with replacement).
    pub parents_per_iteration: usize,
    /// Stop mining a parent once this many failures are found.
    pub max_failures_per_child: usize,
    /// Cap on successful examples included in the mutation request.
    pub successes_to_send: usize,
    /// Sigmoid sharpness λ for parent selection.
    pub sigmoid_lambda: f64,
    /// Sigmoid midpoint α0 for parent selection.
    pub sigmoid_alpha0: f64,
}

impl Default for EvolutionParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            parents_per_iteration: DEFAULT_PARENTS_PER_ITERATION,
            max_failures_per_child: DEFAULT_MAX_FAILURES_PER_CHILD,
            successes_to_send: DEFAULT_SUCCESSES_TO_SEND,
            sigmoid_lambda: lambda_for_iterations(DEFAULT_ITERATIONS),
            sigmoid_alpha0: DEFAULT_SIGMOID_ALPHA0,
        }
    }
}

/// Derive the selection sharpness from the iteration budget.
pub fn lambda_for_iterations(iterations: u32) -> f64 {
    BASE_LAMBDA_PRODUCT / iterations.max(1) as f64
}

/// USD price per single token (prompt, completion) for known models.
/// Unknown models price at zero rather than failing the run.
pub fn token_prices(model: &str) -> (f64, f64) {
    match model {
        "gpt-4o" => (5.0 / 1_000_000.0, 15.0 / 1_000_000.0),
        "gpt-4o-mini" => (0.15 / 1_000_000.0, 0.6 / 1_000_000.0),
        "gpt-4-turbo" => (10.0 / 1_000_000.0, 30.0 / 1_000_000.0),
        _ => (0.0, 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lambda_default_budget_is_thirty() {
        assert!((lambda_for_iterations(10) - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_lambda_short_run_sharper() {
        assert!(lambda_for_iterations(5) > lambda_for_iterations(20));
    }

    #[test]
    fn test_lambda_zero_iterations_does_not_divide_by_zero() {
        assert!(lambda_for_iterations(0).is_finite());
    }

    #[test]
    fn test_unknown_model_prices_at_zero() {
        assert_eq!(token_prices("llama-3"), (0.0, 0.0));
    }
}
