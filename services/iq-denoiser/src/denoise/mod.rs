//! Smooth-L1 denoising of real-valued channel vectors
//!
//! Each channel is replaced by the minimizer of
//!
//! ```text
//! f(x) = 0.5 * sum((x_i - v_i)^2) + lambda * sum(sqrt(x_i^2 + eps^2))
//! ```
//!
//! The penalty is a differentiable stand-in for |x|, so small components
//! are pulled toward zero while large ones are only shifted by ~lambda.
//! The solver runs for a fixed iteration budget; whatever it reaches in
//! that budget is the output.

mod lbfgs;

pub use lbfgs::{minimize, LbfgsParams, Minimum, Objective};

/// Regularization weight: the fractional part of pi
pub const DEFAULT_LAMBDA: f64 = 0.141_592_653_589_793_23;
pub const DEFAULT_EPSILON: f64 = 1e-3;
pub const DEFAULT_MAX_ITERATIONS: usize = 30;
pub const DEFAULT_HISTORY: usize = 10;

/// Denoiser tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DenoiseParams {
    /// Regularization weight
    pub lambda: f64,
    /// Smoothing constant of the L1 relaxation
    pub epsilon: f64,
    /// Solver iteration cap
    pub max_iterations: usize,
    /// L-BFGS correction pairs
    pub history: usize,
}

impl Default for DenoiseParams {
    fn default() -> Self {
        Self {
            lambda: DEFAULT_LAMBDA,
            epsilon: DEFAULT_EPSILON,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            history: DEFAULT_HISTORY,
        }
    }
}

/// Data-fidelity term plus smooth-L1 penalty for one target vector
pub struct SmoothL1<'a> {
    target: &'a [f64],
    lambda: f64,
    epsilon: f64,
}

impl<'a> SmoothL1<'a> {
    pub fn new(target: &'a [f64], lambda: f64, epsilon: f64) -> Self {
        Self {
            target,
            lambda,
            epsilon,
        }
    }
}

impl Objective for SmoothL1<'_> {
    fn evaluate(&self, x: &[f64], grad: &mut [f64]) -> f64 {
        let eps2 = self.epsilon * self.epsilon;
        let mut value = 0.0;
        for ((g, &xi), &vi) in grad.iter_mut().zip(x).zip(self.target) {
            let r = xi - vi;
            let smooth_abs = (xi * xi + eps2).sqrt();
            value += 0.5 * r * r + self.lambda * smooth_abs;
            *g = r + self.lambda * xi / smooth_abs;
        }
        value
    }
}

/// Per-channel denoiser
#[derive(Debug, Clone)]
pub struct Denoiser {
    params: DenoiseParams,
    solver: LbfgsParams,
}

impl Denoiser {
    pub fn new(params: DenoiseParams) -> Self {
        let solver = LbfgsParams {
            max_iterations: params.max_iterations,
            history: params.history,
            ..LbfgsParams::default()
        };
        Self { params, solver }
    }

    /// Denoise one channel. The output has the same length as the input.
    pub fn denoise(&self, samples: &[f32]) -> Vec<f32> {
        self.solve(samples).x.iter().map(|&x| x as f32).collect()
    }

    /// Run the solver from the zero vector and return the raw result.
    ///
    /// The penalty is symmetric and increasing in |x|, so each component of
    /// the minimizer lies between 0 and v_i. The search is confined to that
    /// box, which keeps early-stopped iterates sign-consistent with the input.
    pub fn solve(&self, samples: &[f32]) -> Minimum {
        let target: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
        let lower: Vec<f64> = target.iter().map(|&v| v.min(0.0)).collect();
        let upper: Vec<f64> = target.iter().map(|&v| v.max(0.0)).collect();
        let start = vec![0.0; target.len()];

        let objective = SmoothL1::new(&target, self.params.lambda, self.params.epsilon);
        minimize(&objective, &start, &lower, &upper, &self.solver)
    }
}

impl Default for Denoiser {
    fn default() -> Self {
        Self::new(DenoiseParams::default())
    }
}
