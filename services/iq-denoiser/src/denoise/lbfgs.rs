//! Limited-memory BFGS with box projection
//!
//! Minimizes a smooth objective over `lower <= x <= upper` under a hard
//! iteration cap. Every iterate is projected back into the box and only
//! accepted on sufficient decrease, so the current point is always the
//! best one seen and is returned as-is when the cap is hit.

use std::collections::VecDeque;

/// Differentiable objective evaluated in place.
pub trait Objective {
    /// Returns f(x) and writes the gradient of f at x into `grad`.
    fn evaluate(&self, x: &[f64], grad: &mut [f64]) -> f64;
}

/// Solver tuning
#[derive(Debug, Clone, Copy)]
pub struct LbfgsParams {
    /// Hard cap on accepted steps
    pub max_iterations: usize,
    /// Number of correction pairs kept for the inverse Hessian estimate
    pub history: usize,
    /// Stop once the projected gradient's largest component drops below this
    pub gradient_tolerance: f64,
    /// Armijo sufficient-decrease constant
    pub armijo: f64,
    /// Step halvings tried before a direction is abandoned
    pub max_backtracks: usize,
}

impl Default for LbfgsParams {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            history: 10,
            gradient_tolerance: 1e-5,
            armijo: 1e-4,
            max_backtracks: 20,
        }
    }
}

/// Result of a bounded minimization
#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

struct Correction {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

/// Minimize `objective` starting from `x0`, keeping every iterate inside
/// `[lower, upper]`. Infinite bounds are allowed.
pub fn minimize<O: Objective>(
    objective: &O,
    x0: &[f64],
    lower: &[f64],
    upper: &[f64],
    params: &LbfgsParams,
) -> Minimum {
    debug_assert_eq!(x0.len(), lower.len());
    debug_assert_eq!(x0.len(), upper.len());

    let n = x0.len();
    let mut x: Vec<f64> = x0.to_vec();
    project(&mut x, lower, upper);

    let mut grad = vec![0.0; n];
    let mut value = objective.evaluate(&x, &mut grad);

    let mut history: VecDeque<Correction> = VecDeque::with_capacity(params.history);
    let mut direction = vec![0.0; n];
    let mut trial = vec![0.0; n];
    let mut trial_grad = vec![0.0; n];

    let mut iterations = 0;
    let mut converged =
        projected_gradient_norm(&x, &grad, lower, upper) <= params.gradient_tolerance;

    while !converged && iterations < params.max_iterations {
        two_loop(&grad, &history, &mut direction);
        let mut accepted = line_search(
            objective,
            &x,
            value,
            &grad,
            &direction,
            initial_step(&grad, &history),
            lower,
            upper,
            params,
            &mut trial,
            &mut trial_grad,
        );

        // The quasi-Newton direction can stop being a descent direction
        // once projection clips it; fall back to steepest descent.
        if accepted.is_none() && !history.is_empty() {
            history.clear();
            two_loop(&grad, &history, &mut direction);
            accepted = line_search(
                objective,
                &x,
                value,
                &grad,
                &direction,
                initial_step(&grad, &history),
                lower,
                upper,
                params,
                &mut trial,
                &mut trial_grad,
            );
        }

        let Some(trial_value) = accepted else {
            break;
        };

        let s: Vec<f64> = trial.iter().zip(&x).map(|(t, x)| t - x).collect();
        let y: Vec<f64> = trial_grad.iter().zip(&grad).map(|(t, g)| t - g).collect();
        let sy = dot(&s, &y);
        if sy > f64::EPSILON * dot(&y, &y) {
            if history.len() == params.history {
                history.pop_front();
            }
            if params.history > 0 {
                history.push_back(Correction { s, y, rho: 1.0 / sy });
            }
        }

        std::mem::swap(&mut x, &mut trial);
        std::mem::swap(&mut grad, &mut trial_grad);
        value = trial_value;
        iterations += 1;

        converged =
            projected_gradient_norm(&x, &grad, lower, upper) <= params.gradient_tolerance;
    }

    Minimum {
        x,
        value,
        iterations,
        converged,
    }
}

/// Backtracking projected line search. Returns the trial value on success,
/// leaving the accepted point and its gradient in `trial`/`trial_grad`.
#[allow(clippy::too_many_arguments)]
fn line_search<O: Objective>(
    objective: &O,
    x: &[f64],
    value: f64,
    grad: &[f64],
    direction: &[f64],
    mut step: f64,
    lower: &[f64],
    upper: &[f64],
    params: &LbfgsParams,
    trial: &mut [f64],
    trial_grad: &mut [f64],
) -> Option<f64> {
    for _ in 0..=params.max_backtracks {
        for (i, t) in trial.iter_mut().enumerate() {
            *t = (x[i] + step * direction[i]).clamp(lower[i], upper[i]);
        }

        let decrease: f64 = trial
            .iter()
            .zip(x)
            .zip(grad)
            .map(|((t, x), g)| g * (t - x))
            .sum();
        if decrease >= 0.0 {
            return None;
        }

        let trial_value = objective.evaluate(trial, trial_grad);
        if trial_value <= value + params.armijo * decrease {
            return Some(trial_value);
        }
        step *= 0.5;
    }
    None
}

/// Writes `-H * grad` into `direction` using the two-loop recursion.
fn two_loop(grad: &[f64], history: &VecDeque<Correction>, direction: &mut [f64]) {
    direction.copy_from_slice(grad);

    let mut alphas = Vec::with_capacity(history.len());
    for c in history.iter().rev() {
        let alpha = c.rho * dot(&c.s, direction);
        axpy(-alpha, &c.y, direction);
        alphas.push(alpha);
    }

    if let Some(last) = history.back() {
        let gamma = dot(&last.s, &last.y) / dot(&last.y, &last.y);
        direction.iter_mut().for_each(|d| *d *= gamma);
    }

    for (c, alpha) in history.iter().zip(alphas.iter().rev()) {
        let beta = c.rho * dot(&c.y, direction);
        axpy(alpha - beta, &c.s, direction);
    }

    direction.iter_mut().for_each(|d| *d = -*d);
}

fn initial_step(grad: &[f64], history: &VecDeque<Correction>) -> f64 {
    if history.is_empty() {
        let norm = dot(grad, grad).sqrt();
        if norm > 0.0 {
            (1.0 / norm).min(1.0)
        } else {
            1.0
        }
    } else {
        1.0
    }
}

fn projected_gradient_norm(x: &[f64], grad: &[f64], lower: &[f64], upper: &[f64]) -> f64 {
    x.iter()
        .zip(grad)
        .enumerate()
        .map(|(i, (x, g))| (x - (x - g).clamp(lower[i], upper[i])).abs())
        .fold(0.0, f64::max)
}

fn project(x: &mut [f64], lower: &[f64], upper: &[f64]) {
    for (i, v) in x.iter_mut().enumerate() {
        *v = v.clamp(lower[i], upper[i]);
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(a, b)| a * b).sum()
}

fn axpy(a: f64, x: &[f64], y: &mut [f64]) {
    for (y, x) in y.iter_mut().zip(x) {
        *y += a * x;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// f(x) = 0.5 * sum(w_i * (x_i - c_i)^2)
    struct WeightedQuadratic {
        weights: Vec<f64>,
        center: Vec<f64>,
    }

    impl Objective for WeightedQuadratic {
        fn evaluate(&self, x: &[f64], grad: &mut [f64]) -> f64 {
            let mut value = 0.0;
            for i in 0..x.len() {
                let d = x[i] - self.center[i];
                value += 0.5 * self.weights[i] * d * d;
                grad[i] = self.weights[i] * d;
            }
            value
        }
    }

    fn unbounded(n: usize) -> (Vec<f64>, Vec<f64>) {
        (vec![f64::NEG_INFINITY; n], vec![f64::INFINITY; n])
    }

    #[test]
    fn test_ill_conditioned_quadratic_converges() {
        let objective = WeightedQuadratic {
            weights: vec![1.0, 50.0, 200.0],
            center: vec![0.5, -0.25, 2.0],
        };
        let (lower, upper) = unbounded(3);
        let min = minimize(&objective, &[0.0; 3], &lower, &upper, &LbfgsParams::default());

        assert!(min.converged, "stopped after {} iterations", min.iterations);
        for (x, c) in min.x.iter().zip(&objective.center) {
            assert!((x - c).abs() < 1e-4, "x={} center={}", x, c);
        }
    }

    #[test]
    fn test_bounds_clip_the_minimum() {
        let objective = WeightedQuadratic {
            weights: vec![1.0, 1.0],
            center: vec![3.0, -3.0],
        };
        let min = minimize(
            &objective,
            &[0.0, 0.0],
            &[-1.0, -1.0],
            &[1.0, 1.0],
            &LbfgsParams::default(),
        );

        assert!(min.converged);
        assert!((min.x[0] - 1.0).abs() < 1e-12);
        assert!((min.x[1] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_iteration_cap_is_respected() {
        let objective = WeightedQuadratic {
            weights: (1..=64).map(|w| w as f64 * 10.0).collect(),
            center: (0..64).map(|i| (i as f64).sin()).collect(),
        };
        let (lower, upper) = unbounded(64);
        let params = LbfgsParams {
            max_iterations: 2,
            ..LbfgsParams::default()
        };
        let start = vec![0.0; 64];
        let mut scratch = vec![0.0; 64];
        let initial = objective.evaluate(&start, &mut scratch);

        let min = minimize(&objective, &start, &lower, &upper, &params);

        assert!(min.iterations <= 2);
        assert!(!min.converged);
        assert!(min.value < initial);
    }

    #[test]
    fn test_stationary_start_returns_immediately() {
        let objective = WeightedQuadratic {
            weights: vec![1.0; 4],
            center: vec![0.0; 4],
        };
        let (lower, upper) = unbounded(4);
        let min = minimize(&objective, &[0.0; 4], &lower, &upper, &LbfgsParams::default());

        assert!(min.converged);
        assert_eq!(min.iterations, 0);
        assert_eq!(min.x, vec![0.0; 4]);
    }
}
